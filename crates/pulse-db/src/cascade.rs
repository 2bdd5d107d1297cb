//! Multi-table deletion of a user and everything that references them.
//!
//! The coordinator walks a fixed list of phases over one SQLite transaction.
//! Any failure rolls the whole transaction back, so callers observe either
//! the complete deletion or no change at all.

use anyhow::Result;
use rusqlite::{Transaction, params_from_iter};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_types::models::{DeletionSummary, Role, UserStats};

use crate::Database;
use crate::users::query_role;

/// Phases of a user deletion, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionPhase {
    Authorize,
    CollectPosts,
    DeletePosts,
    DeleteAuthoredComments,
    DeleteConversations,
    DeleteNotifications,
    DeleteStories,
    DetachFollows,
    DetachBookmarks,
    DetachStoryViews,
    DeleteUser,
    Summarize,
}

impl DeletionPhase {
    pub const ALL: [DeletionPhase; 12] = [
        DeletionPhase::Authorize,
        DeletionPhase::CollectPosts,
        DeletionPhase::DeletePosts,
        DeletionPhase::DeleteAuthoredComments,
        DeletionPhase::DeleteConversations,
        DeletionPhase::DeleteNotifications,
        DeletionPhase::DeleteStories,
        DeletionPhase::DetachFollows,
        DeletionPhase::DetachBookmarks,
        DeletionPhase::DetachStoryViews,
        DeletionPhase::DeleteUser,
        DeletionPhase::Summarize,
    ];

    /// 1-based position in the phase list.
    pub fn number(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).map_or(0, |i| i + 1)
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("user not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("deletion phase {} ({phase:?}) failed: {source}", .phase.number())]
    Phase {
        phase: DeletionPhase,
        source: anyhow::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl Database {
    /// Delete `target` and every row that references them, on behalf of `requester`.
    ///
    /// `before_phase` runs ahead of each phase; returning an error aborts the
    /// deletion at that point. Production callers pass `|_| Ok(())`.
    pub fn delete_user_cascade<F>(
        &self,
        target: Uuid,
        requester: Uuid,
        before_phase: F,
    ) -> std::result::Result<DeletionSummary, CascadeError>
    where
        F: FnMut(DeletionPhase) -> Result<()>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let outcome = run_phases(&tx, target, requester, before_phase);

            match outcome {
                Ok(summary) => {
                    tx.commit()?;
                    info!(
                        "Deleted user {} ({} posts, {} conversations, {} followers, {} following)",
                        target, summary.posts, summary.conversations, summary.followers, summary.following
                    );
                    Ok(Ok(summary))
                }
                Err(e) => {
                    tx.rollback()?;
                    warn!("Deletion of user {} rolled back: {}", target, e);
                    Ok(Err(e))
                }
            }
        })
        .map_err(CascadeError::Store)?
    }

    /// Deletion preview: counts of everything `delete_user_cascade` would touch.
    pub fn get_user_stats(&self, user_id: Uuid) -> Result<Option<UserStats>> {
        self.with_conn(|conn| {
            if query_role(conn, user_id)?.is_none() {
                return Ok(None);
            }

            let id = user_id.to_string();
            let count = |sql: &str| -> Result<usize> {
                let n: i64 = conn.query_row(sql, [&id], |r| r.get(0))?;
                Ok(n as usize)
            };

            Ok(Some(UserStats {
                posts: count("SELECT COUNT(*) FROM posts WHERE creator_id = ?1")?,
                comments: count("SELECT COUNT(*) FROM comments WHERE creator_id = ?1")?,
                conversations: count(
                    "SELECT COUNT(*) FROM conversations WHERE participant_lo = ?1 OR participant_hi = ?1",
                )?,
                notifications: count(
                    "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 OR sender_id = ?1",
                )?,
                stories: count("SELECT COUNT(*) FROM stories WHERE user_id = ?1")?,
                followers: count("SELECT COUNT(*) FROM follows WHERE followee_id = ?1")?,
                following: count("SELECT COUNT(*) FROM follows WHERE follower_id = ?1")?,
            }))
        })
    }
}

fn run_phases<F>(
    tx: &Transaction<'_>,
    target: Uuid,
    requester: Uuid,
    mut before_phase: F,
) -> std::result::Result<DeletionSummary, CascadeError>
where
    F: FnMut(DeletionPhase) -> Result<()>,
{
    let mut deletion = UserDeletion {
        tx,
        target: target.to_string(),
        post_ids: Vec::new(),
        summary: DeletionSummary::default(),
    };

    for phase in DeletionPhase::ALL {
        before_phase(phase).map_err(|source| CascadeError::Phase { phase, source })?;

        if phase == DeletionPhase::Authorize {
            authorize(tx, target, requester)?;
            continue;
        }

        deletion
            .run(phase)
            .map_err(|source| CascadeError::Phase { phase, source })?;
        debug!("User {} deletion: phase {} ({:?}) done", target, phase.number(), phase);
    }

    Ok(deletion.summary)
}

fn authorize(tx: &Transaction<'_>, target: Uuid, requester: Uuid) -> std::result::Result<(), CascadeError> {
    let requester_role = query_role(tx, requester)?;
    if requester_role.is_none_or(|role| !role.is_privileged()) {
        return Err(CascadeError::Forbidden("admin access required"));
    }

    let target_role = query_role(tx, target)?.ok_or(CascadeError::NotFound)?;

    if target == requester {
        return Err(CascadeError::Forbidden("cannot delete your own account"));
    }
    if target_role == Role::Admin {
        return Err(CascadeError::Forbidden("cannot delete another admin account"));
    }

    Ok(())
}

/// Working state carried across phases.
struct UserDeletion<'a> {
    tx: &'a Transaction<'a>,
    target: String,
    post_ids: Vec<String>,
    summary: DeletionSummary,
}

impl UserDeletion<'_> {
    fn run(&mut self, phase: DeletionPhase) -> Result<()> {
        match phase {
            DeletionPhase::Authorize => Ok(()),
            DeletionPhase::CollectPosts => self.collect_posts(),
            DeletionPhase::DeletePosts => self.delete_posts(),
            DeletionPhase::DeleteAuthoredComments => self.exec(
                "DELETE FROM comments WHERE creator_id = ?1",
            ),
            DeletionPhase::DeleteConversations => self.delete_conversations(),
            DeletionPhase::DeleteNotifications => self.exec(
                "DELETE FROM notifications WHERE recipient_id = ?1 OR sender_id = ?1",
            ),
            DeletionPhase::DeleteStories => {
                self.exec(
                    "DELETE FROM story_views
                     WHERE story_id IN (SELECT id FROM stories WHERE user_id = ?1)",
                )?;
                self.exec("DELETE FROM stories WHERE user_id = ?1")
            }
            DeletionPhase::DetachFollows => self.detach_follows(),
            DeletionPhase::DetachBookmarks => {
                let ids = self.post_ids.clone();
                self.exec_in("DELETE FROM bookmarks WHERE post_id IN ({})", &ids)?;
                Ok(())
            }
            DeletionPhase::DetachStoryViews => self.exec("DELETE FROM story_views WHERE viewer_id = ?1"),
            DeletionPhase::DeleteUser => {
                self.exec("DELETE FROM bookmarks WHERE user_id = ?1")?;
                let removed = self.tx.execute("DELETE FROM users WHERE id = ?1", [&self.target])?;
                anyhow::ensure!(removed == 1, "user row {} disappeared mid-deletion", self.target);
                Ok(())
            }
            DeletionPhase::Summarize => Ok(()),
        }
    }

    fn collect_posts(&mut self) -> Result<()> {
        self.post_ids = self.select_ids("SELECT id FROM posts WHERE creator_id = ?1")?;
        self.summary.posts = self.post_ids.len();
        Ok(())
    }

    fn delete_posts(&mut self) -> Result<()> {
        let ids = self.post_ids.clone();
        self.exec_in("DELETE FROM comments WHERE post_id IN ({})", &ids)?;
        self.exec_in("DELETE FROM post_likes WHERE post_id IN ({})", &ids)?;
        self.exec_in("DELETE FROM posts WHERE id IN ({})", &ids)?;
        Ok(())
    }

    fn delete_conversations(&mut self) -> Result<()> {
        let ids = self.select_ids(
            "SELECT id FROM conversations WHERE participant_lo = ?1 OR participant_hi = ?1",
        )?;
        self.summary.conversations = ids.len();
        self.exec_in("DELETE FROM messages WHERE conversation_id IN ({})", &ids)?;
        self.exec_in("DELETE FROM conversations WHERE id IN ({})", &ids)?;
        Ok(())
    }

    fn detach_follows(&mut self) -> Result<()> {
        self.summary.followers = self.count("SELECT COUNT(*) FROM follows WHERE followee_id = ?1")?;
        self.summary.following = self.count("SELECT COUNT(*) FROM follows WHERE follower_id = ?1")?;
        self.exec("DELETE FROM follows WHERE follower_id = ?1 OR followee_id = ?1")?;
        self.exec("DELETE FROM post_likes WHERE user_id = ?1")
    }

    fn exec(&self, sql: &str) -> Result<()> {
        self.tx.execute(sql, [&self.target])?;
        Ok(())
    }

    /// Run `sql` with its `{}` replaced by one placeholder per id.
    fn exec_in(&self, sql: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = sql.replace("{}", &placeholders.join(", "));
        Ok(self.tx.execute(&sql, params_from_iter(ids.iter()))?)
    }

    fn select_ids(&self, sql: &str) -> Result<Vec<String>> {
        let mut stmt = self.tx.prepare(sql)?;
        let ids = stmt
            .query_map([&self.target], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.tx.query_row(sql, [&self.target], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pulse_types::models::{LastMessage, MediaType, NotificationKind, SubjectRef};

    struct World {
        db: Database,
        admin: Uuid,
        target: Uuid,
        others: Vec<Uuid>,
    }

    /// Target with 3 posts, 2 conversations, 5 followers and 4 following,
    /// plus comments, likes, bookmarks, notifications and stories around them.
    fn world() -> World {
        let db = testing::db();
        let admin = testing::admin(&db, "Root");
        let target = testing::user(&db, "Tess");
        let others: Vec<Uuid> = (0..5).map(|i| testing::user(&db, &format!("U{}", i))).collect();

        let posts: Vec<Uuid> = (0..3)
            .map(|i| db.insert_post(target, &format!("post {}", i), "https://cdn/p.png", MediaType::Image).unwrap().id)
            .collect();
        let foreign_post = db.insert_post(others[0], "not Tess", "https://cdn/q.png", MediaType::Image).unwrap();

        for (i, other) in others.iter().enumerate() {
            db.toggle_follow(*other, target).unwrap();
            if i < 4 {
                db.toggle_follow(target, *other).unwrap();
            }
        }

        db.insert_comment(posts[0], others[1], "nice").unwrap();
        db.insert_comment(foreign_post.id, target, "thanks").unwrap();
        db.toggle_like(posts[1], others[2]).unwrap();
        db.toggle_like(foreign_post.id, target).unwrap();
        db.toggle_bookmark(others[3], posts[2]).unwrap();
        db.toggle_bookmark(others[3], foreign_post.id).unwrap();
        db.toggle_bookmark(target, foreign_post.id).unwrap();

        for peer in &others[..2] {
            let preview = LastMessage { text: "hi".into(), sender_id: target };
            let (conv, _) = db.find_or_create_conversation(target, *peer, &preview).unwrap();
            let msg = db.insert_message(conv.id, target, "hi").unwrap();
            db.insert_notification(*peer, target, NotificationKind::Message, Some(SubjectRef::Message(msg.id)))
                .unwrap();
        }
        db.insert_notification(target, others[4], NotificationKind::Follow, None).unwrap();
        db.insert_notification(others[3], others[4], NotificationKind::Follow, None).unwrap();

        let own_story = db.insert_story(target, "https://cdn/s.jpg", MediaType::Image).unwrap();
        db.add_story_view(own_story.id, others[0]).unwrap();
        let other_story = db.insert_story(others[1], "https://cdn/t.jpg", MediaType::Image).unwrap();
        db.add_story_view(other_story.id, target).unwrap();

        World { db, admin, target, others }
    }

    fn references_to(db: &Database, user: Uuid) -> i64 {
        db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users WHERE id = ?1)
                  + (SELECT COUNT(*) FROM posts WHERE creator_id = ?1)
                  + (SELECT COUNT(*) FROM comments WHERE creator_id = ?1)
                  + (SELECT COUNT(*) FROM post_likes WHERE user_id = ?1)
                  + (SELECT COUNT(*) FROM bookmarks WHERE user_id = ?1)
                  + (SELECT COUNT(*) FROM follows WHERE follower_id = ?1 OR followee_id = ?1)
                  + (SELECT COUNT(*) FROM conversations WHERE participant_lo = ?1 OR participant_hi = ?1)
                  + (SELECT COUNT(*) FROM messages WHERE sender_id = ?1)
                  + (SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 OR sender_id = ?1)
                  + (SELECT COUNT(*) FROM stories WHERE user_id = ?1)
                  + (SELECT COUNT(*) FROM story_views WHERE viewer_id = ?1)",
                [user.to_string()],
                |r| r.get(0),
            )?;
            Ok(n)
        })
        .unwrap()
    }

    fn dangling_bookmarks(db: &Database) -> i64 {
        db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM bookmarks WHERE post_id NOT IN (SELECT id FROM posts)",
                [],
                |r| r.get(0),
            )?;
            Ok(n)
        })
        .unwrap()
    }

    #[test]
    fn deletes_everything_and_reports_counts() {
        let w = world();
        let stats = w.db.get_user_stats(w.target).unwrap().unwrap();
        assert_eq!(stats.posts, 3);
        assert_eq!(stats.conversations, 2);

        let summary = w.db.delete_user_cascade(w.target, w.admin, |_| Ok(())).unwrap();

        assert_eq!(
            summary,
            DeletionSummary { posts: 3, conversations: 2, followers: 5, following: 4 }
        );
        assert_eq!(references_to(&w.db, w.target), 0);
        assert_eq!(dangling_bookmarks(&w.db), 0);
        for other in &w.others {
            assert!(!w.db.get_followers(*other).unwrap().contains(&w.target));
            assert!(!w.db.get_following(*other).unwrap().contains(&w.target));
        }
        // Unrelated data survives.
        assert_eq!(w.db.get_bookmarks(w.others[3]).unwrap().len(), 1);
        assert_eq!(w.db.get_notifications_for(w.others[3]).unwrap().len(), 1);
        assert!(w.db.get_user_stats(w.target).unwrap().is_none());
    }

    #[test]
    fn failure_mid_way_rolls_back_every_phase() {
        let w = world();
        let before = references_to(&w.db, w.target);
        let stats_before = w.db.get_user_stats(w.target).unwrap().unwrap();

        let mut seen = Vec::new();
        let err = w
            .db
            .delete_user_cascade(w.target, w.admin, |phase| {
                seen.push(phase);
                if phase == DeletionPhase::DeleteStories {
                    anyhow::bail!("injected failure");
                }
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, CascadeError::Phase { phase: DeletionPhase::DeleteStories, .. }));
        assert_eq!(seen.len(), 7);
        assert_eq!(references_to(&w.db, w.target), before);
        assert_eq!(w.db.get_user_stats(w.target).unwrap().unwrap(), stats_before);
        assert!(w.db.get_user_by_id(w.target).unwrap().is_some());
        assert_eq!(w.db.get_followers(w.target).unwrap().len(), 5);
        assert_eq!(w.db.get_following(w.target).unwrap().len(), 4);
        assert_eq!(w.db.get_conversations_for_user(w.target).unwrap().len(), 2);
    }

    #[test]
    fn authorization_rules() {
        let w = world();
        let second_admin = testing::admin(&w.db, "Other Root");

        let err = w.db.delete_user_cascade(w.target, w.others[0], |_| Ok(())).unwrap_err();
        assert!(matches!(err, CascadeError::Forbidden(_)));

        let err = w.db.delete_user_cascade(w.admin, w.admin, |_| Ok(())).unwrap_err();
        assert!(matches!(err, CascadeError::Forbidden(_)));

        let err = w.db.delete_user_cascade(second_admin, w.admin, |_| Ok(())).unwrap_err();
        assert!(matches!(err, CascadeError::Forbidden(_)));

        let err = w.db.delete_user_cascade(Uuid::new_v4(), w.admin, |_| Ok(())).unwrap_err();
        assert!(matches!(err, CascadeError::NotFound));

        assert!(w.db.get_user_by_id(w.target).unwrap().is_some());
    }

    #[test]
    fn phases_are_numbered_in_order() {
        assert_eq!(DeletionPhase::Authorize.number(), 1);
        assert_eq!(DeletionPhase::DeleteStories.number(), 7);
        assert_eq!(DeletionPhase::Summarize.number(), 12);
    }
}
