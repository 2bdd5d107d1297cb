use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use pulse_types::models::{MediaType, Story};

use crate::{Database, OptionalExt, enum_col, uuid_col};

/// Stories expire this long after upload.
pub const STORY_TTL_HOURS: i64 = 24;

const STORY_COLUMNS: &str = "id, user_id, media_url, media_type, created_at, expires_at";

impl Database {
    pub fn insert_story(&self, user_id: Uuid, media_url: &str, media_type: MediaType) -> Result<Story> {
        let created_at = Utc::now();
        let story = Story {
            id: Uuid::new_v4(),
            user_id,
            media_url: media_url.to_string(),
            media_type,
            views: Vec::new(),
            created_at,
            expires_at: created_at + Duration::hours(STORY_TTL_HOURS),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (id, user_id, media_url, media_type, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    story.id.to_string(),
                    user_id.to_string(),
                    story.media_url,
                    media_type.as_str(),
                    story.created_at,
                    story.expires_at
                ],
            )?;
            Ok(())
        })?;

        Ok(story)
    }

    /// Fetch a story that has not expired yet.
    pub fn get_story(&self, id: Uuid) -> Result<Option<Story>> {
        self.with_conn(|conn| {
            let stories = query_stories(
                conn,
                &format!("SELECT {} FROM stories WHERE id = ?1 AND expires_at > ?2", STORY_COLUMNS),
                params![id.to_string(), Utc::now()],
            )?;
            Ok(stories.into_iter().next())
        })
    }

    /// All unexpired stories, newest first.
    pub fn get_active_stories(&self) -> Result<Vec<Story>> {
        self.with_conn(|conn| {
            query_stories(
                conn,
                &format!(
                    "SELECT {} FROM stories WHERE expires_at > ?1 ORDER BY created_at DESC, rowid DESC",
                    STORY_COLUMNS
                ),
                params![Utc::now()],
            )
        })
    }

    /// Unexpired stories of one user, newest first.
    pub fn get_stories_of(&self, user_id: Uuid) -> Result<Vec<Story>> {
        self.with_conn(|conn| {
            query_stories(
                conn,
                &format!(
                    "SELECT {} FROM stories WHERE user_id = ?1 AND expires_at > ?2 ORDER BY created_at DESC, rowid DESC",
                    STORY_COLUMNS
                ),
                params![user_id.to_string(), Utc::now()],
            )
        })
    }

    /// Append `viewer_id` to a story's views. Owners never count as viewers and
    /// repeat views are ignored. Returns true if a view was added.
    pub fn add_story_view(&self, story_id: Uuid, viewer_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let added = conn.execute(
                "INSERT OR IGNORE INTO story_views (story_id, viewer_id, viewed_at)
                 SELECT id, ?2, ?3 FROM stories
                 WHERE id = ?1 AND user_id <> ?2 AND expires_at > ?3",
                params![story_id.to_string(), viewer_id.to_string(), Utc::now()],
            )?;
            Ok(added > 0)
        })
    }

    pub fn delete_story(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM story_views WHERE story_id = ?1", [id.to_string()])?;
            let removed = tx.execute("DELETE FROM stories WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    /// Remove every story whose TTL ran out before `now`. Returns how many went.
    pub fn purge_expired_stories(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM story_views
                 WHERE story_id IN (SELECT id FROM stories WHERE expires_at <= ?1)",
                params![now],
            )?;
            let removed = tx.execute("DELETE FROM stories WHERE expires_at <= ?1", params![now])?;
            tx.commit()?;
            Ok(removed)
        })
    }

    pub fn story_exists_any(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM stories WHERE id = ?1", [id.to_string()], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }
}

fn query_stories(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Story>> {
    let mut stmt = conn.prepare(sql)?;
    let mut stories = stmt
        .query_map(params, |row| {
            Ok(Story {
                id: uuid_col(row, 0)?,
                user_id: uuid_col(row, 1)?,
                media_url: row.get(2)?,
                media_type: enum_col(row, 3, MediaType::parse)?,
                views: Vec::new(),
                created_at: row.get(4)?,
                expires_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut views_stmt =
        conn.prepare("SELECT viewer_id FROM story_views WHERE story_id = ?1 ORDER BY viewed_at, rowid")?;
    for story in &mut stories {
        story.views = views_stmt
            .query_map([story.id.to_string()], |row| uuid_col(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
    }

    Ok(stories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn backdate(db: &Database, id: Uuid, hours: i64) {
        db.with_conn(|conn| {
            let created = Utc::now() - Duration::hours(hours);
            conn.execute(
                "UPDATE stories SET created_at = ?2, expires_at = ?3 WHERE id = ?1",
                params![id.to_string(), created, created + Duration::hours(STORY_TTL_HOURS)],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn views_are_append_only_and_owner_exempt() {
        let db = testing::db();
        let owner = testing::user(&db, "Ann");
        let viewer = testing::user(&db, "Ben");
        let story = db.insert_story(owner, "https://cdn/s.jpg", MediaType::Image).unwrap();

        assert!(!db.add_story_view(story.id, owner).unwrap());
        assert!(db.add_story_view(story.id, viewer).unwrap());
        assert!(!db.add_story_view(story.id, viewer).unwrap());

        assert_eq!(db.get_story(story.id).unwrap().unwrap().views, vec![viewer]);
    }

    #[test]
    fn expired_stories_are_hidden_then_purged() {
        let db = testing::db();
        let owner = testing::user(&db, "Ann");
        let viewer = testing::user(&db, "Ben");
        let old = db.insert_story(owner, "https://cdn/old.jpg", MediaType::Image).unwrap();
        let fresh = db.insert_story(owner, "https://cdn/new.mp4", MediaType::Video).unwrap();
        db.add_story_view(old.id, viewer).unwrap();
        backdate(&db, old.id, 25);

        assert!(db.get_story(old.id).unwrap().is_none());
        let active: Vec<Uuid> = db.get_active_stories().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(active, vec![fresh.id]);
        assert!(!db.add_story_view(old.id, viewer).unwrap());

        assert_eq!(db.purge_expired_stories(Utc::now()).unwrap(), 1);
        assert!(!db.story_exists_any(old.id).unwrap());
        assert!(db.story_exists_any(fresh.id).unwrap());
    }
}
