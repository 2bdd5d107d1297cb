use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use pulse_types::models::{Comment, MediaType, Post};

use crate::users::query_ids;
use crate::{Database, OptionalExt, enum_col, uuid_col};

impl Database {
    // -- Posts --

    pub fn insert_post(&self, creator_id: Uuid, body: &str, media_url: &str, media_type: MediaType) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            creator_id,
            body: body.to_string(),
            media_url: media_url.to_string(),
            media_type,
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, creator_id, body, media_url, media_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    post.id.to_string(),
                    creator_id.to_string(),
                    post.body,
                    post.media_url,
                    media_type.as_str(),
                    post.created_at
                ],
            )?;
            Ok(())
        })?;

        Ok(post)
    }

    pub fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, creator_id, body, media_url, media_type, created_at FROM posts WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Post {
                        id: uuid_col(row, 0)?,
                        creator_id: uuid_col(row, 1)?,
                        body: row.get(2)?,
                        media_url: row.get(3)?,
                        media_type: enum_col(row, 4, MediaType::parse)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Toggle `user_id`'s like on a post. Returns true when the like now exists.
    pub fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            toggle_edge(
                conn,
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                post_id,
                user_id,
            )
        })
    }

    pub fn get_likes(&self, post_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at",
                post_id,
            )
        })
    }

    // -- Bookmarks --

    /// Toggle a bookmark. Returns true when the post is now bookmarked.
    pub fn toggle_bookmark(&self, user_id: Uuid, post_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            toggle_edge(
                conn,
                "DELETE FROM bookmarks WHERE post_id = ?1 AND user_id = ?2",
                "INSERT INTO bookmarks (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                post_id,
                user_id,
            )
        })
    }

    /// Bookmarked post ids of `user_id`, in bookmark order.
    pub fn get_bookmarks(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT post_id FROM bookmarks WHERE user_id = ?1 ORDER BY created_at, rowid",
                user_id,
            )
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, post_id: Uuid, creator_id: Uuid, body: &str) -> Result<Comment> {
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            creator_id,
            body: body.to_string(),
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, creator_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    comment.id.to_string(),
                    post_id.to_string(),
                    creator_id.to_string(),
                    comment.body,
                    comment.created_at
                ],
            )?;
            Ok(())
        })?;

        Ok(comment)
    }

    pub fn get_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, post_id, creator_id, body, created_at FROM comments WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Comment {
                        id: uuid_col(row, 0)?,
                        post_id: uuid_col(row, 1)?,
                        creator_id: uuid_col(row, 2)?,
                        body: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn count_comments_on(&self, post_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                [post_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

/// Delete the `(post, user)` edge if present, otherwise insert it.
fn toggle_edge(conn: &Connection, delete_sql: &str, insert_sql: &str, post_id: Uuid, user_id: Uuid) -> Result<bool> {
    let removed = conn.execute(delete_sql, params![post_id.to_string(), user_id.to_string()])?;
    if removed > 0 {
        return Ok(false);
    }
    conn.execute(insert_sql, params![post_id.to_string(), user_id.to_string(), Utc::now()])?;
    Ok(true)
}
