use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // User references are deferred: multi-step deletes only have to be
        // consistent when their transaction commits.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                full_name       TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                profile_photo   TEXT NOT NULL DEFAULT '',
                role            TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                created_at      TEXT NOT NULL
            );

            CREATE TABLE follows (
                follower_id TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                followee_id TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (follower_id, followee_id),
                CHECK (follower_id <> followee_id)
            );

            CREATE INDEX idx_follows_followee ON follows(followee_id);

            CREATE TABLE posts (
                id          TEXT PRIMARY KEY,
                creator_id  TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                body        TEXT NOT NULL,
                media_url   TEXT NOT NULL,
                media_type  TEXT NOT NULL CHECK (media_type IN ('image', 'video')),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_posts_creator ON posts(creator_id);

            CREATE TABLE post_likes (
                post_id     TEXT NOT NULL REFERENCES posts(id) DEFERRABLE INITIALLY DEFERRED,
                user_id     TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE bookmarks (
                user_id     TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                post_id     TEXT NOT NULL REFERENCES posts(id) DEFERRABLE INITIALLY DEFERRED,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, post_id)
            );

            CREATE INDEX idx_bookmarks_post ON bookmarks(post_id);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                post_id     TEXT NOT NULL REFERENCES posts(id) DEFERRABLE INITIALLY DEFERRED,
                creator_id  TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                body        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id);
            CREATE INDEX idx_comments_creator ON comments(creator_id);

            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                participant_lo      TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                participant_hi      TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                last_message_text   TEXT,
                last_message_sender TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                UNIQUE (participant_lo, participant_hi),
                CHECK (participant_lo <= participant_hi)
            );

            CREATE INDEX idx_conversations_hi ON conversations(participant_hi);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) DEFERRABLE INITIALLY DEFERRED,
                sender_id       TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                text            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                recipient_id    TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                sender_id       TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                kind            TEXT NOT NULL
                    CHECK (kind IN ('like', 'comment', 'follow', 'message', 'admin')),
                post_id         TEXT REFERENCES posts(id) ON DELETE SET NULL,
                comment_id      TEXT REFERENCES comments(id) ON DELETE SET NULL,
                message_id      TEXT REFERENCES messages(id) ON DELETE SET NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                CHECK (recipient_id <> sender_id)
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, is_read);
            CREATE INDEX idx_notifications_sender ON notifications(sender_id);

            CREATE TABLE stories (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                media_url   TEXT NOT NULL,
                media_type  TEXT NOT NULL CHECK (media_type IN ('image', 'video')),
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_stories_user ON stories(user_id, created_at);
            CREATE INDEX idx_stories_expiry ON stories(expires_at);

            CREATE TABLE story_views (
                story_id    TEXT NOT NULL REFERENCES stories(id) DEFERRABLE INITIALLY DEFERRED,
                viewer_id   TEXT NOT NULL REFERENCES users(id) DEFERRABLE INITIALLY DEFERRED,
                viewed_at   TEXT NOT NULL,
                PRIMARY KEY (story_id, viewer_id)
            );

            CREATE INDEX idx_story_views_viewer ON story_views(viewer_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
