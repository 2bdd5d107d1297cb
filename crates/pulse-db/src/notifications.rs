use anyhow::Result;
use chrono::Utc;
use rusqlite::{Row, params};
use uuid::Uuid;

use pulse_types::models::{Notification, NotificationKind, SubjectRef};

use crate::{Database, OptionalExt, enum_col, opt_uuid_col, uuid_col};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, sender_id, kind, post_id, comment_id, message_id, is_read, created_at";

impl Database {
    /// Durably record a notification and return it as stored.
    ///
    /// The table rejects `recipient == sender`; callers filter self-actions
    /// before getting here.
    pub fn insert_notification(
        &self,
        recipient_id: Uuid,
        sender_id: Uuid,
        kind: NotificationKind,
        subject: Option<SubjectRef>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            sender_id,
            kind,
            subject,
            is_read: false,
            created_at: Utc::now(),
        };

        let (post_id, comment_id, message_id) = match subject {
            Some(SubjectRef::Post(id)) => (Some(id.to_string()), None, None),
            Some(SubjectRef::Comment(id)) => (None, Some(id.to_string()), None),
            Some(SubjectRef::Message(id)) => (None, None, Some(id.to_string())),
            None => (None, None, None),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                    (id, recipient_id, sender_id, kind, post_id, comment_id, message_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    notification.id.to_string(),
                    recipient_id.to_string(),
                    sender_id.to_string(),
                    kind.as_str(),
                    post_id,
                    comment_id,
                    message_id,
                    notification.created_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(notification)
    }

    pub fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS);
            conn.query_row(&sql, [id.to_string()], map_notification).optional()
        })
    }

    /// All notifications addressed to `recipient_id`, newest first.
    pub fn get_notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications WHERE recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([recipient_id.to_string()], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_unread_notifications(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Flag one notification as read, scoped to its recipient.
    /// Returns the updated row, or `None` if `owner_id` does not own it.
    pub fn mark_notification_read(&self, id: Uuid, owner_id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id.to_string(), owner_id.to_string()],
            )?;
            let sql = format!(
                "SELECT {} FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                NOTIFICATION_COLUMNS
            );
            conn.query_row(&sql, params![id.to_string(), owner_id.to_string()], map_notification)
                .optional()
        })
    }

    /// Flag every unread notification of `owner_id` as read.
    /// Returns how many changed; a second call in a row returns 0.
    pub fn mark_all_notifications_read(&self, owner_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [owner_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    /// Delete one notification, scoped to its recipient. Returns false if nothing matched.
    pub fn delete_notification(&self, id: Uuid, owner_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                params![id.to_string(), owner_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let subject = if let Some(id) = opt_uuid_col(row, 4)? {
        Some(SubjectRef::Post(id))
    } else if let Some(id) = opt_uuid_col(row, 5)? {
        Some(SubjectRef::Comment(id))
    } else {
        opt_uuid_col(row, 6)?.map(SubjectRef::Message)
    };

    Ok(Notification {
        id: uuid_col(row, 0)?,
        recipient_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        kind: enum_col(row, 3, NotificationKind::parse)?,
        subject,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
    })
}
