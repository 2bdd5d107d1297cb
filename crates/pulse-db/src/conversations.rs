use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::debug;
use uuid::Uuid;

use pulse_types::models::{Conversation, LastMessage, Message};

use crate::models::ConversationSlot;
use crate::{Database, OptionalExt, opt_uuid_col, uuid_col};

const CONVERSATION_COLUMNS: &str =
    "id, participant_lo, participant_hi, last_message_text, last_message_sender, created_at, updated_at";

/// Canonical (sorted) form of an unordered participant pair.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a.to_string() <= b.to_string() { (a, b) } else { (b, a) }
}

impl Database {
    /// Look up the conversation for an unordered pair, creating it with
    /// `first_message` as its preview if none exists.
    ///
    /// The insert is guarded by the UNIQUE pair constraint, so a concurrent
    /// first contact cannot produce a second row; losing the race falls back
    /// to re-reading the winner.
    pub fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
        first_message: &LastMessage,
    ) -> Result<(Conversation, ConversationSlot)> {
        let (lo, hi) = ordered_pair(a, b);
        self.with_conn(|conn| {
            if let Some(existing) = query_conversation_by_pair(conn, lo, hi)? {
                return Ok((existing, ConversationSlot::Existing));
            }

            let now = Utc::now();
            let inserted = conn.execute(
                "INSERT INTO conversations
                    (id, participant_lo, participant_hi, last_message_text, last_message_sender, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (participant_lo, participant_hi) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    lo.to_string(),
                    hi.to_string(),
                    first_message.text,
                    first_message.sender_id.to_string(),
                    now,
                ],
            )?;

            let slot = if inserted == 1 {
                ConversationSlot::Created
            } else {
                debug!("Conversation for {} / {} created concurrently, re-reading", lo, hi);
                ConversationSlot::Existing
            };

            let conversation = query_conversation_by_pair(conn, lo, hi)?
                .ok_or_else(|| anyhow::anyhow!("conversation for {} / {} vanished after insert", lo, hi))?;
            Ok((conversation, slot))
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS);
            conn.query_row(&sql, [id.to_string()], map_conversation).optional()
        })
    }

    pub fn get_conversation_by_pair(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let (lo, hi) = ordered_pair(a, b);
        self.with_conn(|conn| query_conversation_by_pair(conn, lo, hi))
    }

    /// Every conversation `user_id` takes part in, most recently active first.
    pub fn get_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations
                 WHERE participant_lo = ?1 OR participant_hi = ?1
                 ORDER BY updated_at DESC",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_last_message(&self, conversation_id: Uuid, last: &LastMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations
                 SET last_message_text = ?2, last_message_sender = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    conversation_id.to_string(),
                    last.text,
                    last.sender_id.to_string(),
                    Utc::now()
                ],
            )?;
            Ok(())
        })
    }

    /// Remove a conversation and its message log in one transaction.
    /// Returns false if the conversation did not exist.
    pub fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let messages = tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id.to_string()])?;
            let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;

            if removed > 0 {
                debug!("Deleted conversation {} with {} messages", id, messages);
            }
            Ok(removed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    conversation_id.to_string(),
                    sender_id.to_string(),
                    message.text,
                    message.created_at
                ],
            )?;
            Ok(())
        })?;

        Ok(message)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, conversation_id, sender_id, text, created_at FROM messages WHERE id = ?1",
                [id.to_string()],
                map_message,
            )
            .optional()
        })
    }

    /// Message log of a conversation, oldest first.
    pub fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, text, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id.to_string()], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_conversation_by_pair(conn: &Connection, lo: Uuid, hi: Uuid) -> Result<Option<Conversation>> {
    let sql = format!(
        "SELECT {} FROM conversations WHERE participant_lo = ?1 AND participant_hi = ?2",
        CONVERSATION_COLUMNS
    );
    conn.query_row(&sql, params![lo.to_string(), hi.to_string()], map_conversation)
        .optional()
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let text: Option<String> = row.get(3)?;
    let sender = opt_uuid_col(row, 4)?;
    let last_message = match (text, sender) {
        (Some(text), Some(sender_id)) => Some(LastMessage { text, sender_id }),
        _ => None,
    };

    Ok(Conversation {
        id: uuid_col(row, 0)?,
        participants: [uuid_col(row, 1)?, uuid_col(row, 2)?],
        last_message,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}
