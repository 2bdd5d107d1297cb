/// Database row types that never leave the store as-is.
/// Everything else maps straight onto the pulse-types models.
use chrono::{DateTime, Utc};
use pulse_types::models::{Role, User};
use uuid::Uuid;

pub struct UserRow {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_photo: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            profile_photo: row.profile_photo,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

/// Outcome of the idempotent find-or-create on a participant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationSlot {
    Created,
    /// The pair already had a conversation, possibly inserted by a concurrent
    /// writer between our lookup and our insert.
    Existing,
}
