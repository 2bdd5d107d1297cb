use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_photo: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The public slice of a user embedded in other payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub profile_photo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

// -- Conversations --

/// Denormalized preview of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: Uuid,
}

/// A direct conversation between an unordered pair of users.
///
/// `participants` is stored sorted, so `[a, b]` and `[b, a]` name the same
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`. A self-conversation returns `user_id`.
    pub fn peer_of(&self, user_id: Uuid) -> Uuid {
        if self.participants[0] == user_id {
            self.participants[1]
        } else {
            self.participants[0]
        }
    }
}

/// Conversation as listed for one participant, with the other side populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub peer: UserSummary,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Message,
    Admin,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Message => "message",
            NotificationKind::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            "follow" => Some(NotificationKind::Follow),
            "message" => Some(NotificationKind::Message),
            "admin" => Some(NotificationKind::Admin),
            _ => None,
        }
    }

    /// Whether `subject` is something this kind of notification can point at.
    /// Follows carry no subject; admin notices may point at anything.
    pub fn accepts(&self, subject: Option<&SubjectRef>) -> bool {
        match (self, subject) {
            (NotificationKind::Admin, _) => true,
            (NotificationKind::Follow, None) => true,
            (NotificationKind::Like, Some(SubjectRef::Post(_))) => true,
            (NotificationKind::Comment, Some(SubjectRef::Post(_) | SubjectRef::Comment(_))) => true,
            (NotificationKind::Message, Some(SubjectRef::Message(_))) => true,
            _ => false,
        }
    }
}

/// What a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    Post(Uuid),
    Comment(Uuid),
    Message(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Uuid,
    pub kind: NotificationKind,
    /// Cleared when the referenced post, comment or message is deleted.
    pub subject: Option<SubjectRef>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// The post, comment or message a notification points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SubjectDetail {
    Post(Post),
    Comment(Comment),
    Message(Message),
}

/// Notification as returned by the pull API, with the sender and subject populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<UserSummary>,
    pub subject_detail: Option<SubjectDetail>,
}

// -- Stories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_url: String,
    pub media_type: MediaType,
    pub views: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Active stories of one user, as shown in the stories bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryGroup {
    pub user: UserSummary,
    pub stories: Vec<Story>,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub body: String,
    pub media_url: String,
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub creator_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// -- Admin --

/// Counts reported back after a user and everything they own were removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub posts: usize,
    pub conversations: usize,
    pub followers: usize,
    pub following: usize,
}

/// Deletion preview: how much data references a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub posts: usize,
    pub comments: usize,
    pub conversations: usize,
    pub notifications: usize,
    pub stories: usize,
    pub followers: usize,
    pub following: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_kinds_accept_matching_subjects() {
        let post = SubjectRef::Post(Uuid::new_v4());
        let message = SubjectRef::Message(Uuid::new_v4());

        assert!(NotificationKind::Follow.accepts(None));
        assert!(!NotificationKind::Follow.accepts(Some(&message)));
        assert!(NotificationKind::Like.accepts(Some(&post)));
        assert!(!NotificationKind::Like.accepts(None));
        assert!(!NotificationKind::Message.accepts(Some(&post)));
        assert!(NotificationKind::Admin.accepts(None));
        assert!(NotificationKind::Admin.accepts(Some(&message)));
    }
}
