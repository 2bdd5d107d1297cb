use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MediaType, NotificationKind, SubjectRef};

// -- JWT Claims --

/// Identity token claims shared by the REST middleware (pulse-api) and the
/// WebSocket handshake (pulse-gateway). Tokens are issued by the external
/// auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub subject: Option<SubjectRef>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: usize,
}

// -- Stories --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub media_url: String,
    pub media_type: MediaType,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub body: String,
    pub media_url: String,
    #[serde(default = "default_media_type")]
    pub media_type: MediaType,
}

fn default_media_type() -> MediaType {
    MediaType::Image
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub body: String,
}

/// Result of a follow/like/bookmark toggle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
