use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// First frame on every connection. `user_id` is `None` for anonymous connections.
    #[serde(rename = "ready")]
    Ready { user_id: Option<Uuid> },

    /// Full snapshot of online user ids, broadcast on every connect and disconnect
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<Uuid>),

    /// A direct message addressed to the receiving user
    #[serde(rename = "newMessage")]
    NewMessage(Message),

    /// A notification addressed to the receiving user
    #[serde(rename = "notification")]
    Notification(Notification),

    /// Reply to a client `test` command
    #[serde(rename = "test")]
    Test {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GatewayEvent {
    /// Wire name of the event, as it appears in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::OnlineUsers(_) => "getOnlineUsers",
            Self::NewMessage(_) => "newMessage",
            Self::Notification(_) => "notification",
            Self::Test { .. } => "test",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Liveness probe; answered with a `test` event on the same connection
    #[serde(rename = "test")]
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_users_uses_socket_event_name() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(GatewayEvent::OnlineUsers(vec![id])).unwrap();
        assert_eq!(json["type"], "getOnlineUsers");
        assert_eq!(json["data"][0], id.to_string());
    }

    #[test]
    fn test_command_parses_without_data() {
        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"test"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Test));
    }
}
