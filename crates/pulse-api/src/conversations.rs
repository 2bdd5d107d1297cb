use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use pulse_db::models::ConversationSlot;
use pulse_types::api::{Claims, SendMessageRequest, StatusResponse};
use pulse_types::events::GatewayEvent;
use pulse_types::models::{ConversationView, LastMessage, Message, NotificationKind, SubjectRef, UserSummary};

use crate::error::ApiError;
use crate::notifications::notify;
use crate::state::{AppState, AppStateInner, run_blocking};

/// Send `text` from `sender_id` to `receiver_id`.
///
/// The message is durable before anything is pushed: the receiver gets a
/// `newMessage` and, unless they are the sender, a `message` notification.
pub fn send_message(
    state: &AppStateInner,
    sender_id: Uuid,
    receiver_id: Uuid,
    text: &str,
) -> Result<Message, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Message text is required"));
    }
    if !state.db.user_exists(receiver_id)? {
        return Err(ApiError::NotFound("receiver"));
    }

    let last = LastMessage {
        text: text.to_string(),
        sender_id,
    };
    let (conversation, slot) = state.db.find_or_create_conversation(sender_id, receiver_id, &last)?;
    if slot == ConversationSlot::Created {
        info!("Started conversation {} between {} and {}", conversation.id, sender_id, receiver_id);
    }

    let message = state.db.insert_message(conversation.id, sender_id, text)?;

    // A stale preview is tolerable; the message log is already correct.
    if let Err(e) = state.db.set_last_message(conversation.id, &last) {
        error!("Failed to update preview of conversation {}: {:#}", conversation.id, e);
    }

    state
        .dispatcher
        .push(receiver_id, GatewayEvent::NewMessage(message.clone()));
    // The message is stored and delivered; failing here would invite a
    // duplicate resend.
    if let Err(e) = notify(
        state,
        receiver_id,
        sender_id,
        NotificationKind::Message,
        Some(SubjectRef::Message(message.id)),
    ) {
        error!("Failed to record message notification for {}: {}", receiver_id, e);
    }

    Ok(message)
}

/// Message log between `user_id` and `peer_id`, oldest first.
pub fn list_messages(state: &AppStateInner, user_id: Uuid, peer_id: Uuid) -> Result<Vec<Message>, ApiError> {
    let conversation = state
        .db
        .get_conversation_by_pair(user_id, peer_id)?
        .ok_or(ApiError::NotFound("conversation"))?;
    Ok(state.db.get_messages(conversation.id)?)
}

/// Conversations of `user_id`, most recently active first, each with the
/// other participant filled in.
pub fn list_conversations(state: &AppStateInner, user_id: Uuid) -> Result<Vec<ConversationView>, ApiError> {
    let conversations = state.db.get_conversations_for_user(user_id)?;
    let peer_ids: Vec<Uuid> = conversations.iter().map(|c| c.peer_of(user_id)).collect();
    let peers = state.db.get_user_summaries(&peer_ids)?;

    Ok(conversations
        .into_iter()
        .map(|c| {
            let peer_id = c.peer_of(user_id);
            let peer = peers.get(&peer_id).cloned().unwrap_or_else(|| UserSummary {
                id: peer_id,
                full_name: String::new(),
                profile_photo: String::new(),
            });
            ConversationView {
                id: c.id,
                peer,
                last_message: c.last_message,
                created_at: c.created_at,
                updated_at: c.updated_at,
            }
        })
        .collect())
}

/// Delete a conversation and its messages. Only participants may.
pub fn delete_conversation(state: &AppStateInner, conversation_id: Uuid, requester_id: Uuid) -> Result<(), ApiError> {
    let conversation = state
        .db
        .get_conversation(conversation_id)?
        .ok_or(ApiError::NotFound("conversation"))?;
    if !conversation.has_participant(requester_id) {
        return Err(ApiError::Forbidden("Not a participant of this conversation"));
    }

    if !state.db.delete_conversation(conversation_id)? {
        debug!("Conversation {} already gone", conversation_id);
        return Err(ApiError::NotFound("conversation"));
    }
    info!("{} deleted conversation {}", requester_id, conversation_id);
    Ok(())
}

// -- Handlers --

pub async fn send_message_handler(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |s| send_message(s, claims.sub, receiver_id, &req.text)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages_handler(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(&state, move |s| list_messages(s, claims.sub, peer_id)).await?;
    Ok(Json(messages))
}

pub async fn list_conversations_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = run_blocking(&state, move |s| list_conversations(s, claims.sub)).await?;
    Ok(Json(conversations))
}

pub async fn delete_conversation_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |s| delete_conversation(s, conversation_id, claims.sub)).await?;
    Ok(Json(StatusResponse::new("Conversation deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn first_message_creates_one_conversation_and_one_notification() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");

        let message = send_message(&state, a, b, "hi").unwrap();

        let conversations = state.db.get_conversations_for_user(a).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].last_message.as_ref().unwrap().text, "hi");
        assert_eq!(list_messages(&state, b, a).unwrap(), vec![message.clone()]);

        let notifications = state.db.get_notifications_for(b).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Message);
        assert_eq!(notifications[0].recipient_id, b);
        assert_eq!(notifications[0].subject, Some(SubjectRef::Message(message.id)));
    }

    #[tokio::test]
    async fn online_receiver_gets_message_then_notification() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");
        let mut session = testing::connect(&state, b);

        let message = send_message(&state, a, b, "hi").unwrap();

        let names: Vec<&str> = testing::drain(&mut session).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["newMessage", "notification"]);
        assert_eq!(state.db.get_messages(message.conversation_id).unwrap().len(), 1);
    }

    #[test]
    fn repeated_sends_reuse_the_conversation() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");

        send_message(&state, a, b, "one").unwrap();
        send_message(&state, b, a, "two").unwrap();

        let conversations = list_conversations(&state, a).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].peer.id, b);
        assert_eq!(conversations[0].peer.full_name, "Ben");
        assert_eq!(conversations[0].last_message.as_ref().unwrap().text, "two");
        assert_eq!(list_messages(&state, a, b).unwrap().len(), 2);
    }

    #[test]
    fn messaging_yourself_creates_no_notification() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");

        send_message(&state, a, a, "note to self").unwrap();
        assert!(state.db.get_notifications_for(a).unwrap().is_empty());
    }

    #[test]
    fn invalid_sends_are_rejected() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");

        assert!(matches!(send_message(&state, a, b, "   "), Err(ApiError::BadRequest(_))));
        assert!(matches!(send_message(&state, a, Uuid::new_v4(), "hi"), Err(ApiError::NotFound(_))));
        assert!(state.db.get_conversations_for_user(a).unwrap().is_empty());
    }

    #[test]
    fn listing_without_a_conversation_is_not_found() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");

        assert!(matches!(list_messages(&state, a, b), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn only_participants_may_delete() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");
        let c = testing::user(&state, "Cat");
        let message = send_message(&state, a, b, "hi").unwrap();

        assert!(matches!(
            delete_conversation(&state, message.conversation_id, c),
            Err(ApiError::Forbidden(_))
        ));
        delete_conversation(&state, message.conversation_id, b).unwrap();

        assert!(matches!(list_messages(&state, a, b), Err(ApiError::NotFound(_))));
        assert!(state.db.get_messages(message.conversation_id).unwrap().is_empty());
        // The message notification outlives its subject.
        let notifications = state.db.get_notifications_for(b).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].subject, None);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_a_delivered_message() {
        let state = testing::state();
        let a = testing::user(&state, "Ann");
        let b = testing::user(&state, "Ben");
        let mut session = testing::connect(&state, b);
        state
            .db
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE notifications")?;
                Ok(())
            })
            .unwrap();

        let message = send_message(&state, a, b, "hi").unwrap();

        assert_eq!(list_messages(&state, b, a).unwrap(), vec![message.clone()]);
        let pushed = testing::drain(&mut session);
        assert!(matches!(pushed.as_slice(), [GatewayEvent::NewMessage(m)] if m.id == message.id));
    }
}
