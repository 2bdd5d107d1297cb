use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;
use uuid::Uuid;

use pulse_types::api::{Claims, CreateNotificationRequest, StatusResponse, UnreadCountResponse};
use pulse_types::events::GatewayEvent;
use pulse_types::models::{Notification, NotificationKind, NotificationView, SubjectDetail, SubjectRef};

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, run_blocking};

// -- Fan-out --

/// Record a notification, then try to push it to the recipient.
///
/// Self-triggered events produce nothing and return `None`. The push is
/// best-effort: an offline recipient finds the notification on their next
/// fetch.
pub fn notify(
    state: &AppStateInner,
    recipient_id: Uuid,
    sender_id: Uuid,
    kind: NotificationKind,
    subject: Option<SubjectRef>,
) -> Result<Option<Notification>, ApiError> {
    if recipient_id == sender_id {
        debug!("Skipping self-triggered {} notification for {}", kind.as_str(), sender_id);
        return Ok(None);
    }

    let notification = state.db.insert_notification(recipient_id, sender_id, kind, subject)?;
    state
        .dispatcher
        .push(recipient_id, GatewayEvent::Notification(notification.clone()));
    Ok(Some(notification))
}

/// Pull-API creation on behalf of `sender_id`. Only admins may send `admin`
/// notices. A subject must fit the kind and exist; a message subject must
/// come from the conversation between sender and recipient.
pub fn create_notification(
    state: &AppStateInner,
    sender_id: Uuid,
    req: CreateNotificationRequest,
) -> Result<Option<Notification>, ApiError> {
    if !req.kind.accepts(req.subject.as_ref()) {
        return Err(ApiError::BadRequest("Subject does not fit the notification kind"));
    }
    if !state.db.user_exists(req.recipient_id)? {
        return Err(ApiError::NotFound("recipient"));
    }
    if req.kind == NotificationKind::Admin {
        let privileged = state.db.get_user_role(sender_id)?.is_some_and(|r| r.is_privileged());
        if !privileged {
            return Err(ApiError::Forbidden("Admin access required"));
        }
    }

    if let Some(subject) = req.subject {
        let detail = resolve_subject(state, subject)?.ok_or(ApiError::NotFound(subject_name(subject)))?;
        if let SubjectDetail::Message(message) = detail {
            let conversation = state
                .db
                .get_conversation(message.conversation_id)?
                .ok_or(ApiError::NotFound("message"))?;
            if !conversation.has_participant(sender_id) {
                return Err(ApiError::Forbidden("Not your conversation"));
            }
            if !conversation.has_participant(req.recipient_id) {
                return Err(ApiError::BadRequest("Message is not from a conversation with the recipient"));
            }
        }
    }

    notify(state, req.recipient_id, sender_id, req.kind, req.subject)
}

fn subject_name(subject: SubjectRef) -> &'static str {
    match subject {
        SubjectRef::Post(_) => "post",
        SubjectRef::Comment(_) => "comment",
        SubjectRef::Message(_) => "message",
    }
}

/// Load what `subject` points at, or `None` if it is gone.
fn resolve_subject(state: &AppStateInner, subject: SubjectRef) -> Result<Option<SubjectDetail>, ApiError> {
    Ok(match subject {
        SubjectRef::Post(id) => state.db.get_post(id)?.map(SubjectDetail::Post),
        SubjectRef::Comment(id) => state.db.get_comment(id)?.map(SubjectDetail::Comment),
        SubjectRef::Message(id) => state.db.get_message(id)?.map(SubjectDetail::Message),
    })
}

// -- Owner operations --

/// Notifications of `owner_id`, newest first, with sender and subject filled in.
pub fn list_notifications(state: &AppStateInner, owner_id: Uuid) -> Result<Vec<NotificationView>, ApiError> {
    let notifications = state.db.get_notifications_for(owner_id)?;
    let mut sender_ids: Vec<Uuid> = notifications.iter().map(|n| n.sender_id).collect();
    sender_ids.sort();
    sender_ids.dedup();
    let senders = state.db.get_user_summaries(&sender_ids)?;

    notifications
        .into_iter()
        .map(|notification| {
            let subject_detail = match notification.subject {
                Some(subject) => resolve_subject(state, subject)?,
                None => None,
            };
            Ok(NotificationView {
                sender: senders.get(&notification.sender_id).cloned(),
                subject_detail,
                notification,
            })
        })
        .collect()
}

pub fn unread_count(state: &AppStateInner, owner_id: Uuid) -> Result<usize, ApiError> {
    Ok(state.db.count_unread_notifications(owner_id)?)
}

/// Check that `owner_id` is the recipient of notification `id`.
fn authorize_owner(state: &AppStateInner, id: Uuid, owner_id: Uuid) -> Result<(), ApiError> {
    let notification = state.db.get_notification(id)?.ok_or(ApiError::NotFound("notification"))?;
    if notification.recipient_id != owner_id {
        return Err(ApiError::Forbidden("Not your notification"));
    }
    Ok(())
}

pub fn mark_read(state: &AppStateInner, id: Uuid, owner_id: Uuid) -> Result<Notification, ApiError> {
    authorize_owner(state, id, owner_id)?;
    state
        .db
        .mark_notification_read(id, owner_id)?
        .ok_or(ApiError::NotFound("notification"))
}

/// Idempotent: returns how many notifications flipped to read.
pub fn mark_all_read(state: &AppStateInner, owner_id: Uuid) -> Result<usize, ApiError> {
    let changed = state.db.mark_all_notifications_read(owner_id)?;
    debug!("Marked {} notifications read for {}", changed, owner_id);
    Ok(changed)
}

pub fn delete_notification(state: &AppStateInner, id: Uuid, owner_id: Uuid) -> Result<(), ApiError> {
    authorize_owner(state, id, owner_id)?;
    if !state.db.delete_notification(id, owner_id)? {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(())
}

// -- Handlers --

pub async fn list_notifications_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let views = run_blocking(&state, move |s| list_notifications(s, claims.sub)).await?;
    Ok(Json(views))
}

pub async fn unread_count_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = run_blocking(&state, move |s| unread_count(s, claims.sub)).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn create_notification_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<Response, ApiError> {
    let created = run_blocking(&state, move |s| create_notification(s, claims.sub, req)).await?;
    Ok(match created {
        Some(notification) => (StatusCode::CREATED, Json(notification)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn mark_read_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = run_blocking(&state, move |s| mark_read(s, id, claims.sub)).await?;
    Ok(Json(notification))
}

pub async fn mark_all_read_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |s| mark_all_read(s, claims.sub)).await?;
    Ok(Json(StatusResponse::new("All notifications marked as read")))
}

pub async fn delete_notification_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |s| delete_notification(s, id, claims.sub)).await?;
    Ok(Json(StatusResponse::new("Notification deleted")))
}
