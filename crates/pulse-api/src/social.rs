use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use pulse_types::api::{Claims, CreateCommentRequest, CreatePostRequest, ToggleResponse};
use pulse_types::models::{Comment, NotificationKind, Post, SubjectRef};

use crate::error::ApiError;
use crate::notifications::notify;
use crate::state::{AppState, AppStateInner, run_blocking};

// -- Follows --

/// Follow `target_id`, or unfollow if already following. Returns true when
/// the follow now exists. Only a new follow notifies.
pub fn toggle_follow(state: &AppStateInner, follower_id: Uuid, target_id: Uuid) -> Result<bool, ApiError> {
    if follower_id == target_id {
        return Err(ApiError::BadRequest("You can't follow yourself"));
    }
    if !state.db.user_exists(target_id)? {
        return Err(ApiError::NotFound("user"));
    }

    let following = state.db.toggle_follow(follower_id, target_id)?;
    debug!("{} {} {}", follower_id, if following { "followed" } else { "unfollowed" }, target_id);
    if following {
        notify(state, target_id, follower_id, NotificationKind::Follow, None)?;
    }
    Ok(following)
}

// -- Posts --

pub fn create_post(state: &AppStateInner, creator_id: Uuid, req: CreatePostRequest) -> Result<Post, ApiError> {
    if req.body.trim().is_empty() && req.media_url.trim().is_empty() {
        return Err(ApiError::BadRequest("A post needs a body or media"));
    }
    Ok(state.db.insert_post(creator_id, req.body.trim(), &req.media_url, req.media_type)?)
}

/// Like or unlike a post. Likes on someone else's post notify its creator.
pub fn toggle_like(state: &AppStateInner, user_id: Uuid, post_id: Uuid) -> Result<bool, ApiError> {
    let post = state.db.get_post(post_id)?.ok_or(ApiError::NotFound("post"))?;

    let liked = state.db.toggle_like(post_id, user_id)?;
    if liked {
        notify(state, post.creator_id, user_id, NotificationKind::Like, Some(SubjectRef::Post(post_id)))?;
    }
    Ok(liked)
}

pub fn toggle_bookmark(state: &AppStateInner, user_id: Uuid, post_id: Uuid) -> Result<bool, ApiError> {
    if state.db.get_post(post_id)?.is_none() {
        return Err(ApiError::NotFound("post"));
    }
    Ok(state.db.toggle_bookmark(user_id, post_id)?)
}

// -- Comments --

pub fn add_comment(state: &AppStateInner, creator_id: Uuid, post_id: Uuid, body: &str) -> Result<Comment, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::BadRequest("Comment body is required"));
    }
    let post = state.db.get_post(post_id)?.ok_or(ApiError::NotFound("post"))?;

    let comment = state.db.insert_comment(post_id, creator_id, body)?;
    notify(
        state,
        post.creator_id,
        creator_id,
        NotificationKind::Comment,
        Some(SubjectRef::Comment(comment.id)),
    )?;
    Ok(comment)
}

// -- Handlers --

pub async fn toggle_follow_handler(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let active = run_blocking(&state, move |s| toggle_follow(s, claims.sub, target_id)).await?;
    Ok(Json(ToggleResponse { active }))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = run_blocking(&state, move |s| create_post(s, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn toggle_like_handler(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let active = run_blocking(&state, move |s| toggle_like(s, claims.sub, post_id)).await?;
    Ok(Json(ToggleResponse { active }))
}

pub async fn toggle_bookmark_handler(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let active = run_blocking(&state, move |s| toggle_bookmark(s, claims.sub, post_id)).await?;
    Ok(Json(ToggleResponse { active }))
}

pub async fn add_comment_handler(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = run_blocking(&state, move |s| add_comment(s, claims.sub, post_id, &req.body)).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
