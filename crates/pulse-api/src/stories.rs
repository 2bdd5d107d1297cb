use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use pulse_types::api::{Claims, CreateStoryRequest, StatusResponse};
use pulse_types::models::{Story, StoryGroup, UserSummary};

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, run_blocking};

pub fn create_story(state: &AppStateInner, owner_id: Uuid, req: CreateStoryRequest) -> Result<Story, ApiError> {
    if req.media_url.trim().is_empty() {
        return Err(ApiError::BadRequest("Please choose an image or video"));
    }
    Ok(state.db.insert_story(owner_id, req.media_url.trim(), req.media_type)?)
}

/// Fetch an unexpired story that `requester_id` owns.
fn owned_story(state: &AppStateInner, story_id: Uuid, requester_id: Uuid) -> Result<Story, ApiError> {
    let story = state.db.get_story(story_id)?.ok_or(ApiError::NotFound("story"))?;
    if story.user_id != requester_id {
        return Err(ApiError::Forbidden("Not your story"));
    }
    Ok(story)
}

pub fn delete_story(state: &AppStateInner, story_id: Uuid, requester_id: Uuid) -> Result<(), ApiError> {
    owned_story(state, story_id, requester_id)?;
    if !state.db.delete_story(story_id)? {
        return Err(ApiError::NotFound("story"));
    }
    info!("{} deleted story {}", requester_id, story_id);
    Ok(())
}

/// Record a view. Repeats and the owner's own views change nothing.
pub fn mark_viewed(state: &AppStateInner, story_id: Uuid, viewer_id: Uuid) -> Result<Story, ApiError> {
    if state.db.get_story(story_id)?.is_none() {
        return Err(ApiError::NotFound("story"));
    }
    state.db.add_story_view(story_id, viewer_id)?;
    state.db.get_story(story_id)?.ok_or(ApiError::NotFound("story"))
}

/// Who has seen a story, in viewing order. Owner only.
pub fn story_views(state: &AppStateInner, story_id: Uuid, requester_id: Uuid) -> Result<Vec<UserSummary>, ApiError> {
    let story = owned_story(state, story_id, requester_id)?;
    let viewers = state.db.get_user_summaries(&story.views)?;
    Ok(story.views.iter().filter_map(|id| viewers.get(id).cloned()).collect())
}

/// Every unexpired story, grouped by owner. Groups follow the order of each
/// owner's newest story.
pub fn list_active_stories(state: &AppStateInner) -> Result<Vec<StoryGroup>, ApiError> {
    let stories = state.db.get_active_stories()?;

    let mut owners: Vec<Uuid> = Vec::new();
    let mut by_owner: HashMap<Uuid, Vec<Story>> = HashMap::new();
    for story in stories {
        let owner = story.user_id;
        by_owner
            .entry(owner)
            .or_insert_with(|| {
                owners.push(owner);
                Vec::new()
            })
            .push(story);
    }

    let summaries = state.db.get_user_summaries(&owners)?;
    Ok(owners
        .into_iter()
        .filter_map(|id| {
            let user = summaries.get(&id).cloned()?;
            let stories = by_owner.remove(&id)?;
            Some(StoryGroup { user, stories })
        })
        .collect())
}

/// Unexpired stories of `owner_id`, newest first. A viewer other than the
/// owner is recorded as having seen each of them.
pub fn user_stories(state: &AppStateInner, owner_id: Uuid, viewer_id: Uuid) -> Result<Vec<Story>, ApiError> {
    let stories = state.db.get_stories_of(owner_id)?;
    if owner_id == viewer_id || stories.is_empty() {
        return Ok(stories);
    }
    for story in &stories {
        state.db.add_story_view(story.id, viewer_id)?;
    }
    Ok(state.db.get_stories_of(owner_id)?)
}

// -- Handlers --

pub async fn create_story_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let story = run_blocking(&state, move |s| create_story(s, claims.sub, req)).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn delete_story_handler(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |s| delete_story(s, story_id, claims.sub)).await?;
    Ok(Json(StatusResponse::new("Story deleted")))
}

pub async fn mark_viewed_handler(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let story = run_blocking(&state, move |s| mark_viewed(s, story_id, claims.sub)).await?;
    Ok(Json(story))
}

pub async fn story_views_handler(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewers = run_blocking(&state, move |s| story_views(s, story_id, claims.sub)).await?;
    Ok(Json(viewers))
}

pub async fn list_active_stories_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let groups = run_blocking(&state, list_active_stories).await?;
    Ok(Json(groups))
}

pub async fn user_stories_handler(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stories = run_blocking(&state, move |s| user_stories(s, owner_id, claims.sub)).await?;
    Ok(Json(stories))
}
