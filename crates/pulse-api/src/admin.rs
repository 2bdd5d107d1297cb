use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use pulse_db::DeletionPhase;
use pulse_types::api::Claims;
use pulse_types::models::{DeletionSummary, UserStats};

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, run_blocking};

/// Delete `target_id` and everything that references them. All or nothing.
pub fn delete_user(state: &AppStateInner, target_id: Uuid, requester_id: Uuid) -> Result<DeletionSummary, ApiError> {
    delete_user_with(state, target_id, requester_id, |_| Ok(()))
}

/// `delete_user` with a hook that runs before each phase.
pub fn delete_user_with<F>(
    state: &AppStateInner,
    target_id: Uuid,
    requester_id: Uuid,
    before_phase: F,
) -> Result<DeletionSummary, ApiError>
where
    F: FnMut(DeletionPhase) -> anyhow::Result<()>,
{
    let summary = state.db.delete_user_cascade(target_id, requester_id, before_phase)?;
    info!("Admin {} deleted user {}", requester_id, target_id);
    Ok(summary)
}

/// What deleting `target_id` would remove. Admin only.
pub fn user_stats(state: &AppStateInner, target_id: Uuid, requester_id: Uuid) -> Result<UserStats, ApiError> {
    let privileged = state.db.get_user_role(requester_id)?.is_some_and(|r| r.is_privileged());
    if !privileged {
        return Err(ApiError::Forbidden("Admin access required"));
    }
    state.db.get_user_stats(target_id)?.ok_or(ApiError::NotFound("user"))
}

// -- Handlers --

pub async fn delete_user_handler(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = run_blocking(&state, move |s| delete_user(s, target_id, claims.sub)).await?;
    Ok(Json(summary))
}

pub async fn user_stats_handler(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = run_blocking(&state, move |s| user_stats(s, target_id, claims.sub)).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::send_message;
    use crate::social::toggle_follow;
    use crate::testing;

    #[test]
    fn admin_deletes_user_and_gets_summary() {
        let state = testing::state();
        let root = testing::admin(&state, "Root");
        let u = testing::user(&state, "Ugo");
        let b = testing::user(&state, "Ben");
        send_message(&state, u, b, "hi").unwrap();
        toggle_follow(&state, b, u).unwrap();

        let stats = user_stats(&state, u, root).unwrap();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.followers, 1);

        let summary = delete_user(&state, u, root).unwrap();
        assert_eq!(summary.conversations, 1);
        assert_eq!(summary.followers, 1);
        assert!(!state.db.user_exists(u).unwrap());
        assert!(state.db.get_notifications_for(b).unwrap().is_empty());
        assert!(state.db.get_conversations_for_user(b).unwrap().is_empty());
    }

    #[test]
    fn failed_phase_surfaces_internal_error_and_keeps_data() {
        let state = testing::state();
        let root = testing::admin(&state, "Root");
        let u = testing::user(&state, "Ugo");
        let b = testing::user(&state, "Ben");
        send_message(&state, u, b, "hi").unwrap();

        let result = delete_user_with(&state, u, root, |phase| {
            if phase == DeletionPhase::DeleteStories {
                anyhow::bail!("simulated store outage");
            }
            Ok(())
        });

        assert!(matches!(result, Err(ApiError::Internal(_))));
        assert!(state.db.user_exists(u).unwrap());
        assert_eq!(state.db.get_conversations_for_user(u).unwrap().len(), 1);
        assert_eq!(state.db.get_notifications_for(b).unwrap().len(), 1);
    }

    #[test]
    fn non_admins_are_turned_away() {
        let state = testing::state();
        let root = testing::admin(&state, "Root");
        let u = testing::user(&state, "Ugo");
        let b = testing::user(&state, "Ben");

        assert!(matches!(delete_user(&state, u, b), Err(ApiError::Forbidden(_))));
        assert!(matches!(user_stats(&state, u, b), Err(ApiError::Forbidden(_))));
        assert!(matches!(delete_user(&state, root, root), Err(ApiError::Forbidden(_))));
        assert!(matches!(delete_user(&state, Uuid::new_v4(), root), Err(ApiError::NotFound(_))));
        assert!(matches!(user_stats(&state, Uuid::new_v4(), root), Err(ApiError::NotFound(_))));
    }
}
