use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pulse_api::middleware::require_auth;
use pulse_api::{AppState, admin, conversations, notifications, social, stories};
use pulse_gateway::connection::{self, GatewayQuery};

/// Assemble the HTTP API and the WebSocket gateway.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Conversations
        .route(
            "/messages/{user_id}",
            post(conversations::send_message_handler).get(conversations::list_messages_handler),
        )
        .route("/conversations", get(conversations::list_conversations_handler))
        .route(
            "/conversations/{conversation_id}",
            delete(conversations::delete_conversation_handler),
        )
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications_handler).post(notifications::create_notification_handler),
        )
        .route("/notifications/unread-count", get(notifications::unread_count_handler))
        .route("/notifications/read-all", patch(notifications::mark_all_read_handler))
        .route("/notifications/{id}/read", patch(notifications::mark_read_handler))
        .route("/notifications/{id}", delete(notifications::delete_notification_handler))
        // Stories
        .route(
            "/stories",
            get(stories::list_active_stories_handler).post(stories::create_story_handler),
        )
        .route("/stories/user/{user_id}", get(stories::user_stories_handler))
        .route("/stories/{id}", delete(stories::delete_story_handler))
        .route("/stories/{id}/view", post(stories::mark_viewed_handler))
        .route("/stories/{id}/views", get(stories::story_views_handler))
        // Social
        .route("/posts", post(social::create_post_handler))
        .route("/posts/{id}/like", post(social::toggle_like_handler))
        .route("/posts/{id}/bookmark", post(social::toggle_bookmark_handler))
        .route("/comments/{post_id}", post(social::add_comment_handler))
        .route("/users/{id}/follow", post(social::toggle_follow_handler))
        // Admin
        .route("/admin/users/{id}", delete(admin::delete_user_handler))
        .route("/admin/users/{id}/stats", get(admin::user_stats_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The identity token rides in the query string; without a valid one the
/// connection is anonymous.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, query.token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use pulse_api::AppStateInner;
    use pulse_db::Database;
    use pulse_gateway::{Dispatcher, TokenVerifier};

    fn app() -> Router {
        router(AppStateInner::new(
            Database::open_in_memory().unwrap(),
            Dispatcher::new(TokenVerifier::new("router-test-secret")),
        ))
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        let response = app()
            .oneshot(Request::builder().uri("/conversations").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
