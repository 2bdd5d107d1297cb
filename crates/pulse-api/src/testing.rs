use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use pulse_db::Database;
use pulse_gateway::{Dispatcher, Session, TokenVerifier};
use pulse_types::api::Claims;
use pulse_types::events::GatewayEvent;
use pulse_types::models::Role;

use crate::state::{AppState, AppStateInner};

pub const SECRET: &str = "api-test-secret";

pub fn state() -> AppState {
    AppStateInner::new(
        Database::open_in_memory().unwrap(),
        Dispatcher::new(TokenVerifier::new(SECRET)),
    )
}

fn create(state: &AppState, name: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(id, name, &format!("{}@example.com", name.to_lowercase()), "hash", role)
        .unwrap();
    id
}

pub fn user(state: &AppState, name: &str) -> Uuid {
    create(state, name, Role::User)
}

pub fn admin(state: &AppState, name: &str) -> Uuid {
    create(state, name, Role::Admin)
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id,
        name: "test".into(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Open a gateway session for `user_id`, as the WebSocket handshake would.
pub fn connect(state: &AppState, user_id: Uuid) -> Session {
    state.dispatcher.connect(Some(&token_for(user_id)))
}

/// Everything pushed to the session so far, without waiting.
pub fn drain(session: &mut Session) -> Vec<GatewayEvent> {
    let mut out = Vec::new();
    if let Some(rx) = session.events.as_mut() {
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
    }
    out
}
