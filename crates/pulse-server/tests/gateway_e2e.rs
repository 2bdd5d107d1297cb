use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use pulse_api::{AppState, AppStateInner};
use pulse_db::Database;
use pulse_gateway::{Dispatcher, TokenVerifier};
use pulse_types::api::Claims;
use pulse_types::models::Role;

const SECRET: &str = "e2e-test-secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, AppState) {
    let state = AppStateInner::new(
        Database::open_in_memory().unwrap(),
        Dispatcher::new(TokenVerifier::new(SECRET)),
    );
    let app = pulse_server::app::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn user(state: &AppState, name: &str) -> (Uuid, String) {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(id, name, &format!("{}@example.com", name.to_lowercase()), "hash", Role::User)
        .unwrap();
    let claims = Claims {
        sub: id,
        name: name.into(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    (id, token)
}

async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/gateway?token={}", addr, token))
        .await
        .unwrap();
    socket
}

/// Read frames until one of type `kind` arrives, skipping everything else.
async fn next_of(socket: &mut Socket, kind: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = socket.next().await.expect("socket closed").expect("socket error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {} frame within 5s", kind))
}

/// Wait for a `getOnlineUsers` snapshot that satisfies `pred`.
async fn online_until(socket: &mut Socket, pred: impl Fn(&[String]) -> bool) -> Vec<String> {
    loop {
        let frame = next_of(socket, "getOnlineUsers").await;
        let ids: Vec<String> = serde_json::from_value(frame["data"].clone()).unwrap();
        if pred(&ids) {
            return ids;
        }
    }
}

#[tokio::test]
async fn anonymous_connection_is_not_listed_online() {
    let (addr, state) = start().await;

    let mut socket = connect(addr, "undefined").await;
    let ready = next_of(&mut socket, "ready").await;
    assert!(ready["data"]["user_id"].is_null());
    assert!(state.dispatcher.online_users().is_empty());
}

#[tokio::test]
async fn message_is_pushed_to_online_receiver() {
    let (addr, state) = start().await;
    let (a, token_a) = user(&state, "Ann");
    let (b, token_b) = user(&state, "Ben");

    let mut socket_b = connect(addr, &token_b).await;
    let ready = next_of(&mut socket_b, "ready").await;
    assert_eq!(ready["data"]["user_id"], b.to_string());
    online_until(&mut socket_b, |ids| ids.contains(&b.to_string())).await;

    // A coming online is visible to B.
    let _socket_a = connect(addr, &token_a).await;
    online_until(&mut socket_b, |ids| ids.contains(&a.to_string())).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/messages/{}", addr, b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let sent: Value = response.json().await.unwrap();

    let pushed = next_of(&mut socket_b, "newMessage").await;
    assert_eq!(pushed["data"]["id"], sent["id"]);
    assert_eq!(pushed["data"]["text"], "hi");

    let notification = next_of(&mut socket_b, "notification").await;
    assert_eq!(notification["data"]["kind"], "message");
    assert_eq!(notification["data"]["recipient_id"], b.to_string());
}

#[tokio::test]
async fn offline_receiver_pulls_what_was_missed() {
    let (addr, state) = start().await;
    let (_a, token_a) = user(&state, "Ann");
    let (b, token_b) = user(&state, "Ben");
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/messages/{}", addr, b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let notifications: Vec<Value> = client
        .get(format!("http://{}/notifications", addr))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "message");
    assert_eq!(notifications[0]["sender"]["full_name"], "Ann");

    let conversations: Vec<Value> = client
        .get(format!("http://{}/conversations", addr))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["last_message"]["text"], "hi");
}

#[tokio::test]
async fn test_command_is_echoed() {
    use futures_util::SinkExt;

    let (addr, state) = start().await;
    let (_a, token_a) = user(&state, "Ann");

    let mut socket = connect(addr, &token_a).await;
    next_of(&mut socket, "ready").await;
    socket.send(Message::Text(r#"{"type":"test"}"#.into())).await.unwrap();

    let reply = next_of(&mut socket, "test").await;
    assert!(reply["data"]["message"].is_string());
}
