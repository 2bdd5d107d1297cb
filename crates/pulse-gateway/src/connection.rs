use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use pulse_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::{Dispatcher, Session, recv_targeted};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How much of an unparseable frame ends up in the log.
const RAW_LOG_CHARS: usize = 200;

/// Query string of the gateway upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Serve one WebSocket connection until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let Session {
        conn_id,
        user_id,
        mut events,
        mut broadcasts,
    } = dispatcher.connect(token.as_deref());

    let ready = GatewayEvent::Ready { user_id };
    if !send_event(&mut sender, &ready).await {
        dispatcher.disconnect(user_id, conn_id);
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Command replies go back through this connection's own queue so the
    // send task stays the only writer.
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<GatewayEvent>();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcasts.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = recv_targeted(&mut events) => {
                    let Some(event) = result else {
                        // A newer connection for this user took over pushes;
                        // this one keeps its broadcasts and commands.
                        debug!("Connection {} no longer receives targeted pushes", conn_id);
                        events = None;
                        continue;
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Some(event) = reply_rx.recv() => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        let _ = reply_tx.send(handle_command(cmd));
                    }
                    Err(e) => {
                        warn!("Bad gateway command: {} -- raw: {}", e, truncated(&text, RAW_LOG_CHARS));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(user_id, conn_id);
    match user_id {
        Some(user_id) => info!("{} left the gateway ({})", user_id, conn_id),
        None => debug!("Anonymous connection {} closed", conn_id),
    }
}

fn handle_command(cmd: GatewayCommand) -> GatewayEvent {
    match cmd {
        GatewayCommand::Test => GatewayEvent::Test {
            message: "Socket connection is working".into(),
            timestamp: chrono::Utc::now(),
        },
    }
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
fn truncated(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.name(), e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_answered_with_test_event() {
        let reply = handle_command(GatewayCommand::Test);
        assert_eq!(reply.name(), "test");
    }

    #[test]
    fn gateway_query_token_is_optional() {
        let q: GatewayQuery = serde_json::from_str("{}").unwrap();
        assert!(q.token.is_none());
    }

    #[test]
    fn raw_frames_are_truncated_on_char_boundaries() {
        let frame = format!("a{}", "é".repeat(RAW_LOG_CHARS));
        let cut = truncated(&frame, RAW_LOG_CHARS);
        assert_eq!(cut.chars().count(), RAW_LOG_CHARS);
        assert!(cut.ends_with('é'));

        assert_eq!(truncated("short", RAW_LOG_CHARS), "short");
    }
}
