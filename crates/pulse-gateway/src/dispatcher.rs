use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use pulse_types::events::GatewayEvent;

use crate::auth::TokenVerifier;
use crate::presence::{ChannelHandle, InMemoryPresence, PresenceRegistry};

/// Capacity of the fan-out channel shared by every connection.
const BROADCAST_CAPACITY: usize = 1024;

/// Owns presence and every outbound path to connected clients.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Events every connected client receives
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> the one connection that receives targeted pushes
    presence: Arc<dyn PresenceRegistry>,

    verifier: TokenVerifier,
}

/// One accepted connection, as seen by the connection loop.
pub struct Session {
    pub conn_id: Uuid,

    /// `None` for anonymous connections
    pub user_id: Option<Uuid>,

    /// Targeted pushes. Anonymous connections never get one.
    pub events: Option<mpsc::UnboundedReceiver<GatewayEvent>>,

    pub broadcasts: broadcast::Receiver<GatewayEvent>,
}

impl Session {
    /// Next targeted event. Pends forever on anonymous connections.
    pub async fn next_targeted(&mut self) -> Option<GatewayEvent> {
        recv_targeted(&mut self.events).await
    }
}

/// Receive from an optional targeted queue; a missing queue never yields.
pub async fn recv_targeted(events: &mut Option<mpsc::UnboundedReceiver<GatewayEvent>>) -> Option<GatewayEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Dispatcher {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self::with_registry(verifier, Arc::new(InMemoryPresence::new()))
    }

    pub fn with_registry(verifier: TokenVerifier, presence: Arc<dyn PresenceRegistry>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                presence,
                verifier,
            }),
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// Subscribe to gateway-wide events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every connected client. Having no clients is fine.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Accept a connection. A claim that fails verification leaves the
    /// connection anonymous: it gets broadcasts but never enters presence.
    pub fn connect(&self, identity_claim: Option<&str>) -> Session {
        let conn_id = Uuid::new_v4();
        // Subscribe before the snapshot goes out so the new client sees it.
        let broadcasts = self.subscribe();

        let user_id = self.inner.verifier.verify_claim(identity_claim).map(|c| c.sub);
        let events = user_id.map(|user_id| {
            let (tx, rx) = mpsc::unbounded_channel();
            if let Some(previous) = self.inner.presence.register(user_id, ChannelHandle::new(conn_id, tx)) {
                info!(
                    "User {} reconnected; connection {} no longer receives pushes",
                    user_id,
                    previous.conn_id()
                );
            }
            rx
        });

        match user_id {
            Some(user_id) => info!("User {} connected ({})", user_id, conn_id),
            None => debug!("Anonymous connection {}", conn_id),
        }

        self.broadcast_online_users();

        Session {
            conn_id,
            user_id,
            events,
            broadcasts,
        }
    }

    /// Drop a connection. Only removes presence if this connection still owns it.
    pub fn disconnect(&self, user_id: Option<Uuid>, conn_id: Uuid) {
        if let Some(user_id) = user_id {
            if self.inner.presence.unregister(user_id, conn_id) {
                info!("User {} disconnected ({})", user_id, conn_id);
            } else {
                debug!("Stale disconnect for {} ({}), newer connection kept", user_id, conn_id);
            }
        }
        self.broadcast_online_users();
    }

    /// Best-effort targeted send. Returns true if the event was handed to a
    /// live connection; absent users get it on their next pull instead.
    pub fn push(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let Some(channel) = self.inner.presence.lookup(user_id) else {
            debug!("User {} offline, {} not pushed", user_id, event.name());
            return false;
        };
        let name = event.name();
        if channel.send(event) {
            true
        } else {
            debug!("Connection for {} closed before {} could be pushed", user_id, name);
            false
        }
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.inner.presence.snapshot_user_ids()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.presence.lookup(user_id).is_some()
    }

    pub fn broadcast_online_users(&self) {
        self.broadcast(GatewayEvent::OnlineUsers(self.online_users()));
    }
}
