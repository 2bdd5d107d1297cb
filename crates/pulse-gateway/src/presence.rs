use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use pulse_types::events::GatewayEvent;

/// Handle to one live connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ChannelHandle {
    pub fn new(conn_id: Uuid, tx: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self { conn_id, tx }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for the connection. Never blocks; returns false if the
    /// connection's receiver is gone.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Which users currently hold a live connection, and how to reach them.
///
/// Implementations must keep every call O(1) under their lock and must not
/// suspend: the registry is touched from every connect, disconnect and push.
pub trait PresenceRegistry: Send + Sync {
    /// Point `user_id` at `channel`, replacing any previous entry.
    /// Returns the displaced handle, if there was one.
    fn register(&self, user_id: Uuid, channel: ChannelHandle) -> Option<ChannelHandle>;

    /// Remove `user_id`'s entry, but only while it still belongs to connection
    /// `conn_id`. Returns true if an entry was removed.
    fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool;

    fn lookup(&self, user_id: Uuid) -> Option<ChannelHandle>;

    fn snapshot_user_ids(&self) -> Vec<Uuid>;
}

/// Single-lock in-process registry. Rebuilt from zero on restart.
#[derive(Default)]
pub struct InMemoryPresence {
    entries: RwLock<HashMap<Uuid, ChannelHandle>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceRegistry for InMemoryPresence {
    fn register(&self, user_id: Uuid, channel: ChannelHandle) -> Option<ChannelHandle> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, channel)
    }

    fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&user_id) {
            Some(current) if current.conn_id == conn_id => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    fn lookup(&self, user_id: Uuid) -> Option<ChannelHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    fn snapshot_user_ids(&self) -> Vec<Uuid> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}
