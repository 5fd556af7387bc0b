//! Process-local presence registry: which identity is reachable through which
//! live connection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use lumen_shared::constants::CONNECTION_QUEUE_DEPTH;
use lumen_shared::protocol::ServerEvent;
use lumen_shared::types::{ConnId, UserId};

/// Addressable end of one websocket connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// A fresh handle and the receiving half of its bounded event queue.
    pub fn channel() -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_DEPTH);
        (Self { id: ConnId::new(), tx }, rx)
    }

    /// Queue an event without waiting. A full or closed queue drops it.
    pub fn push(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(conn = %self.id.short(), event = event.name(), "Dropping event for slow connection");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(conn = %self.id.short(), event = event.name(), "Dropping event for closed connection");
                false
            }
        }
    }
}

#[derive(Default)]
struct Entries {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_conn: HashMap<ConnId, UserId>,
}

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Entries>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user` to `handle`, replacing whatever was there (last writer wins).
    ///
    /// A connection serves one identity, so a previous registration of the
    /// same connection under another user is dropped.
    pub async fn register(&self, user: UserId, handle: ConnectionHandle) {
        let mut entries = self.inner.write().await;
        let conn = handle.id;

        if let Some(previous_user) = entries.by_conn.insert(conn, user) {
            if previous_user != user
                && entries.by_user.get(&previous_user).map(|h| h.id) == Some(conn)
            {
                entries.by_user.remove(&previous_user);
            }
        }

        if let Some(replaced) = entries.by_user.insert(user, handle) {
            if replaced.id != conn {
                entries.by_conn.remove(&replaced.id);
                debug!(user = %user.short(), old = %replaced.id.short(), "Replaced presence entry");
            }
        }

        info!(user = %user.short(), conn = %conn.short(), online = entries.by_user.len(), "User online");
    }

    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.by_user.get(&user).cloned()
    }

    /// Remove the entry held by `conn`, returning the identity that went
    /// offline. Returns `None` when the connection never joined or was
    /// overwritten by a newer one.
    pub async fn unregister(&self, conn: ConnId) -> Option<UserId> {
        let mut entries = self.inner.write().await;
        let user = entries.by_conn.remove(&conn)?;

        match entries.by_user.get(&user) {
            Some(current) if current.id == conn => {
                entries.by_user.remove(&user);
                info!(user = %user.short(), conn = %conn.short(), online = entries.by_user.len(), "User offline");
                Some(user)
            }
            _ => None,
        }
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.read().await.by_user.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_user.len()
    }
}
