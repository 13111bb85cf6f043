//! Presence registry: which users currently have a live connection, and the
//! outbound queue that reaches each of them.
//!
//! Key membership in the map *is* online status. Each entry carries the
//! [`ConnectionId`] of the session that registered it so that a session can
//! only remove its own entry, never a newer connection's.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_shared::{OutboundEvent, ProtocolError, UserId};

/// Identity of one physical connection, distinct across reconnects of the
/// same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single failed write to one connection.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Outbound queue full")]
    QueueFull,

    #[error("Connection closed")]
    Closed,

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Write side of a connection: a bounded queue drained into the socket by
/// the connection's writer task.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
}

impl OutboundHandle {
    /// Create a handle with a fresh connection id and its queue receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Encode and enqueue an event. Never waits for queue space.
    pub fn send(&self, event: &OutboundEvent) -> Result<(), DeliveryError> {
        self.send_frame(event.encode()?)
    }

    /// Enqueue an already-encoded text frame.
    pub fn send_frame(&self, frame: String) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<UserId, OutboundHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the route to `user`, replacing any previous
    /// connection for that user. The replaced handle is returned; it is not
    /// closed here.
    pub async fn register(&self, user: UserId, handle: OutboundHandle) -> Option<OutboundHandle> {
        let mut connections = self.connections.write().await;
        let connection = handle.id();
        let replaced = connections.insert(user.clone(), handle);

        info!(
            %user,
            %connection,
            replaced = replaced.is_some(),
            online = connections.len(),
            "User registered"
        );

        replaced
    }

    /// Remove `user` only if its entry still belongs to `connection`.
    /// Returns whether an entry was removed.
    pub async fn deregister(&self, user: &UserId, connection: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;

        match connections.get(user).map(OutboundHandle::id) {
            Some(current) if current == connection => {
                connections.remove(user);
                info!(%user, %connection, online = connections.len(), "User deregistered");
                true
            }
            Some(current) => {
                debug!(
                    %user,
                    %connection,
                    %current,
                    "Skipping deregistration of superseded connection"
                );
                false
            }
            None => false,
        }
    }

    pub async fn lookup(&self, user: &UserId) -> Option<OutboundHandle> {
        self.connections.read().await.get(user).cloned()
    }

    /// Write `event` to every registered connection. A failed write to one
    /// peer is logged and skipped. Returns how many writes were accepted.
    pub async fn broadcast(&self, event: &OutboundEvent) -> usize {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode broadcast event");
                return 0;
            }
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;

        for (user, handle) in connections.iter() {
            match handle.send_frame(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::QueueFull) => {
                    warn!(target_user = %user, "Dropping broadcast for slow connection");
                }
                Err(e) => {
                    debug!(target_user = %user, error = %e, "Broadcast write failed");
                }
            }
        }

        delivered
    }

    /// Currently registered users, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.connections.read().await.contains_key(user)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
