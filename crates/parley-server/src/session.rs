//! Per-connection session lifecycle: `Connecting -> Active -> Closed`.
//!
//! A session owns at most one registry entry. It registers and announces
//! itself on activation, feeds each inbound frame to the [`EventRouter`] one
//! at a time, and on close removes its entry (if still its own) and
//! announces the user offline.

use std::sync::Arc;

use tracing::{debug, info};

use parley_shared::{InboundEvent, OutboundEvent, UserId};

use crate::error::ServerError;
use crate::registry::{ConnectionId, OutboundHandle};
use crate::router::EventRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

pub struct Session {
    user: UserId,
    outbound: OutboundHandle,
    router: Arc<EventRouter>,
    state: SessionState,
}

impl Session {
    /// Start a session for `user`. Fails if the identifier is empty.
    pub fn new(
        user: UserId,
        outbound: OutboundHandle,
        router: Arc<EventRouter>,
    ) -> Result<Self, ServerError> {
        if user.is_empty() {
            return Err(ServerError::MissingUserId);
        }

        Ok(Self {
            user,
            outbound,
            router,
            state: SessionState::Connecting,
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.outbound.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register with the presence registry, then announce the user online
    /// and hand this connection the current online list.
    pub async fn activate(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }

        let registry = self.router.registry();
        if registry
            .register(self.user.clone(), self.outbound.clone())
            .await
            .is_some()
        {
            info!(user = %self.user, "Previous connection superseded");
        }
        self.state = SessionState::Active;

        registry
            .broadcast(&OutboundEvent::online(self.user.clone()))
            .await;

        let snapshot = OutboundEvent::OnlineUsers(registry.online_users().await);
        if let Err(e) = self.outbound.send(&snapshot) {
            debug!(user = %self.user, error = %e, "Online snapshot not delivered");
        }

        info!(user = %self.user, connection = %self.connection_id(), "Session active");
    }

    /// Decode one inbound text frame and route it. Undecodable frames are
    /// dropped and the session carries on.
    pub async fn handle_frame(&self, raw: &str) {
        if self.state != SessionState::Active {
            return;
        }

        match InboundEvent::decode(raw) {
            Ok(event) => {
                self.router
                    .dispatch(&self.user, &self.outbound, event)
                    .await
            }
            Err(e) => debug!(user = %self.user, error = %e, "Discarding inbound frame"),
        }
    }

    /// Leave the registry and announce the user offline. The offline
    /// broadcast is skipped when a newer connection for the same user has
    /// taken over the registry entry. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_active = self.state == SessionState::Active;
        self.state = SessionState::Closed;

        if !was_active {
            return;
        }

        let registry = self.router.registry();
        if registry.deregister(&self.user, self.connection_id()).await {
            registry
                .broadcast(&OutboundEvent::offline(self.user.clone()))
                .await;
        }

        info!(user = %self.user, connection = %self.connection_id(), "Session closed");
    }
}
