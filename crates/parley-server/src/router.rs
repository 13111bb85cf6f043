//! Event routing: one handler per inbound event type.
//!
//! Handlers touch shared state only through [`MessageStore`] and
//! [`PresenceRegistry`] methods. Outbound writes happen after the registry
//! lookup has returned, so no lock is held while a frame is enqueued.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_shared::protocol::{
    ChatPayload, GetChatsPayload, ReadPayload, TypingNotice, TypingPayload,
};
use parley_shared::{InboundEvent, OutboundEvent, UserId};
use parley_store::MessageStore;

use crate::registry::{DeliveryError, OutboundHandle, PresenceRegistry};

pub struct EventRouter {
    store: Arc<MessageStore>,
    registry: Arc<PresenceRegistry>,
}

impl EventRouter {
    pub fn new(store: Arc<MessageStore>, registry: Arc<PresenceRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Run the handler for `event` on behalf of `user`, whose own connection
    /// is `reply`.
    pub async fn dispatch(&self, user: &UserId, reply: &OutboundHandle, event: InboundEvent) {
        debug!(%user, event = event.name(), "Routing event");

        match event {
            InboundEvent::Chat(payload) => self.handle_chat(payload).await,
            InboundEvent::Read(payload) => self.handle_read(payload).await,
            InboundEvent::Typing(payload) => self.handle_typing(payload, false).await,
            InboundEvent::StopTyping(payload) => self.handle_typing(payload, true).await,
            InboundEvent::GetChats(payload) => self.handle_get_chats(reply, payload).await,
            InboundEvent::GetNotif => self.handle_get_notif(reply, user).await,
            InboundEvent::OnlineUsers => self.handle_online_users(reply).await,
            InboundEvent::Online(_) | InboundEvent::Offline(_) => {
                debug!(%user, "Ignoring client-sent presence event");
            }
        }
    }

    /// Store the message, then push it to the recipient if connected.
    async fn handle_chat(&self, payload: ChatPayload) {
        let ChatPayload { from, to, message } = payload;
        let stored = self.store.append(from, to, message).await;

        let recipient = self.registry.lookup(&stored.to).await;
        match recipient {
            Some(handle) => {
                let to = stored.to.clone();
                deliver(&to, &handle, &OutboundEvent::Chat(stored));
            }
            None => debug!(message_id = stored.id, to = %stored.to, "Recipient offline, message kept"),
        }
    }

    /// Mark `from -> to` as read and confirm to the original sender.
    async fn handle_read(&self, payload: ReadPayload) {
        self.store.mark_read(&payload.from, &payload.to).await;

        let sender = self.registry.lookup(&payload.from).await;
        if let Some(handle) = sender {
            let from = payload.from.clone();
            deliver(&from, &handle, &OutboundEvent::Read(payload));
        }
    }

    async fn handle_typing(&self, payload: TypingPayload, stopped: bool) {
        let Some(handle) = self.registry.lookup(&payload.to).await else {
            return;
        };

        let notice = TypingNotice { from: payload.from };
        let event = if stopped {
            OutboundEvent::StopTyping(notice)
        } else {
            OutboundEvent::Typing(notice)
        };
        deliver(&payload.to, &handle, &event);
    }

    async fn handle_get_chats(&self, reply: &OutboundHandle, payload: GetChatsPayload) {
        let history = self.store.history(&payload.user1, &payload.user2).await;
        reply_with(reply, &OutboundEvent::GetChats(history));
    }

    async fn handle_get_notif(&self, reply: &OutboundHandle, user: &UserId) {
        let unread = self.store.unread_for(user).await;
        reply_with(reply, &OutboundEvent::GetNotif(unread));
    }

    async fn handle_online_users(&self, reply: &OutboundHandle) {
        let users = self.registry.online_users().await;
        reply_with(reply, &OutboundEvent::OnlineUsers(users));
    }
}

/// Write to another user's connection. Failures stay with the target.
fn deliver(target: &UserId, handle: &OutboundHandle, event: &OutboundEvent) {
    match handle.send(event) {
        Ok(()) => {}
        Err(DeliveryError::QueueFull) => {
            warn!(target_user = %target, "Outbound queue full, dropping event");
        }
        Err(e) => {
            debug!(target_user = %target, error = %e, "Delivery failed");
        }
    }
}

/// Write back to the requesting connection.
fn reply_with(reply: &OutboundHandle, event: &OutboundEvent) {
    if let Err(e) = reply.send(event) {
        debug!(connection = %reply.id(), error = %e, "Reply not delivered");
    }
}
