//! Append-only in-memory message log.
//!
//! Messages are kept in append order, which is also ascending `id` order.
//! Appends and read-flag updates take the write lock; queries take the read
//! lock and return owned snapshots, so later writes never show up in a
//! result that was already handed out.

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use parley_shared::{Message, MessageId, UserId};

/// First id handed out by a fresh store.
pub const FIRST_MESSAGE_ID: MessageId = 1;

struct Log {
    next_id: MessageId,
    messages: Vec<Message>,
}

/// Process-lifetime store of every chat message exchanged through the relay.
pub struct MessageStore {
    log: RwLock<Log>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Log {
                next_id: FIRST_MESSAGE_ID,
                messages: Vec::new(),
            }),
        }
    }

    /// Store a new unread message and return it with its assigned id.
    pub async fn append(&self, from: UserId, to: UserId, text: String) -> Message {
        let mut log = self.log.write().await;

        let id = log.next_id;
        log.next_id += 1;

        let message = Message {
            id,
            from,
            to,
            text,
            read: false,
            timestamp: Utc::now(),
        };
        log.messages.push(message.clone());

        debug!(message_id = id, from = %message.from, to = %message.to, "Stored message");
        message
    }

    /// Flag every message sent `from -> to` as read. Messages in the other
    /// direction are untouched. Returns how many messages changed state.
    pub async fn mark_read(&self, from: &UserId, to: &UserId) -> usize {
        let mut log = self.log.write().await;

        let mut flipped = 0;
        for message in log
            .messages
            .iter_mut()
            .filter(|m| !m.read && &m.from == from && &m.to == to)
        {
            message.read = true;
            flipped += 1;
        }

        if flipped > 0 {
            debug!(%from, %to, count = flipped, "Marked messages read");
        }
        flipped
    }

    /// Conversation between two users, both directions, in append order.
    pub async fn history(&self, user_a: &UserId, user_b: &UserId) -> Vec<Message> {
        let log = self.log.read().await;
        log.messages
            .iter()
            .filter(|m| {
                (&m.from == user_a && &m.to == user_b) || (&m.from == user_b && &m.to == user_a)
            })
            .cloned()
            .collect()
    }

    /// Unread messages addressed to `user`, in append order.
    pub async fn unread_for(&self, user: &UserId) -> Vec<Message> {
        let log = self.log.read().await;
        log.messages
            .iter()
            .filter(|m| &m.to == user && !m.read)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.messages.is_empty()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
