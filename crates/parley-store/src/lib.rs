//! # parley-store
//!
//! In-memory storage for the Parley relay. Nothing here survives a restart:
//! the store lives exactly as long as the server process that constructed it.

pub mod messages;

pub use messages::{MessageStore, FIRST_MESSAGE_ID};
pub use parley_shared::Message;
