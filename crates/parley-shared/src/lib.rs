//! Wire types shared by the Parley relay and its clients.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{InboundEvent, Message, OutboundEvent};
pub use types::{MessageId, UserId};
