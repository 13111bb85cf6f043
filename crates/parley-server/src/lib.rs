//! # parley-server
//!
//! Real-time chat relay. Clients connect over a websocket at `/ws?userId=..`
//! and exchange `{event, data}` envelopes:
//! - **chat** messages are stored and pushed to the recipient if online
//! - **read** receipts flag messages read and notify the original sender
//! - **typing** / **stopTyping** indicators are forwarded, never stored
//! - **getChats** / **getNotif** query the message store
//! - **online** / **offline** presence is broadcast on connect and disconnect
//!
//! All state is in memory and lives as long as the [`api::AppState`] that
//! owns it.

pub mod api;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod session;
pub mod ws;

pub use api::{build_router, serve, serve_on, AppState};
pub use config::ServerConfig;
pub use registry::{ConnectionId, OutboundHandle, PresenceRegistry};
pub use router::EventRouter;
pub use session::{Session, SessionState};
