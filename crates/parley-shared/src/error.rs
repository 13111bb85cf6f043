use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}
