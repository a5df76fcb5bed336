use crate::messages::Action;

/// Errors raised while building, encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed datagram: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Invalid params for {action}: {reason}")]
    InvalidParams { action: Action, reason: String },

    #[error("Invalid drone id: {0}")]
    InvalidDroneId(i64),
}
