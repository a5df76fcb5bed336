//! JSON datagram codec.
//!
//! Decoding is strict: truncated or malformed bytes, unknown actions or
//! statuses, a zero sender id and parameters that do not match the action's
//! schema are all rejected with [`ProtocolError::Decode`]. Callers drop the
//! datagram and keep going.

use crate::messages::DroneMessage;
use crate::ProtocolError;

pub fn encode(message: &DroneMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<DroneMessage, ProtocolError> {
    let message: DroneMessage =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;

    if message.sender_id == 0 {
        return Err(ProtocolError::Decode("sender id 0 is reserved".into()));
    }

    message
        .validate_params()
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;

    Ok(message)
}
