//! Drone Protocol - Core types and message definitions
//!
//! Defines the wire unit exchanged by drones over the broadcast medium,
//! the closed action vocabulary with its typed parameter schemas, and the
//! JSON codec used to turn messages into datagrams and back.

pub mod codec;
pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{decode, encode};
pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
