//! Drone Network - the broadcast transport boundary.
//!
//! The protocol only needs two operations from the medium: send a datagram
//! to everyone, and poll for at most one received datagram without
//! blocking. Delivery is best-effort, unordered and unauthenticated.
//!
//! - [`udp`]: UDP broadcast with a background receive task feeding an inbox.
//! - [`memory`]: an in-process broadcast hub for simulations and tests.

pub mod memory;
pub mod transport;
pub mod udp;

pub use memory::{BroadcastHub, MemoryTransport};
pub use transport::{Datagram, Transport};
pub use udp::{TransportConfig, UdpBroadcastTransport};

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,
}
