//! Drone Connector - ties the protocol layers into a running drone.
//!
//! - [`config`]: TOML configuration with CLI overrides.
//! - [`controller`]: the per-drone control loop. Message handling, timers,
//!   status transitions and elections all run on one owner; time is passed
//!   in explicitly so the loop can be driven by a runtime or by a test.

pub mod config;
pub mod controller;

pub use config::{DroneConfig, NetworkConfig, NodeConfig, TimingConfig};
pub use controller::{DroneController, Intervals, TickSummary};

use drone_consensus::ConsensusError;
use drone_network::NetworkError;
use drone_protocol::ProtocolError;
use drone_state::StateError;

/// Errors raised by the controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// The broadcast medium failed. The drone has fallen back to SEEKING and
    /// keeps retrying.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[source] NetworkError),
}
