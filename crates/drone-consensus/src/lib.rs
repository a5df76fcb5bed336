//! Drone Consensus - master election.
//!
//! - [`scoring`]: the candidate order (battery, then lowest id, then uptime)
//!   and the criteria a voter cites for its pick.
//! - [`election`]: vote collection and strictly timeout-driven finalization.
//!
//! Each drone tallies only the votes it observed itself, so drones may
//! disagree after packet loss. Heartbeats and status gossip converge them.

pub mod election;
pub mod scoring;

pub use election::{ElectionConfig, ElectionEngine, ElectionOutcome};
pub use scoring::{select_candidate, CandidateScore};

use drone_protocol::DroneId;

/// Errors raised by the election engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("No election in progress")]
    NoElection,

    #[error("Drone {0} already voted in this election")]
    AlreadyVoted(DroneId),
}
