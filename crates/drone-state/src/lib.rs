//! Drone State - what a drone knows about itself and its peers.
//!
//! - [`NodeRecord`]: observable state of one drone (identity, status,
//!   position, battery, liveness timestamps, reliability counters).
//! - [`NetworkView`]: the local drone's own record plus every known peer,
//!   with merge, identity-conflict and staleness-cleanup logic.
//! - [`NetworkSnapshot`]: read-only diagnostic document for external tools.

pub mod record;
pub mod snapshot;
pub mod view;

pub use record::NodeRecord;
pub use snapshot::{NetworkSnapshot, RecordSnapshot};
pub use view::{IdChange, NetworkView, PeerUpdate};

use drone_protocol::DroneId;

/// Errors raised by the network view.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("Peer update targeted own id {0}; the self record is not reachable through peer updates")]
    SelfUpdateRejected(DroneId),

    #[error("Position (0, 0, 0) is reserved for uninitialized drones")]
    InvalidPosition,

    #[error("Drone id 0 is not a valid identity")]
    InvalidDroneId,
}
