//! Drone Hierarchy - who leads, and whether we are part of a network.
//!
//! - [`succession`]: the master failure detector, run on its own interval.
//! - [`roles`]: the SEEKING / CONNECTED transitions of the local drone.
//!   MASTER and SLAVE are only ever entered through election finalization.

pub mod roles;
pub mod succession;

pub use roles::{reconcile_status, StatusChange};
pub use succession::{MasterCheck, OfflineReason, SuccessionMonitor};
