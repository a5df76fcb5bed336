//! Connectivity-driven status transitions of the local drone.
//!
//! | from                     | to        | when                  |
//! |--------------------------|-----------|-----------------------|
//! | SEEKING                  | CONNECTED | another drone online  |
//! | CONNECTED, MASTER, SLAVE | SEEKING   | only self online      |
//!
//! CONNECTED to MASTER or SLAVE happens only through election finalization.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use drone_protocol::DroneStatus;
use drone_state::NetworkView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: DroneStatus,
    pub to: DroneStatus,
}

impl StatusChange {
    /// The drone lost every peer and went back to discovery.
    pub fn lost_network(&self) -> bool {
        self.to == DroneStatus::Seeking
    }
}

/// The status the local drone should move to, if any.
pub fn next_status(current: DroneStatus, online_count: usize) -> Option<DroneStatus> {
    match current {
        DroneStatus::Seeking if online_count > 1 => Some(DroneStatus::Connected),
        status if status.is_networked() && online_count <= 1 => Some(DroneStatus::Seeking),
        _ => None,
    }
}

/// Apply the connectivity transition to the self record. Falling back to
/// SEEKING also clears the master.
pub fn reconcile_status(view: &mut NetworkView, now: Instant) -> Option<StatusChange> {
    let from = view.self_record().status;
    let to = next_status(from, view.online_count(now))?;

    view.set_self_status(to, now);
    if to == DroneStatus::Seeking {
        view.clear_master();
    }
    tracing::info!(from = %from, to = %to, "Status changed");
    Some(StatusChange { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(next_status(DroneStatus::Seeking, 1), None);
        assert_eq!(next_status(DroneStatus::Seeking, 2), Some(DroneStatus::Connected));
        assert_eq!(next_status(DroneStatus::Connected, 3), None);
        assert_eq!(next_status(DroneStatus::Master, 1), Some(DroneStatus::Seeking));
        assert_eq!(next_status(DroneStatus::Slave, 1), Some(DroneStatus::Seeking));
        assert_eq!(next_status(DroneStatus::Slave, 4), None);
    }
}
