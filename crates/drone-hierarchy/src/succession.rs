//! Master failure detector.
//!
//! The current master is judged offline when any of these holds:
//! - its id is not in the network view
//! - its record has not been seen within the master timeout
//! - no heartbeat attributed to it arrived within the master timeout
//!
//! A drone that believes itself master never declares itself offline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use drone_protocol::{DroneId, DroneStatus, MASTER_TIMEOUT_SECS};
use drone_state::NetworkView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineReason {
    /// The master id is not a known record.
    Missing,
    /// The master record was not seen within the timeout. The record is
    /// evicted.
    Stale,
    /// The record is fresh but the master sent no heartbeat in time.
    HeartbeatTimeout,
}

impl std::fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Stale => write!(f, "stale"),
            Self::HeartbeatTimeout => write!(f, "heartbeat timeout"),
        }
    }
}

/// Result of one failure-detector cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCheck {
    NoMaster,
    /// We are the master ourselves.
    Exempt,
    Healthy(DroneId),
    Failed {
        master_id: DroneId,
        reason: OfflineReason,
        /// Whether another online drone remains to elect a successor with.
        start_election: bool,
    },
}

/// Tracks heartbeats from the master and decides when it has failed.
#[derive(Debug, Clone)]
pub struct SuccessionMonitor {
    master_timeout: Duration,
    /// The drone the last master heartbeat came from, and when.
    last_master_heartbeat: Option<(DroneId, Instant)>,
}

impl Default for SuccessionMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(MASTER_TIMEOUT_SECS))
    }
}

impl SuccessionMonitor {
    pub fn new(master_timeout: Duration) -> Self {
        Self {
            master_timeout,
            last_master_heartbeat: None,
        }
    }

    pub fn master_timeout(&self) -> Duration {
        self.master_timeout
    }

    /// Note a heartbeat from `master_id`. Also called when a master is
    /// adopted or elected, which starts its heartbeat window.
    pub fn record_master_heartbeat(&mut self, master_id: DroneId, now: Instant) {
        self.last_master_heartbeat = Some((master_id, now));
    }

    pub fn last_master_heartbeat(&self) -> Option<(DroneId, Instant)> {
        self.last_master_heartbeat
    }

    pub fn reset(&mut self) {
        self.last_master_heartbeat = None;
    }

    fn heartbeat_fresh(&self, master_id: DroneId, now: Instant) -> bool {
        self.last_master_heartbeat.is_some_and(|(id, at)| {
            id == master_id && now.saturating_duration_since(at) <= self.master_timeout
        })
    }

    /// Classify the current master without changing anything.
    pub fn evaluate(&self, view: &NetworkView, now: Instant) -> Result<Option<DroneId>, (DroneId, OfflineReason)> {
        let Some(master_id) = view.master_id() else {
            return Ok(None);
        };
        let Some(record) = view.get(master_id) else {
            return Err((master_id, OfflineReason::Missing));
        };
        if record.is_self() {
            return Ok(Some(master_id));
        }
        if !record.is_online(now, self.master_timeout) {
            return Err((master_id, OfflineReason::Stale));
        }
        if !self.heartbeat_fresh(master_id, now) {
            return Err((master_id, OfflineReason::HeartbeatTimeout));
        }
        Ok(Some(master_id))
    }

    /// Run one failure-detector cycle against `view`.
    ///
    /// On failure the master is cleared, a stale master record is evicted,
    /// and `start_election` reports whether anyone is left to elect with.
    pub fn check(&mut self, view: &mut NetworkView, now: Instant) -> MasterCheck {
        if view.self_record().status == DroneStatus::Master {
            return MasterCheck::Exempt;
        }

        match self.evaluate(view, now) {
            Ok(None) => MasterCheck::NoMaster,
            Ok(Some(master_id)) if master_id == view.self_id() => MasterCheck::Exempt,
            Ok(Some(master_id)) => MasterCheck::Healthy(master_id),
            Err((master_id, reason)) => {
                view.clear_master();
                self.reset();
                if reason == OfflineReason::Stale {
                    view.remove_peer(master_id);
                }
                let start_election = view.online_count(now) > 1;
                tracing::warn!(
                    master_id,
                    reason = %reason,
                    start_election,
                    "Master judged offline"
                );
                MasterCheck::Failed {
                    master_id,
                    reason,
                    start_election,
                }
            }
        }
    }
}
