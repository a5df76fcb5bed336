//! Candidate ranking for master elections.
//!
//! Candidates compare lexicographically on:
//! 1. Battery level, higher first
//! 2. Drone id, lower first
//! 3. Uptime since discovery, longer first

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use drone_protocol::{DroneId, ElectionCriteria};
use drone_state::{NetworkView, NodeRecord};

/// A candidate's position in the election order. `a > b` means `a` is the
/// better master.
#[derive(Debug, Clone, Copy)]
pub struct CandidateScore {
    pub battery_level: f64,
    pub drone_id: DroneId,
    pub uptime: Duration,
}

impl CandidateScore {
    pub fn of(record: &NodeRecord, now: Instant) -> Self {
        Self {
            battery_level: record.battery_level,
            drone_id: record.id(),
            uptime: record.uptime(now),
        }
    }
}

impl Ord for CandidateScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.battery_level
            .total_cmp(&other.battery_level)
            .then_with(|| other.drone_id.cmp(&self.drone_id))
            .then_with(|| self.uptime.cmp(&other.uptime))
    }
}

impl PartialOrd for CandidateScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CandidateScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CandidateScore {}

/// The criteria a voter attaches to its pick.
pub fn criteria_for(record: &NodeRecord, now: Instant) -> ElectionCriteria {
    ElectionCriteria {
        battery_level: record.battery_level,
        uptime: record.uptime(now).as_secs_f64(),
        reliability: record.reliability_score(),
        drone_id: record.id(),
    }
}

/// Best candidate among the online records, self included.
///
/// A fully tied challenger does not displace the candidate seen first.
pub fn select_candidate(view: &NetworkView, now: Instant) -> (DroneId, ElectionCriteria) {
    let mut best = view.self_record();
    let mut best_score = CandidateScore::of(best, now);
    for record in view.online(now) {
        let score = CandidateScore::of(record, now);
        if score > best_score {
            best = record;
            best_score = score;
        }
    }
    (best.id(), criteria_for(best, now))
}
