use std::time::{Duration, Instant};

use drone_protocol::{
    DroneId, DroneStatus, Position, DEFAULT_BATTERY_LEVEL, MAX_BATTERY_LEVEL, MIN_BATTERY_LEVEL,
};

use crate::StateError;

/// Observable state of a single drone, including the local one.
///
/// `id` and `is_self` are private: a record can only be re-keyed or promoted
/// to self through [`crate::NetworkView`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    id: DroneId,
    is_self: bool,
    pub status: DroneStatus,
    pub position: Position,
    pub battery_level: f64,
    pub last_seen: Instant,
    pub discovery_time: Instant,
    pub ping_count: u64,
    pub response_count: u64,
    pub signal_strength: f64,
    pub capabilities: Vec<String>,
}

impl NodeRecord {
    /// A freshly observed peer with a random ground position.
    pub fn new(id: DroneId, now: Instant) -> Self {
        Self {
            id,
            is_self: false,
            status: DroneStatus::Seeking,
            position: Position::random_initial(&mut rand::thread_rng()),
            battery_level: DEFAULT_BATTERY_LEVEL,
            last_seen: now,
            discovery_time: now,
            ping_count: 0,
            response_count: 0,
            signal_strength: 0.0,
            capabilities: Vec::new(),
        }
    }

    pub(crate) fn new_self(id: DroneId, now: Instant) -> Self {
        Self {
            is_self: true,
            ..Self::new(id, now)
        }
    }

    pub fn id(&self) -> DroneId {
        self.id
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub(crate) fn set_id(&mut self, id: DroneId) {
        self.id = id;
    }

    pub fn mark_seen(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Move the drone. The `(0, 0, 0)` sentinel is rejected and the prior
    /// position kept.
    pub fn set_position(&mut self, position: Position, now: Instant) -> Result<(), StateError> {
        if position.is_origin() {
            tracing::warn!(
                drone_id = self.id,
                kept = %self.position,
                "Rejected position update carrying the (0, 0, 0) sentinel"
            );
            return Err(StateError::InvalidPosition);
        }
        self.position = position;
        self.mark_seen(now);
        Ok(())
    }

    /// Set the battery level, clamped to `[0, 100]`.
    pub fn set_battery(&mut self, level: f64, now: Instant) {
        self.battery_level = if level.is_nan() {
            MIN_BATTERY_LEVEL
        } else {
            level.clamp(MIN_BATTERY_LEVEL, MAX_BATTERY_LEVEL)
        };
        self.mark_seen(now);
    }

    pub fn is_online(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < timeout
    }

    pub fn last_seen_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// Time since this drone was first discovered.
    pub fn uptime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.discovery_time)
    }

    pub fn record_ping(&mut self) {
        self.ping_count += 1;
    }

    pub fn record_response(&mut self) {
        self.response_count += 1;
    }

    /// `response_count / ping_count`, or an optimistic 1.0 for drones that
    /// were never pinged.
    pub fn reliability_score(&self) -> f64 {
        if self.ping_count == 0 {
            return 1.0;
        }
        self.response_count as f64 / self.ping_count as f64
    }
}

impl std::fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Drone({}, {}, {})", self.id, self.status, self.position)
    }
}
