//! Read-only diagnostic export of a [`crate::NetworkView`].
//!
//! Monotonic instants are not meaningful outside the process, so record
//! timestamps are exported as ages in seconds relative to capture time.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use drone_protocol::{DroneId, DroneStatus, Position};

use crate::record::NodeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub self_id: DroneId,
    pub master_id: Option<DroneId>,
    pub total_count: usize,
    pub online_count: usize,
    pub network_established: bool,
    pub records: Vec<RecordSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub drone_id: DroneId,
    pub status: DroneStatus,
    pub position: Position,
    pub battery_level: f64,
    pub last_seen_secs_ago: f64,
    pub uptime_secs: f64,
    pub online: bool,
    pub ping_count: u64,
    pub response_count: u64,
    pub reliability: f64,
    pub signal_strength: f64,
    pub capabilities: Vec<String>,
    pub is_self: bool,
}

impl RecordSnapshot {
    pub(crate) fn capture(record: &NodeRecord, now: Instant, online_timeout: Duration) -> Self {
        Self {
            drone_id: record.id(),
            status: record.status,
            position: record.position,
            battery_level: record.battery_level,
            last_seen_secs_ago: record.last_seen_age(now).as_secs_f64(),
            uptime_secs: record.uptime(now).as_secs_f64(),
            online: record.is_self() || record.is_online(now, online_timeout),
            ping_count: record.ping_count,
            response_count: record.response_count,
            reliability: record.reliability_score(),
            signal_strength: record.signal_strength,
            capabilities: record.capabilities.clone(),
            is_self: record.is_self(),
        }
    }
}

impl NetworkSnapshot {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
