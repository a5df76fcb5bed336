//! Protocol-wide defaults. Interval values are in seconds and are scaled by
//! the configured time scale at runtime unless noted otherwise.

/// Destination id meaning "addressed to everyone".
pub const BROADCAST_DESTINATION: i32 = -1;

/// Default UDP port for the broadcast medium.
pub const DEFAULT_PORT: u16 = 37020;

/// Largest datagram the receiver will accept.
pub const MAX_DATAGRAM_BYTES: usize = 8192;

pub const DEFAULT_TIME_SCALE: f64 = 0.5;

pub const DISCOVERY_INTERVAL_SECS: f64 = 5.0;
pub const HEARTBEAT_INTERVAL_SECS: f64 = 10.0;
pub const NETWORK_SYNC_INTERVAL_SECS: f64 = 15.0;
pub const MASTER_CHECK_INTERVAL_SECS: f64 = 8.0;
pub const MASTER_TIMEOUT_SECS: f64 = 25.0;
pub const ELECTION_TIMEOUT_SECS: f64 = 10.0;
pub const CLEANUP_INTERVAL_SECS: f64 = 15.0;
pub const PING_INTERVAL_SECS: f64 = 20.0;
pub const STATUS_REPORT_INTERVAL_SECS: f64 = 10.0;

/// Liveness window for `is_online`. Not scaled.
pub const ONLINE_TIMEOUT_SECS: f64 = 30.0;

pub const MAX_DISCOVERY_ATTEMPTS: u32 = 10;

/// Random draws attempted before falling back to a timestamp-derived id.
pub const ID_RESOLUTION_ATTEMPTS: usize = 100;

pub const DEFAULT_BATTERY_LEVEL: f64 = 100.0;
pub const MIN_BATTERY_LEVEL: f64 = 0.0;
pub const MAX_BATTERY_LEVEL: f64 = 100.0;

/// Half-width of the square in which unknown drones get a random position.
pub const INITIAL_POSITION_SPREAD: f64 = 5.0;
