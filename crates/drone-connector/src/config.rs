//! Drone configuration.
//!
//! Loaded from TOML. Every section and field has a default, so a partial
//! file (or none at all) is valid. Command-line flags override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use drone_network::TransportConfig;
use drone_protocol::{
    DroneId, Position, CLEANUP_INTERVAL_SECS, DEFAULT_BATTERY_LEVEL, DEFAULT_PORT,
    DEFAULT_TIME_SCALE, DISCOVERY_INTERVAL_SECS, ELECTION_TIMEOUT_SECS, HEARTBEAT_INTERVAL_SECS,
    MASTER_CHECK_INTERVAL_SECS, MASTER_TIMEOUT_SECS, MAX_BATTERY_LEVEL, MAX_DATAGRAM_BYTES,
    MAX_DISCOVERY_ATTEMPTS, MIN_BATTERY_LEVEL, NETWORK_SYNC_INTERVAL_SECS, ONLINE_TIMEOUT_SECS,
    PING_INTERVAL_SECS, STATUS_REPORT_INTERVAL_SECS,
};

/// Smallest receive buffer that still fits a full network status message
/// for a modest swarm.
const MIN_DATAGRAM_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    pub node: NodeConfig,
    pub network: NetworkConfig,
    pub timing: TimingConfig,
}

/// Identity and physical state of the local drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fixed drone id. A random one is drawn when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DroneId>,
    pub battery_level: f64,
    pub capabilities: Vec<String>,
    /// Starting position. A random ground position is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            battery_level: DEFAULT_BATTERY_LEVEL,
            capabilities: Vec::new(),
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: SocketAddr,
    pub broadcast_addr: SocketAddr,
    pub max_datagram_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            broadcast_addr: SocketAddr::from(([255, 255, 255, 255], DEFAULT_PORT)),
            max_datagram_bytes: MAX_DATAGRAM_BYTES,
        }
    }
}

impl NetworkConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            bind_addr: self.bind_addr,
            broadcast_addr: self.broadcast_addr,
            max_datagram_bytes: self.max_datagram_bytes,
        }
    }
}

/// Protocol timers, in seconds before scaling.
///
/// `time_scale` multiplies every interval and both timeouts. The online
/// timeout is used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub time_scale: f64,
    pub discovery_interval_secs: f64,
    pub heartbeat_interval_secs: f64,
    pub network_sync_interval_secs: f64,
    pub master_check_interval_secs: f64,
    pub master_timeout_secs: f64,
    pub election_timeout_secs: f64,
    pub cleanup_interval_secs: f64,
    pub ping_interval_secs: f64,
    pub status_report_interval_secs: f64,
    pub online_timeout_secs: f64,
    pub max_discovery_attempts: u32,
    /// Control loop period in milliseconds.
    pub tick_millis: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            time_scale: DEFAULT_TIME_SCALE,
            discovery_interval_secs: DISCOVERY_INTERVAL_SECS,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            network_sync_interval_secs: NETWORK_SYNC_INTERVAL_SECS,
            master_check_interval_secs: MASTER_CHECK_INTERVAL_SECS,
            master_timeout_secs: MASTER_TIMEOUT_SECS,
            election_timeout_secs: ELECTION_TIMEOUT_SECS,
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
            ping_interval_secs: PING_INTERVAL_SECS,
            status_report_interval_secs: STATUS_REPORT_INTERVAL_SECS,
            online_timeout_secs: ONLINE_TIMEOUT_SECS,
            max_discovery_attempts: MAX_DISCOVERY_ATTEMPTS,
            tick_millis: 100,
        }
    }
}

impl TimingConfig {
    /// `secs * time_scale` as a duration. Values that cannot form a duration
    /// collapse to zero; `validate` rejects them up front.
    pub fn scaled(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs * self.time_scale).unwrap_or(Duration::ZERO)
    }

    pub fn online_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.online_timeout_secs).unwrap_or(Duration::ZERO)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            anyhow::bail!("timing.time_scale must be a positive number, got {}", self.time_scale);
        }
        let named = [
            ("discovery_interval_secs", self.discovery_interval_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("network_sync_interval_secs", self.network_sync_interval_secs),
            ("master_check_interval_secs", self.master_check_interval_secs),
            ("master_timeout_secs", self.master_timeout_secs),
            ("election_timeout_secs", self.election_timeout_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("ping_interval_secs", self.ping_interval_secs),
            ("status_report_interval_secs", self.status_report_interval_secs),
            ("online_timeout_secs", self.online_timeout_secs),
        ];
        for (name, value) in named {
            if !(value.is_finite() && value > 0.0) {
                anyhow::bail!("timing.{name} must be a positive number of seconds, got {value}");
            }
        }
        if self.tick_millis == 0 {
            anyhow::bail!("timing.tick_millis must be at least 1");
        }
        Ok(())
    }
}

impl DroneConfig {
    /// `<config dir>/drone-swarm/config.toml`, when the platform has a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("drone-swarm").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load `explicit` if given. Otherwise use the default path when that
    /// file exists, and built-in defaults when it does not.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading default config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.id == Some(0) {
            anyhow::bail!("node.id must be between 1 and 65535");
        }
        let battery = self.node.battery_level;
        if !(MIN_BATTERY_LEVEL..=MAX_BATTERY_LEVEL).contains(&battery) {
            anyhow::bail!("node.battery_level must be within 0..=100, got {battery}");
        }
        if self.node.position.is_some_and(|p| p.is_origin()) {
            anyhow::bail!("node.position (0, 0, 0) is reserved; omit it for a random position");
        }
        if self.network.max_datagram_bytes < MIN_DATAGRAM_BYTES {
            anyhow::bail!(
                "network.max_datagram_bytes must be at least {MIN_DATAGRAM_BYTES}, got {}",
                self.network.max_datagram_bytes
            );
        }
        self.timing.validate()
    }
}
