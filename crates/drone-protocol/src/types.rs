use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::INITIAL_POSITION_SPREAD;

/// Numeric drone identity. Valid ids are `1..=65535`; zero is never issued.
pub type DroneId = u16;

pub const MIN_DRONE_ID: DroneId = 1;
pub const MAX_DRONE_ID: DroneId = u16::MAX;

/// Draw a uniformly random drone id from the valid range.
pub fn random_drone_id<R: Rng + ?Sized>(rng: &mut R) -> DroneId {
    rng.gen_range(MIN_DRONE_ID..=MAX_DRONE_ID)
}

/// Connection status of a drone as seen on the wire.
///
/// A node's own status is always one of `Seeking`, `Connected`, `Master`
/// or `Slave`; `Offline` and `Lost` only ever describe peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DroneStatus {
    Offline,
    #[default]
    Seeking,
    Connected,
    Master,
    Slave,
    Lost,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Seeking => "seeking",
            Self::Connected => "connected",
            Self::Master => "master",
            Self::Slave => "slave",
            Self::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(Self::Offline),
            "seeking" => Some(Self::Seeking),
            "connected" => Some(Self::Connected),
            "master" => Some(Self::Master),
            "slave" => Some(Self::Slave),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }

    /// Statuses in which a node has joined a network and sends heartbeats.
    pub fn is_networked(&self) -> bool {
        matches!(self, Self::Connected | Self::Master | Self::Slave)
    }
}

impl std::fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 3D position. Serialized as a `[x, y, z]` array.
///
/// `(0, 0, 0)` is reserved as the "uninitialized" sentinel and is never a
/// valid update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Random ground-level position near the origin, used for drones that
    /// have not reported one yet.
    pub fn random_initial<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let candidate = Self::new(
                rng.gen_range(-INITIAL_POSITION_SPREAD..INITIAL_POSITION_SPREAD),
                rng.gen_range(-INITIAL_POSITION_SPREAD..INITIAL_POSITION_SPREAD),
                0.0,
            );
            if !candidate.is_origin() {
                return candidate;
            }
        }
    }
}

impl From<[f64; 3]> for Position {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}
