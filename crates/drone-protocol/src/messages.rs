use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::BROADCAST_DESTINATION;
use crate::types::{DroneId, DroneStatus, Position};
use crate::ProtocolError;

/// String-keyed parameter map carried by every message.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// The closed set of actions a drone can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Ping,
    DiscoveryAnnounce,
    DiscoveryResponse,
    Heartbeat,
    NetworkStatus,
    IdConflictResolution,
    ElectMaster,
    Ack,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::DiscoveryAnnounce => "DISCOVERY_ANNOUNCE",
            Self::DiscoveryResponse => "DISCOVERY_RESPONSE",
            Self::Heartbeat => "HEARTBEAT",
            Self::NetworkStatus => "NETWORK_STATUS",
            Self::IdConflictResolution => "ID_CONFLICT_RESOLUTION",
            Self::ElectMaster => "ELECT_MASTER",
            Self::Ack => "ACK",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PING" => Some(Self::Ping),
            "DISCOVERY_ANNOUNCE" => Some(Self::DiscoveryAnnounce),
            "DISCOVERY_RESPONSE" => Some(Self::DiscoveryResponse),
            "HEARTBEAT" => Some(Self::Heartbeat),
            "NETWORK_STATUS" => Some(Self::NetworkStatus),
            "ID_CONFLICT_RESOLUTION" => Some(Self::IdConflictResolution),
            "ELECT_MASTER" => Some(Self::ElectMaster),
            "ACK" => Some(Self::Ack),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single datagram on the broadcast medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneMessage {
    /// Sender wall-clock time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(rename = "drone_id")]
    pub sender_id: DroneId,
    /// `-1` addresses every drone; any other value addresses one drone.
    pub destination_id: i32,
    #[serde(rename = "current_state")]
    pub sender_status: DroneStatus,
    pub action: Action,
    #[serde(default)]
    pub params: Params,
    /// Per-process instance token. Tells our own echoes apart from another
    /// drone that happens to use the same id.
    #[serde(default)]
    pub origin: Uuid,
}

impl DroneMessage {
    pub fn is_broadcast(&self) -> bool {
        self.destination_id == BROADCAST_DESTINATION
    }

    /// Whether a drone with `id` should process this message.
    pub fn is_addressed_to(&self, id: DroneId) -> bool {
        self.is_broadcast() || self.destination_id == i32::from(id)
    }

    /// Deserialize the whole parameter map into the action's schema.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(serde_json::Value::Object(self.params.clone())).map_err(|e| {
            ProtocolError::InvalidParams {
                action: self.action,
                reason: e.to_string(),
            }
        })
    }

    /// Read a single optional parameter. Absent and `null` both yield `None`;
    /// a present value of the wrong shape is an error.
    pub fn optional_param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ProtocolError> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ProtocolError::InvalidParams {
                    action: self.action,
                    reason: format!("{key}: {e}"),
                }),
        }
    }

    /// Check that the parameters match the schema required by the action.
    pub fn validate_params(&self) -> Result<(), ProtocolError> {
        match self.action {
            Action::Ping | Action::Ack => Ok(()),
            Action::DiscoveryAnnounce | Action::DiscoveryResponse => {
                self.params_as::<PresenceParams>().map(|_| ())
            }
            Action::Heartbeat => self.params_as::<HeartbeatParams>().map(|_| ()),
            Action::NetworkStatus => self.params_as::<NetworkStatusParams>().map(|_| ()),
            Action::IdConflictResolution => self.params_as::<IdConflictParams>().map(|_| ()),
            Action::ElectMaster => self.params_as::<ElectMasterParams>().map(|_| ()),
        }
    }
}

// ── Specific Message Payloads ──

/// Presence data sent by DISCOVERY_ANNOUNCE and DISCOVERY_RESPONSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceParams {
    pub position: Position,
    pub battery_level: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Periodic liveness broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatParams {
    pub position: Position,
    pub battery_level: f64,
}

/// Gossiped view of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatusParams {
    #[serde(default)]
    pub known_drones: Vec<DroneId>,
    #[serde(default)]
    pub master_id: Option<DroneId>,
}

/// Announcement that a drone moved from `old_id` to `new_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdConflictParams {
    pub old_id: DroneId,
    pub new_id: DroneId,
}

/// The facts a voter cites for its preferred candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ElectionCriteria {
    pub battery_level: f64,
    /// Seconds since the candidate was first discovered.
    pub uptime: f64,
    pub reliability: f64,
    pub drone_id: DroneId,
}

/// A vote in a master election.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectMasterParams {
    pub candidate_id: DroneId,
    #[serde(default)]
    pub criteria: ElectionCriteria,
}

/// Convert a typed payload into a parameter map.
pub fn to_params<T: Serialize>(payload: &T) -> Result<Params, ProtocolError> {
    match serde_json::to_value(payload) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProtocolError::Encode(format!(
            "params must serialize to an object, got {other}"
        ))),
        Err(e) => Err(ProtocolError::Encode(e.to_string())),
    }
}

/// Identity stamped onto every outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    pub id: DroneId,
    pub status: DroneStatus,
    pub origin: Uuid,
}

impl Sender {
    pub fn new(id: DroneId, status: DroneStatus, origin: Uuid) -> Self {
        Self { id, status, origin }
    }

    /// Build a message with the current wall-clock timestamp.
    pub fn message(&self, action: Action, destination_id: i32, params: Params) -> DroneMessage {
        DroneMessage {
            timestamp: current_timestamp_millis(),
            sender_id: self.id,
            destination_id,
            sender_status: self.status,
            action,
            params,
            origin: self.origin,
        }
    }

    pub fn ping(&self, destination: DroneId) -> DroneMessage {
        self.message(Action::Ping, i32::from(destination), Params::new())
    }

    pub fn ack(&self, destination: DroneId, ack_info: Params) -> DroneMessage {
        self.message(Action::Ack, i32::from(destination), ack_info)
    }

    pub fn discovery_announce(&self, presence: &PresenceParams) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::DiscoveryAnnounce, BROADCAST_DESTINATION, to_params(presence)?))
    }

    pub fn discovery_response(
        &self,
        destination: DroneId,
        presence: &PresenceParams,
    ) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::DiscoveryResponse, i32::from(destination), to_params(presence)?))
    }

    pub fn heartbeat(&self, heartbeat: &HeartbeatParams) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::Heartbeat, BROADCAST_DESTINATION, to_params(heartbeat)?))
    }

    pub fn network_status(&self, status: &NetworkStatusParams) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::NetworkStatus, BROADCAST_DESTINATION, to_params(status)?))
    }

    pub fn id_conflict_resolution(&self, change: &IdConflictParams) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::IdConflictResolution, BROADCAST_DESTINATION, to_params(change)?))
    }

    pub fn elect_master(&self, vote: &ElectMasterParams) -> Result<DroneMessage, ProtocolError> {
        Ok(self.message(Action::ElectMaster, BROADCAST_DESTINATION, to_params(vote)?))
    }
}

/// Milliseconds since the Unix epoch, clamped to zero for pre-epoch clocks.
pub fn current_timestamp_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
