use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

use drone_protocol::{
    current_timestamp_millis, random_drone_id, DroneId, DroneStatus, Position,
    ID_RESOLUTION_ATTEMPTS, MAX_DRONE_ID, ONLINE_TIMEOUT_SECS,
};

use crate::record::NodeRecord;
use crate::snapshot::{NetworkSnapshot, RecordSnapshot};
use crate::StateError;

/// One identity change: `old` was abandoned in favour of `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdChange {
    pub old: DroneId,
    pub new: DroneId,
}

/// Optional fields carried by a peer observation. Only supplied fields
/// overwrite what is already known.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeerUpdate {
    pub position: Option<Position>,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<f64>,
}

/// The local drone's picture of the network.
///
/// The self record is owned separately from the peer map. Peer-facing
/// operations refuse the self id, so nothing received from the network can
/// mutate the self record.
#[derive(Debug, Clone)]
pub struct NetworkView {
    self_record: NodeRecord,
    peers: HashMap<DroneId, NodeRecord>,
    master_id: Option<DroneId>,
    network_established: bool,
    conflict_log: Vec<IdChange>,
    origin: Uuid,
    online_timeout: Duration,
}

impl NetworkView {
    pub fn new(self_id: DroneId, now: Instant) -> Self {
        let self_record = NodeRecord::new_self(self_id, now);
        tracing::info!(
            drone_id = self_id,
            position = %self_record.position,
            "Created self drone"
        );
        Self {
            self_record,
            peers: HashMap::new(),
            master_id: None,
            network_established: false,
            conflict_log: Vec::new(),
            origin: Uuid::new_v4(),
            online_timeout: Duration::from_secs_f64(ONLINE_TIMEOUT_SECS),
        }
    }

    /// Start with a random identity.
    pub fn with_random_id(now: Instant) -> Self {
        Self::new(random_drone_id(&mut rand::thread_rng()), now)
    }

    pub fn with_online_timeout(mut self, timeout: Duration) -> Self {
        self.online_timeout = timeout;
        self
    }

    pub fn online_timeout(&self) -> Duration {
        self.online_timeout
    }

    pub fn self_id(&self) -> DroneId {
        self.self_record.id()
    }

    /// Instance token stamped on every message this process sends.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn self_record(&self) -> &NodeRecord {
        &self.self_record
    }

    pub fn self_record_mut(&mut self) -> &mut NodeRecord {
        &mut self.self_record
    }

    pub fn set_self_status(&mut self, status: DroneStatus, now: Instant) {
        self.self_record.status = status;
        self.self_record.mark_seen(now);
    }

    pub fn master_id(&self) -> Option<DroneId> {
        self.master_id
    }

    pub fn set_master(&mut self, master_id: Option<DroneId>) {
        self.master_id = master_id;
    }

    pub fn clear_master(&mut self) -> Option<DroneId> {
        self.master_id.take()
    }

    pub fn network_established(&self) -> bool {
        self.network_established
    }

    pub fn conflict_log(&self) -> &[IdChange] {
        &self.conflict_log
    }

    // ── Lookups ──

    /// Any known record, self included.
    pub fn get(&self, id: DroneId) -> Option<&NodeRecord> {
        if id == self.self_id() {
            Some(&self.self_record)
        } else {
            self.peers.get(&id)
        }
    }

    pub fn contains(&self, id: DroneId) -> bool {
        id == self.self_id() || self.peers.contains_key(&id)
    }

    pub fn peer(&self, id: DroneId) -> Option<&NodeRecord> {
        self.peers.get(&id)
    }

    pub fn peer_mut(&mut self, id: DroneId) -> Option<&mut NodeRecord> {
        self.peers.get_mut(&id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeRecord> {
        self.peers.values()
    }

    /// Every known record, self first.
    pub fn all(&self) -> Vec<&NodeRecord> {
        std::iter::once(&self.self_record)
            .chain(self.peers.values())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.peers.len() + 1
    }

    /// Online records under the view's default timeout. Self is always online.
    pub fn online(&self, now: Instant) -> Vec<&NodeRecord> {
        self.online_within(now, self.online_timeout)
    }

    pub fn online_within(&self, now: Instant, timeout: Duration) -> Vec<&NodeRecord> {
        std::iter::once(&self.self_record)
            .chain(self.peers.values().filter(|p| p.is_online(now, timeout)))
            .collect()
    }

    pub fn online_count(&self, now: Instant) -> usize {
        1 + self
            .peers
            .values()
            .filter(|p| p.is_online(now, self.online_timeout))
            .count()
    }

    /// Ids of online peers, excluding self, in ascending order.
    pub fn online_peer_ids(&self, now: Instant) -> Vec<DroneId> {
        let mut ids: Vec<DroneId> = self
            .peers
            .values()
            .filter(|p| p.is_online(now, self.online_timeout))
            .map(|p| p.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_online(&self, id: DroneId, now: Instant) -> bool {
        if id == self.self_id() {
            return true;
        }
        self.peers
            .get(&id)
            .is_some_and(|p| p.is_online(now, self.online_timeout))
    }

    // ── Merge ──

    /// Record an observation of a peer, creating it on first sight.
    ///
    /// Status always overwrites; position, battery and signal only when
    /// supplied. A sentinel position is rejected without failing the merge.
    pub fn add_or_update(
        &mut self,
        id: DroneId,
        status: DroneStatus,
        update: PeerUpdate,
        now: Instant,
    ) -> Result<&mut NodeRecord, StateError> {
        if id == 0 {
            return Err(StateError::InvalidDroneId);
        }
        if id == self.self_id() {
            tracing::error!(drone_id = id, "Peer update addressed to the self record");
            return Err(StateError::SelfUpdateRejected(id));
        }

        let record = self.peers.entry(id).or_insert_with(|| {
            tracing::debug!(drone_id = id, "Discovered new drone");
            NodeRecord::new(id, now)
        });

        record.status = status;
        if let Some(position) = update.position {
            // Rejection is logged by the record; the rest of the merge stands.
            let _ = record.set_position(position, now);
        }
        if let Some(level) = update.battery_level {
            record.set_battery(level, now);
        }
        if let Some(signal) = update.signal_strength {
            record.signal_strength = signal;
        }
        record.mark_seen(now);
        Ok(record)
    }

    /// Merge a gossiped list of drone ids. Unknown ids are added as
    /// `Connected`. Known records are left alone: a second-hand mention is
    /// not evidence that the drone is still alive. Own id is skipped.
    /// Returns the ids that were new.
    pub fn merge_known_ids(&mut self, ids: &[DroneId], now: Instant) -> Vec<DroneId> {
        let self_id = self.self_id();
        let mut added = Vec::new();
        for &id in ids {
            if id == self_id || id == 0 || self.peers.contains_key(&id) {
                continue;
            }
            let mut record = NodeRecord::new(id, now);
            record.status = DroneStatus::Connected;
            self.peers.insert(id, record);
            added.push(id);
        }
        added
    }

    pub fn remove_peer(&mut self, id: DroneId) -> Option<NodeRecord> {
        self.peers.remove(&id)
    }

    /// Move a peer record from `old` to `new` after that peer resolved an id
    /// conflict. Never touches the self record. Returns whether a record was
    /// moved.
    pub fn rekey_peer(&mut self, old: DroneId, new: DroneId) -> Result<bool, StateError> {
        if new == 0 {
            return Err(StateError::InvalidDroneId);
        }
        if new == self.self_id() {
            return Err(StateError::SelfUpdateRejected(new));
        }
        if old == self.self_id() {
            return Ok(false);
        }
        let Some(mut record) = self.peers.remove(&old) else {
            return Ok(false);
        };
        record.set_id(new);
        self.peers.insert(new, record);
        if self.master_id == Some(old) {
            self.master_id = Some(new);
        }
        Ok(true)
    }

    // ── Identity conflicts ──

    /// True when another instance claims our id.
    ///
    /// The reporter is identified by its instance token rather than its
    /// numeric id: during a conflict both drones share the numeric id.
    pub fn detect_id_conflict(&self, reported_id: DroneId, reporter: Uuid) -> bool {
        reported_id == self.self_id() && reporter != self.origin
    }

    /// Pick a fresh id for ourselves and re-key the self record.
    pub fn resolve_id_conflict(&mut self) -> DroneId {
        self.resolve_id_conflict_with(&mut rand::thread_rng(), current_timestamp_millis())
    }

    /// Draw up to [`ID_RESOLUTION_ATTEMPTS`] random ids not currently known;
    /// if all collide, derive one from `timestamp_millis`.
    pub fn resolve_id_conflict_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        timestamp_millis: u64,
    ) -> DroneId {
        let old_id = self.self_id();

        let drawn = (0..ID_RESOLUTION_ATTEMPTS)
            .map(|_| random_drone_id(rng))
            .find(|candidate| !self.contains(*candidate));

        let new_id = match drawn {
            Some(id) => id,
            None => {
                let fallback = self.timestamp_fallback_id(timestamp_millis);
                tracing::warn!(
                    old_id,
                    new_id = fallback,
                    "No free random id found; using timestamp-derived id"
                );
                fallback
            }
        };

        self.self_record.set_id(new_id);
        if self.master_id == Some(old_id) {
            self.master_id = Some(new_id);
        }
        self.conflict_log.push(IdChange { old: old_id, new: new_id });
        tracing::info!(old_id, new_id, "ID conflict resolved");
        new_id
    }

    /// First unknown id at or after the timestamp-derived one, wrapping past
    /// `MAX_DRONE_ID` back to 1.
    fn timestamp_fallback_id(&self, timestamp_millis: u64) -> DroneId {
        let start = (timestamp_millis % u64::from(MAX_DRONE_ID)) as DroneId + 1;
        let mut candidate = start;
        for _ in 0..MAX_DRONE_ID {
            if !self.contains(candidate) {
                return candidate;
            }
            candidate = if candidate == MAX_DRONE_ID { 1 } else { candidate + 1 };
        }
        // Every id is taken; nothing better exists.
        start
    }

    // ── Maintenance ──

    /// Remove every peer not seen for longer than `timeout`. Returns the
    /// evicted ids.
    pub fn cleanup_offline(&mut self, now: Instant, timeout: Duration) -> Vec<DroneId> {
        let stale: Vec<DroneId> = self
            .peers
            .values()
            .filter(|p| p.last_seen_age(now) > timeout)
            .map(|p| p.id())
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    /// Recompute `network_established` and drop a master that is unknown or
    /// offline. Returns the cleared master id, if any.
    pub fn update_network_status(&mut self, now: Instant) -> Option<DroneId> {
        self.network_established = self.online_count(now) > 1;

        let master = self.master_id?;
        if self.is_online(master, now) {
            return None;
        }
        tracing::debug!(master_id = master, "Master unknown or offline; clearing");
        self.master_id = None;
        Some(master)
    }

    /// Install `master` and set every online record, self included, to
    /// `Master` or `Slave` accordingly.
    pub fn assign_roles(&mut self, master: DroneId, now: Instant) {
        self.master_id = Some(master);
        let timeout = self.online_timeout;
        for record in self.peers.values_mut() {
            if record.is_online(now, timeout) {
                record.status = role_for(record.id(), master);
            }
        }
        let own = role_for(self.self_id(), master);
        self.set_self_status(own, now);
    }

    /// Human-readable one-liner. Cosmetic only.
    pub fn discovery_status(&self, now: Instant) -> String {
        let online = self.online_count(now);
        let total = self.count();
        if online == 1 {
            format!("Seeking other drones (found {} previously)", total - 1)
        } else if self.network_established {
            let master = match self.master_id {
                Some(id) => format!("Master: {id}"),
                None => "No master".to_string(),
            };
            format!("Network established: {online} drones online. {master}")
        } else {
            format!("Connecting to network ({online} drones found)")
        }
    }

    pub fn snapshot(&self, now: Instant) -> NetworkSnapshot {
        let mut records: Vec<RecordSnapshot> = self
            .all()
            .into_iter()
            .map(|r| RecordSnapshot::capture(r, now, self.online_timeout))
            .collect();
        records.sort_by_key(|r| r.drone_id);
        NetworkSnapshot {
            generated_at: chrono::Utc::now(),
            self_id: self.self_id(),
            master_id: self.master_id,
            total_count: self.count(),
            online_count: self.online_count(now),
            network_established: self.network_established,
            records,
        }
    }
}

fn role_for(id: DroneId, master: DroneId) -> DroneStatus {
    if id == master {
        DroneStatus::Master
    } else {
        DroneStatus::Slave
    }
}
