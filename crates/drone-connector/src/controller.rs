//! The per-drone control loop.
//!
//! One call to [`DroneController::tick`] drains every pending datagram,
//! applies the connectivity transitions, then fires whichever timers are
//! due. Nothing blocks: waiting is always a timer compared against the
//! `now` passed in. Handler failures are logged and never stop the loop.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use drone_consensus::{ElectionConfig, ElectionEngine};
use drone_hierarchy::{reconcile_status, MasterCheck, SuccessionMonitor};
use drone_network::{NetworkError, Transport};
use drone_protocol::{
    decode, encode, to_params, Action, DroneId, DroneMessage, DroneStatus, ElectMasterParams,
    HeartbeatParams, IdConflictParams, NetworkStatusParams, PresenceParams, Sender,
};
use drone_state::{NetworkView, PeerUpdate, StateError};

use crate::config::{DroneConfig, TimingConfig};
use crate::ControllerError;

/// Scaled timer settings used by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervals {
    pub discovery: Duration,
    pub heartbeat: Duration,
    pub network_sync: Duration,
    pub master_check: Duration,
    pub cleanup: Duration,
    pub ping: Duration,
    pub status_report: Duration,
    pub master_timeout: Duration,
    pub election_timeout: Duration,
    pub online_timeout: Duration,
    pub max_discovery_attempts: u32,
}

impl Intervals {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            discovery: timing.scaled(timing.discovery_interval_secs),
            heartbeat: timing.scaled(timing.heartbeat_interval_secs),
            network_sync: timing.scaled(timing.network_sync_interval_secs),
            master_check: timing.scaled(timing.master_check_interval_secs),
            cleanup: timing.scaled(timing.cleanup_interval_secs),
            ping: timing.scaled(timing.ping_interval_secs),
            status_report: timing.scaled(timing.status_report_interval_secs),
            master_timeout: timing.scaled(timing.master_timeout_secs),
            election_timeout: timing.scaled(timing.election_timeout_secs),
            online_timeout: timing.online_timeout(),
            max_discovery_attempts: timing.max_discovery_attempts,
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

/// When each periodic action last ran. `None` means "due immediately".
#[derive(Debug, Clone, Default)]
struct Timers {
    discovery: Option<Instant>,
    heartbeat: Option<Instant>,
    network_sync: Option<Instant>,
    master_check: Option<Instant>,
    cleanup: Option<Instant>,
    ping: Option<Instant>,
    status_report: Option<Instant>,
}

fn due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    last.map_or(true, |at| now.saturating_duration_since(at) > interval)
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub received: usize,
    pub dropped: usize,
    pub sent: usize,
    pub status: DroneStatus,
}

pub struct DroneController<T: Transport> {
    view: NetworkView,
    transport: T,
    election: ElectionEngine,
    succession: SuccessionMonitor,
    intervals: Intervals,
    timers: Timers,
    discovery_attempts: u32,
    transport_healthy: bool,
    send_failure: Option<NetworkError>,
    summary: TickSummary,
}

impl<T: Transport> DroneController<T> {
    pub fn new(view: NetworkView, transport: T, intervals: Intervals) -> Self {
        let view = view.with_online_timeout(intervals.online_timeout);
        let election = ElectionEngine::new(ElectionConfig {
            election_timeout: intervals.election_timeout,
        });
        let succession = SuccessionMonitor::new(intervals.master_timeout);
        tracing::info!(
            drone_id = view.self_id(),
            origin = %view.origin(),
            "Drone controller initialized"
        );
        Self {
            view,
            transport,
            election,
            succession,
            intervals,
            timers: Timers::default(),
            discovery_attempts: 0,
            transport_healthy: true,
            send_failure: None,
            summary: TickSummary::default(),
        }
    }

    /// Build the local view from `[node]` and the timers from `[timing]`.
    pub fn from_config(config: &DroneConfig, transport: T, now: Instant) -> Self {
        let mut view = match config.node.id {
            Some(id) => NetworkView::new(id, now),
            None => NetworkView::with_random_id(now),
        };
        let me = view.self_record_mut();
        me.set_battery(config.node.battery_level, now);
        me.capabilities = config.node.capabilities.clone();
        if let Some(position) = config.node.position {
            if let Err(e) = me.set_position(position, now) {
                tracing::warn!(error = %e, "Ignoring configured position");
            }
        }
        Self::new(view, transport, Intervals::from_timing(&config.timing))
    }

    pub fn view(&self) -> &NetworkView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut NetworkView {
        &mut self.view
    }

    pub fn election(&self) -> &ElectionEngine {
        &self.election
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn intervals(&self) -> &Intervals {
        &self.intervals
    }

    pub fn self_id(&self) -> DroneId {
        self.view.self_id()
    }

    pub fn status(&self) -> DroneStatus {
        self.view.self_record().status
    }

    pub fn discovery_attempts(&self) -> u32 {
        self.discovery_attempts
    }

    pub fn is_transport_healthy(&self) -> bool {
        self.transport_healthy
    }

    /// Run one iteration of the control loop.
    ///
    /// A transport failure does not cut the tick short; the rest of the
    /// tick runs, the drone falls back to SEEKING, and the failure is
    /// returned.
    pub fn tick(&mut self, now: Instant) -> Result<TickSummary, ControllerError> {
        self.summary = TickSummary::default();

        let receive_failure = self.drain_inbox(now);

        if let Some(master_id) = self.view.update_network_status(now) {
            tracing::debug!(master_id, "Cleared unreachable master");
        }
        self.apply_status_transition(now);
        self.run_timers(now);

        let send_failure = self.send_failure.take();
        let failure = receive_failure.or(send_failure);
        if let Some(e) = failure {
            self.transport_healthy = false;
            self.fall_back_to_seeking(now);
            tracing::warn!(error = %e, "Transport unavailable; back to seeking");
            return Err(ControllerError::TransportUnavailable(e));
        }

        self.summary.status = self.status();
        Ok(self.summary.clone())
    }

    /// Drive `tick` from a tokio interval until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub async fn run(
        &mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(drone_id = self.self_id(), "Drone control loop running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Instant::now()) {
                        Ok(_) => {}
                        Err(ControllerError::TransportUnavailable(_)) => {
                            // Already logged; discovery resumes once sends succeed.
                        }
                        Err(e) => tracing::error!(error = %e, "Control loop iteration failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(drone_id = self.self_id(), "Drone control loop stopped");
        Ok(())
    }

    // ── Inbound ──

    fn drain_inbox(&mut self, now: Instant) -> Option<NetworkError> {
        loop {
            match self.transport.try_receive() {
                Ok(Some(datagram)) => {
                    self.summary.received += 1;
                    self.handle_datagram(&datagram.payload, now);
                }
                Ok(None) => return None,
                Err(e) => return Some(e),
            }
        }
    }

    /// Process one raw datagram. Never fails: bad input is logged and dropped.
    pub fn handle_datagram(&mut self, payload: &[u8], now: Instant) {
        let message = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "Dropping malformed datagram");
                self.summary.dropped += 1;
                return;
            }
        };
        self.handle_message(&message, now);
    }

    /// Process one decoded message.
    pub fn handle_message(&mut self, message: &DroneMessage, now: Instant) {
        let self_id = self.view.self_id();
        if !message.is_addressed_to(self_id) {
            tracing::trace!(
                destination_id = message.destination_id,
                "Ignoring message addressed to another drone"
            );
            return;
        }
        if message.origin == self.view.origin() {
            return;
        }
        if self.view.detect_id_conflict(message.sender_id, message.origin) {
            tracing::warn!(
                drone_id = self_id,
                action = %message.action,
                "Another drone is using our id"
            );
            self.resolve_id_conflict();
            return;
        }

        if let Err(e) = self.dispatch(message, now) {
            tracing::warn!(
                sender_id = message.sender_id,
                action = %message.action,
                error = %e,
                "Failed to handle message"
            );
        }

        if let Some(master_id) = self.view.update_network_status(now) {
            tracing::debug!(master_id, "Cleared unreachable master");
        }
    }

    fn dispatch(&mut self, message: &DroneMessage, now: Instant) -> Result<(), ControllerError> {
        let sender = message.sender_id;
        let update = PeerUpdate {
            position: message.optional_param("position")?,
            battery_level: message.optional_param("battery_level")?,
            signal_strength: message.optional_param("signal_strength")?,
        };
        self.view.add_or_update(sender, message.sender_status, update, now)?;

        tracing::debug!(sender_id = sender, action = %message.action, "Handling message");

        match message.action {
            Action::Ping => self.handle_ping(sender),
            Action::Ack => {
                if let Some(peer) = self.view.peer_mut(sender) {
                    peer.record_response();
                }
                Ok(())
            }
            Action::DiscoveryAnnounce => {
                self.record_capabilities(message)?;
                let presence = self.presence();
                let reply = self.sender().discovery_response(sender, &presence)?;
                self.broadcast(&reply);
                Ok(())
            }
            Action::DiscoveryResponse => self.record_capabilities(message),
            Action::Heartbeat => {
                self.handle_heartbeat(sender, message.sender_status, now);
                Ok(())
            }
            Action::NetworkStatus => {
                let status: NetworkStatusParams = message.params_as()?;
                self.handle_network_status(status, now);
                Ok(())
            }
            Action::IdConflictResolution => {
                let change: IdConflictParams = message.params_as()?;
                self.handle_id_change(change, now);
                Ok(())
            }
            Action::ElectMaster => {
                let vote: ElectMasterParams = message.params_as()?;
                self.handle_vote(sender, vote, now)
            }
        }
    }

    fn handle_ping(&mut self, sender: DroneId) -> Result<(), ControllerError> {
        let me = self.view.self_record();
        let mut info = to_params(&HeartbeatParams {
            position: me.position,
            battery_level: me.battery_level,
        })?;
        info.insert("ping_response".into(), serde_json::Value::Bool(true));
        let reply = self.sender().ack(sender, info);
        self.broadcast(&reply);
        Ok(())
    }

    fn record_capabilities(&mut self, message: &DroneMessage) -> Result<(), ControllerError> {
        if let Some(capabilities) = message.optional_param::<Vec<String>>("capabilities")? {
            if let Some(peer) = self.view.peer_mut(message.sender_id) {
                peer.capabilities = capabilities;
            }
        }
        Ok(())
    }

    fn handle_heartbeat(&mut self, sender: DroneId, sender_status: DroneStatus, now: Instant) {
        match self.view.master_id() {
            Some(master_id) if master_id == sender => {
                self.succession.record_master_heartbeat(sender, now);
            }
            Some(master_id) if sender_status == DroneStatus::Master => {
                tracing::warn!(
                    claimant = sender,
                    master_id,
                    "Conflicting master claim; restarting election"
                );
                self.view.clear_master();
                self.succession.reset();
                self.election.abort();
                self.start_election(now);
            }
            _ => {}
        }
    }

    fn handle_network_status(&mut self, status: NetworkStatusParams, now: Instant) {
        let added = self.view.merge_known_ids(&status.known_drones, now);
        if !added.is_empty() {
            tracing::debug!(added = ?added, "Learned drones from network status");
        }
        if let Some(master_id) = status.master_id {
            if self.view.master_id() != Some(master_id) {
                tracing::info!(master_id, "Adopting announced master");
                self.view.set_master(Some(master_id));
                self.succession.record_master_heartbeat(master_id, now);
            }
        }
    }

    fn handle_id_change(&mut self, change: IdConflictParams, now: Instant) {
        match self.view.rekey_peer(change.old_id, change.new_id) {
            Ok(true) => {
                tracing::info!(old_id = change.old_id, new_id = change.new_id, "Peer changed id");
                if let Some(peer) = self.view.peer_mut(change.new_id) {
                    peer.mark_seen(now);
                }
            }
            Ok(false) => {}
            Err(StateError::SelfUpdateRejected(_)) => {
                tracing::warn!(new_id = change.new_id, "Peer moved onto our id");
                self.resolve_id_conflict();
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring id change"),
        }
    }

    fn handle_vote(
        &mut self,
        voter: DroneId,
        vote: ElectMasterParams,
        now: Instant,
    ) -> Result<(), ControllerError> {
        if !self.election.is_in_progress() {
            tracing::debug!(voter, "Ignoring vote; no election in progress");
            return Ok(());
        }
        self.election.record_vote(voter, vote.candidate_id)?;
        if !self.election.has_voted() {
            self.cast_vote(now)?;
        }
        Ok(())
    }

    // ── Identity ──

    fn resolve_id_conflict(&mut self) {
        let old_id = self.view.self_id();
        let new_id = self.view.resolve_id_conflict();
        match self
            .sender()
            .id_conflict_resolution(&IdConflictParams { old_id, new_id })
        {
            Ok(announcement) => {
                self.broadcast(&announcement);
            }
            Err(e) => tracing::error!(error = %e, "Failed to build id change announcement"),
        }
    }

    // ── Elections ──

    fn start_election(&mut self, now: Instant) {
        if !self.election.start(now) {
            return;
        }
        if let Err(e) = self.cast_vote(now) {
            tracing::warn!(error = %e, "Failed to cast election vote");
        }
    }

    fn cast_vote(&mut self, now: Instant) -> Result<(), ControllerError> {
        let vote = self.election.participate(&self.view, now)?;
        let message = self.sender().elect_master(&vote)?;
        self.broadcast(&message);
        Ok(())
    }

    fn finalize_election(&mut self, now: Instant) {
        match self.election.finalize(&mut self.view, now) {
            Ok(outcome) => {
                self.succession.record_master_heartbeat(outcome.winner, now);
                if outcome.winner == self.view.self_id() {
                    tracing::info!(votes = outcome.total_votes, "Elected as master");
                } else {
                    tracing::info!(master_id = outcome.winner, "New master elected");
                }
                self.share_network_status(now);
            }
            Err(e) => tracing::warn!(error = %e, "Election finalization failed"),
        }
    }

    // ── Status ──

    fn apply_status_transition(&mut self, now: Instant) {
        if let Some(change) = reconcile_status(&mut self.view, now) {
            if change.lost_network() {
                self.discovery_attempts = 0;
                self.election.abort();
                self.succession.reset();
            }
        }
    }

    fn fall_back_to_seeking(&mut self, now: Instant) {
        if self.status() != DroneStatus::Seeking {
            self.view.set_self_status(DroneStatus::Seeking, now);
        }
        self.view.clear_master();
        self.election.abort();
        self.succession.reset();
        self.discovery_attempts = 0;
    }

    // ── Timers ──

    fn run_timers(&mut self, now: Instant) {
        let status = self.status();

        if status == DroneStatus::Seeking
            && self.discovery_attempts < self.intervals.max_discovery_attempts
            && due(self.timers.discovery, self.intervals.discovery, now)
        {
            self.timers.discovery = Some(now);
            self.send_discovery_announce();
        }

        if status.is_networked() && due(self.timers.heartbeat, self.intervals.heartbeat, now) {
            self.timers.heartbeat = Some(now);
            self.send_heartbeat();
        }

        if self.view.network_established()
            && due(self.timers.network_sync, self.intervals.network_sync, now)
        {
            self.share_network_status(now);
        }

        if due(self.timers.cleanup, self.intervals.cleanup, now) {
            self.timers.cleanup = Some(now);
            self.cleanup(now);
        }

        if status.is_networked() && due(self.timers.ping, self.intervals.ping, now) {
            self.timers.ping = Some(now);
            self.ping_peers(now);
        }

        if status.is_networked() && due(self.timers.master_check, self.intervals.master_check, now)
        {
            self.timers.master_check = Some(now);
            self.check_master(now);
        }

        if self.election.should_finalize(now) {
            self.finalize_election(now);
        }

        if due(self.timers.status_report, self.intervals.status_report, now) {
            self.timers.status_report = Some(now);
            tracing::info!(
                drone_id = self.view.self_id(),
                status = %self.status(),
                online = self.view.online_count(now),
                known = self.view.count(),
                master_id = ?self.view.master_id(),
                "{}",
                self.view.discovery_status(now)
            );
        }
    }

    fn send_discovery_announce(&mut self) {
        let presence = self.presence();
        match self.sender().discovery_announce(&presence) {
            Ok(message) => {
                // Only announcements that left the drone count against the cap.
                if self.broadcast(&message) {
                    self.discovery_attempts += 1;
                    tracing::debug!(attempt = self.discovery_attempts, "Sent discovery announcement");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to build discovery announcement"),
        }
    }

    fn send_heartbeat(&mut self) {
        let me = self.view.self_record();
        let heartbeat = HeartbeatParams {
            position: me.position,
            battery_level: me.battery_level,
        };
        match self.sender().heartbeat(&heartbeat) {
            Ok(message) => {
                self.broadcast(&message);
            }
            Err(e) => tracing::error!(error = %e, "Failed to build heartbeat"),
        }
    }

    /// Broadcast the current master and every drone seen within the master
    /// timeout, self included. The shorter window stops peers from keeping a
    /// dead drone alive by repeating each other's lists.
    fn share_network_status(&mut self, now: Instant) {
        self.timers.network_sync = Some(now);
        let mut known_drones: Vec<DroneId> = self
            .view
            .online_within(now, self.intervals.master_timeout)
            .into_iter()
            .map(|record| record.id())
            .collect();
        known_drones.sort_unstable();
        let status = NetworkStatusParams {
            known_drones,
            master_id: self.view.master_id(),
        };
        match self.sender().network_status(&status) {
            Ok(message) => {
                self.broadcast(&message);
            }
            Err(e) => tracing::error!(error = %e, "Failed to build network status"),
        }
    }

    fn cleanup(&mut self, now: Instant) {
        let evicted = self.view.cleanup_offline(now, self.intervals.master_timeout);
        if evicted.is_empty() {
            return;
        }
        tracing::info!(evicted = ?evicted, "Removed offline drones");
        if let Some(master_id) = self.view.master_id() {
            if evicted.contains(&master_id) {
                tracing::info!(master_id, "Master was removed during cleanup");
                self.view.clear_master();
                self.succession.reset();
            }
        }
    }

    fn ping_peers(&mut self, now: Instant) {
        for peer_id in self.view.online_peer_ids(now) {
            let ping = self.sender().ping(peer_id);
            if let Some(peer) = self.view.peer_mut(peer_id) {
                peer.record_ping();
            }
            self.broadcast(&ping);
        }
    }

    /// Failure detector plus the "no master yet" election trigger.
    fn check_master(&mut self, now: Instant) {
        if self.view.master_id().is_none() {
            if self.view.online_count(now) > 1 && !self.election.is_in_progress() {
                tracing::info!("No master assigned; starting election");
                self.start_election(now);
            }
            return;
        }
        if let MasterCheck::Failed {
            start_election: true,
            ..
        } = self.succession.check(&mut self.view, now)
        {
            self.start_election(now);
        }
    }

    // ── Outbound ──

    fn sender(&self) -> Sender {
        Sender::new(self.view.self_id(), self.status(), self.view.origin())
    }

    fn presence(&self) -> PresenceParams {
        let me = self.view.self_record();
        PresenceParams {
            position: me.position,
            battery_level: me.battery_level,
            capabilities: me.capabilities.clone(),
        }
    }

    /// Encode and send `message`. Returns whether the transport accepted it.
    fn broadcast(&mut self, message: &DroneMessage) -> bool {
        let payload = match encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(action = %message.action, error = %e, "Failed to encode message");
                return false;
            }
        };
        match self.transport.send(&payload) {
            Ok(()) => {
                self.summary.sent += 1;
                if !self.transport_healthy {
                    tracing::info!("Transport recovered; resuming discovery");
                    self.transport_healthy = true;
                    self.discovery_attempts = 0;
                }
                true
            }
            Err(e) => {
                tracing::warn!(action = %message.action, error = %e, "Send failed");
                self.send_failure.get_or_insert(e);
                false
            }
        }
    }
}
