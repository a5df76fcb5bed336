use std::time::{Duration, Instant};

use uuid::Uuid;

use drone_connector::{ControllerError, DroneController, Intervals};
use drone_network::{BroadcastHub, MemoryTransport, Transport};
use drone_protocol::{
    decode, encode, Action, DroneId, DroneMessage, DroneStatus, HeartbeatParams,
    IdConflictParams, NetworkStatusParams, Position, Sender,
};
use drone_state::NetworkView;

fn controller(hub: &BroadcastHub, id: DroneId, now: Instant) -> DroneController<MemoryTransport> {
    DroneController::new(NetworkView::new(id, now), hub.connect(), Intervals::default())
}

/// A remote drone with its own instance token.
fn remote(id: DroneId, status: DroneStatus) -> Sender {
    Sender::new(id, status, Uuid::new_v4())
}

fn heartbeat(from: &Sender) -> DroneMessage {
    from.heartbeat(&HeartbeatParams {
        position: Position::new(1.0, 2.0, 3.0),
        battery_level: 75.0,
    })
    .unwrap()
}

/// Decode everything queued on an observer endpoint.
fn received(observer: &mut MemoryTransport) -> Vec<DroneMessage> {
    let mut messages = Vec::new();
    while let Some(datagram) = observer.try_receive().unwrap() {
        messages.push(decode(&datagram.payload).unwrap());
    }
    messages
}

#[test]
fn test_ping_is_answered_with_ack() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);
    let mut observer = hub.connect();

    let peer = remote(2, DroneStatus::Connected);
    node.handle_message(&peer.ping(1), now);

    let acks: Vec<_> = received(&mut observer)
        .into_iter()
        .filter(|m| m.action == Action::Ack)
        .collect();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].sender_id, 1);
    assert_eq!(acks[0].destination_id, 2);
    assert_eq!(acks[0].params["ping_response"], serde_json::Value::Bool(true));
    assert!(node.view().contains(2));
}

#[test]
fn test_ack_counts_as_response() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);

    let peer = remote(2, DroneStatus::Connected);
    node.handle_message(&peer.ack(1, Default::default()), now);
    node.handle_message(&peer.ack(1, Default::default()), now);

    assert_eq!(node.view().peer(2).unwrap().response_count, 2);
}

#[test]
fn test_messages_for_other_drones_are_ignored() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);
    let mut observer = hub.connect();

    let peer = remote(2, DroneStatus::Connected);
    node.handle_message(&peer.ping(99), now);

    assert_eq!(node.view().count(), 1);
    assert!(received(&mut observer).is_empty());
}

#[test]
fn test_own_echo_is_not_a_conflict() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 4, start);

    let first = node.tick(start).unwrap();
    assert!(first.sent >= 1);

    let second = node.tick(start + Duration::from_millis(100)).unwrap();
    assert!(second.received >= 1);
    assert_eq!(node.self_id(), 4);
    assert_eq!(node.view().count(), 1);
    assert!(node.view().conflict_log().is_empty());
    assert_eq!(node.status(), DroneStatus::Seeking);
}

#[test]
fn test_id_conflict_picks_new_id_and_announces_it() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 7, now);
    let mut observer = hub.connect();

    let impostor = remote(7, DroneStatus::Connected);
    node.handle_message(&heartbeat(&impostor), now);

    let new_id = node.self_id();
    assert_ne!(new_id, 7);
    assert_ne!(new_id, 0);
    assert_eq!(node.view().conflict_log().len(), 1);
    // The conflicting message is not merged.
    assert_eq!(node.view().count(), 1);

    let announcements: Vec<_> = received(&mut observer)
        .into_iter()
        .filter(|m| m.action == Action::IdConflictResolution)
        .collect();
    assert_eq!(announcements.len(), 1);
    let change: IdConflictParams = announcements[0].params_as().unwrap();
    assert_eq!(change, IdConflictParams { old_id: 7, new_id });
    assert_eq!(announcements[0].sender_id, new_id);
}

#[test]
fn test_peer_id_change_rekeys_record() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);

    node.handle_message(&heartbeat(&remote(3, DroneStatus::Slave)), now);
    let moved = remote(30, DroneStatus::Slave);
    let announcement = moved
        .id_conflict_resolution(&IdConflictParams { old_id: 3, new_id: 30 })
        .unwrap();
    node.handle_message(&announcement, now);

    assert!(node.view().peer(3).is_none());
    assert_eq!(node.view().peer(30).unwrap().position, Position::new(1.0, 2.0, 3.0));
}

#[test]
fn test_conflicting_master_claim_restarts_election() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 7, now);
    let mut observer = hub.connect();

    node.handle_message(&heartbeat(&remote(5, DroneStatus::Master)), now);
    node.view_mut().set_master(Some(5));
    node.view_mut().set_self_status(DroneStatus::Slave, now);

    node.handle_message(&heartbeat(&remote(9, DroneStatus::Master)), now);

    assert_eq!(node.view().master_id(), None);
    assert!(node.election().is_in_progress());
    assert!(node.election().has_voted());

    let votes: Vec<_> = received(&mut observer)
        .into_iter()
        .filter(|m| m.action == Action::ElectMaster)
        .collect();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].sender_id, 7);
}

#[test]
fn test_absent_master_is_cleared_and_election_started() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 6, now);

    node.handle_message(&heartbeat(&remote(8, DroneStatus::Connected)), now);
    node.view_mut().set_master(Some(5));

    let summary = node.tick(now).unwrap();

    assert_eq!(node.view().master_id(), None);
    assert_eq!(summary.status, DroneStatus::Connected);
    assert!(node.election().is_in_progress());
}

#[test]
fn test_election_finalizes_after_timeout() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 6, start);
    node.view_mut().self_record_mut().set_battery(90.0, start);

    node.handle_message(&heartbeat(&remote(8, DroneStatus::Connected)), start);
    node.tick(start).unwrap();
    assert!(node.election().is_in_progress());

    let timeout = node.intervals().election_timeout;
    node.tick(start + timeout - Duration::from_millis(100)).unwrap();
    assert!(node.election().is_in_progress());

    // Keep the peer online while the election runs.
    node.handle_message(&heartbeat(&remote(8, DroneStatus::Connected)), start + timeout);
    node.tick(start + timeout).unwrap();
    assert!(!node.election().is_in_progress());
    assert_eq!(node.view().master_id(), Some(6));
    assert_eq!(node.status(), DroneStatus::Master);
    assert_eq!(node.view().peer(8).unwrap().status, DroneStatus::Slave);
}

#[test]
fn test_votes_outside_an_election_are_ignored() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);
    let mut observer = hub.connect();

    let mut peer_view = NetworkView::new(2, now);
    peer_view.set_self_status(DroneStatus::Connected, now);
    let mut engine = drone_consensus::ElectionEngine::default();
    engine.start(now);
    let vote = engine.participate(&peer_view, now).unwrap();
    let message = remote(2, DroneStatus::Connected).elect_master(&vote).unwrap();

    node.handle_message(&message, now);

    assert!(!node.election().is_in_progress());
    assert!(received(&mut observer).is_empty());
}

#[test]
fn test_network_status_is_idempotent() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);

    let status = remote(2, DroneStatus::Master)
        .network_status(&NetworkStatusParams {
            known_drones: vec![1, 2, 3, 4],
            master_id: Some(2),
        })
        .unwrap();

    node.handle_message(&status, now);
    let once = node.view().snapshot(now).records;
    node.handle_message(&status, now);
    let twice = node.view().snapshot(now).records;

    assert_eq!(once, twice);
    assert_eq!(node.view().count(), 4);
    assert_eq!(node.view().master_id(), Some(2));
}

#[test]
fn test_discovery_announce_gets_response_and_connects() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, start);
    let mut peer_endpoint = hub.connect();

    let announce = remote(2, DroneStatus::Seeking)
        .discovery_announce(&drone_protocol::PresenceParams {
            position: Position::new(3.0, 3.0, 0.0),
            battery_level: 60.0,
            capabilities: vec!["camera".into()],
        })
        .unwrap();
    peer_endpoint.send(&encode(&announce).unwrap()).unwrap();
    peer_endpoint.drain();

    let summary = node.tick(start).unwrap();
    assert_eq!(summary.status, DroneStatus::Connected);

    let peer = node.view().peer(2).unwrap();
    assert_eq!(peer.capabilities, vec!["camera".to_string()]);
    assert_eq!(peer.battery_level, 60.0);

    let actions: Vec<_> = received(&mut peer_endpoint).into_iter().map(|m| m.action).collect();
    assert!(actions.contains(&Action::DiscoveryResponse));
    assert!(actions.contains(&Action::Heartbeat));
}

#[test]
fn test_malformed_datagram_is_dropped() {
    let now = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, now);
    let mut other = hub.connect();

    other.send(b"{not json").unwrap();
    let summary = node.tick(now).unwrap();

    assert_eq!(summary.dropped, 1);
    assert_eq!(node.view().count(), 1);
}

#[test]
fn test_discovery_stops_after_max_attempts() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, start);
    let max = node.intervals().max_discovery_attempts;

    for step in 0..600 {
        node.tick(start + Duration::from_millis(100 * step)).unwrap();
    }
    assert_eq!(node.discovery_attempts(), max);
    assert_eq!(node.status(), DroneStatus::Seeking);
}

#[test]
fn test_transport_failure_falls_back_to_seeking() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, start);
    node.transport_mut().set_online(false);

    let result = node.tick(start);
    assert!(matches!(result, Err(ControllerError::TransportUnavailable(_))));
    assert_eq!(node.status(), DroneStatus::Seeking);
    assert!(!node.is_transport_healthy());

    node.transport_mut().set_online(true);
    let later = start + node.intervals().discovery + Duration::from_millis(100);
    assert!(node.tick(later).is_ok());
    assert!(node.is_transport_healthy());
}

#[test]
fn test_discovery_resumes_after_long_outage() {
    let start = Instant::now();
    let hub = BroadcastHub::new();
    let mut node = controller(&hub, 1, start);
    let mut observer = hub.connect();
    let tick = Duration::from_millis(100);

    // Longer than max_discovery_attempts discovery intervals.
    node.transport_mut().set_online(false);
    let mut step = 0u32;
    while tick * step < Duration::from_secs(40) {
        let _ = node.tick(start + tick * step);
        step += 1;
    }
    assert_eq!(node.discovery_attempts(), 0);
    assert_eq!(node.status(), DroneStatus::Seeking);
    assert!(received(&mut observer).is_empty());

    node.transport_mut().set_online(true);
    while tick * step < Duration::from_secs(100) {
        node.tick(start + tick * step).unwrap();
        step += 1;
    }

    let announces = received(&mut observer)
        .into_iter()
        .filter(|m| m.action == Action::DiscoveryAnnounce)
        .count();
    assert!(node.is_transport_healthy());
    assert_eq!(announces as u32, node.intervals().max_discovery_attempts);
    assert_eq!(node.discovery_attempts(), node.intervals().max_discovery_attempts);
}
