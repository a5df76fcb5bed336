use drone_protocol::*;
use uuid::Uuid;

fn sender(id: DroneId, status: DroneStatus) -> Sender {
    Sender::new(id, status, Uuid::new_v4())
}

fn presence() -> PresenceParams {
    PresenceParams {
        position: Position::new(1.25, -3.5, 10.0),
        battery_level: 87.5,
        capabilities: vec!["camera".into(), "lidar".into()],
    }
}

#[test]
fn test_roundtrip_every_action() {
    let s = sender(1234, DroneStatus::Slave);
    let messages = vec![
        s.ping(77),
        s.discovery_announce(&presence()).unwrap(),
        s.discovery_response(77, &presence()).unwrap(),
        s.heartbeat(&HeartbeatParams {
            position: Position::new(0.5, 0.5, 2.0),
            battery_level: 42.0,
        })
        .unwrap(),
        s.network_status(&NetworkStatusParams {
            known_drones: vec![1234, 77, 9],
            master_id: Some(9),
        })
        .unwrap(),
        s.id_conflict_resolution(&IdConflictParams { old_id: 5, new_id: 1234 })
            .unwrap(),
        s.elect_master(&ElectMasterParams {
            candidate_id: 9,
            criteria: ElectionCriteria {
                battery_level: 99.0,
                uptime: 12.75,
                reliability: 0.5,
                drone_id: 9,
            },
        })
        .unwrap(),
        s.ack(77, to_params(&serde_json::json!({"ping_response": true})).unwrap()),
    ];

    for message in messages {
        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, message, "roundtrip failed for {}", message.action);
    }
}

#[test]
fn test_wire_field_names() {
    let s = sender(7, DroneStatus::Master);
    let msg = s.ping(8);
    let value: serde_json::Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
    assert_eq!(value["drone_id"], 7);
    assert_eq!(value["destination_id"], 8);
    assert_eq!(value["current_state"], "master");
    assert_eq!(value["action"], "PING");
    assert!(value["params"].is_object());
}

#[test]
fn test_decode_truncated_datagram() {
    let s = sender(7, DroneStatus::Seeking);
    let bytes = encode(&s.discovery_announce(&presence()).unwrap()).unwrap();
    let result = decode(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_garbage() {
    assert!(matches!(decode(b"\x00\x01not json"), Err(ProtocolError::Decode(_))));
    assert!(matches!(decode(b""), Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_unknown_action() {
    let raw = br#"{"timestamp":1,"drone_id":3,"destination_id":-1,"current_state":"seeking","action":"SET_SLAVE","params":{}}"#;
    assert!(matches!(decode(raw), Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_unknown_status() {
    let raw = br#"{"timestamp":1,"drone_id":3,"destination_id":-1,"current_state":"flying","action":"PING","params":{}}"#;
    assert!(matches!(decode(raw), Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_rejects_zero_sender() {
    let raw = br#"{"timestamp":1,"drone_id":0,"destination_id":-1,"current_state":"seeking","action":"PING","params":{}}"#;
    assert!(matches!(decode(raw), Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_rejects_missing_required_params() {
    let raw = br#"{"timestamp":1,"drone_id":3,"destination_id":-1,"current_state":"connected","action":"HEARTBEAT","params":{"battery_level":50.0}}"#;
    assert!(matches!(decode(raw), Err(ProtocolError::Decode(_))));
}

#[test]
fn test_decode_without_origin_uses_nil() {
    let raw = br#"{"timestamp":1,"drone_id":3,"destination_id":-1,"current_state":"seeking","action":"PING"}"#;
    let msg = decode(raw).unwrap();
    assert!(msg.origin.is_nil());
    assert!(msg.params.is_empty());
}
