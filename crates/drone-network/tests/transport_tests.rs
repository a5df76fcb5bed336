use std::net::SocketAddr;
use std::time::Duration;

use drone_network::{
    BroadcastHub, Datagram, NetworkError, Transport, TransportConfig, UdpBroadcastTransport,
};

fn loopback_config(target: SocketAddr) -> TransportConfig {
    TransportConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        broadcast_addr: target,
        ..TransportConfig::default()
    }
}

async fn receive_within(transport: &mut UdpBroadcastTransport, wait: Duration) -> Option<Datagram> {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if let Some(datagram) = transport.try_receive().unwrap() {
            return Some(datagram);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[test]
fn test_default_config_uses_protocol_port() {
    let config = TransportConfig::default();
    assert_eq!(config.bind_addr.port(), 37020);
    assert_eq!(config.broadcast_addr.port(), 37020);
    assert_eq!(config.max_datagram_bytes, 8192);
}

#[tokio::test]
async fn test_udp_delivers_to_inbox() {
    let unused = SocketAddr::from(([127, 0, 0, 1], 9));
    let mut receiver = UdpBroadcastTransport::bind(loopback_config(unused)).unwrap();
    let target = receiver.local_addr().unwrap();
    let mut sender = UdpBroadcastTransport::bind(loopback_config(target)).unwrap();

    assert!(receiver.try_receive().unwrap().is_none());
    sender.send(br#"{"hello":1}"#).unwrap();

    let datagram = receive_within(&mut receiver, Duration::from_secs(2))
        .await
        .expect("datagram should arrive over loopback");
    assert_eq!(datagram.payload, br#"{"hello":1}"#);
}

#[tokio::test]
async fn test_udp_inbox_preserves_each_datagram() {
    let unused = SocketAddr::from(([127, 0, 0, 1], 9));
    let mut receiver = UdpBroadcastTransport::bind(loopback_config(unused)).unwrap();
    let target = receiver.local_addr().unwrap();
    let mut sender = UdpBroadcastTransport::bind(loopback_config(target)).unwrap();

    for i in 0..3u8 {
        sender.send(&[i; 4]).unwrap();
    }

    let mut received = Vec::new();
    while received.len() < 3 {
        match receive_within(&mut receiver, Duration::from_secs(2)).await {
            Some(datagram) => received.push(datagram.payload),
            None => break,
        }
    }
    received.sort();
    assert_eq!(received, vec![vec![0u8; 4], vec![1u8; 4], vec![2u8; 4]]);
}

#[test]
fn test_hub_fans_out_to_every_endpoint() {
    let hub = BroadcastHub::new();
    let mut endpoints: Vec<_> = (0..4).map(|_| hub.connect()).collect();
    assert_eq!(hub.endpoint_count(), 4);

    endpoints[2].send(b"status").unwrap();

    for endpoint in endpoints.iter_mut() {
        let datagram = endpoint.try_receive().unwrap().unwrap();
        assert_eq!(datagram.payload, b"status");
        assert!(endpoint.try_receive().unwrap().is_none());
    }
}

#[test]
fn test_offline_endpoint_neither_sends_nor_receives() {
    let hub = BroadcastHub::new();
    let mut a = hub.connect();
    let mut b = hub.connect();

    b.set_online(false);
    assert!(matches!(b.send(b"x"), Err(NetworkError::Transport(_))));

    a.send(b"y").unwrap();
    assert!(b.try_receive().unwrap().is_none());
    assert_eq!(a.try_receive().unwrap().unwrap().payload, b"y");

    b.set_online(true);
    a.send(b"z").unwrap();
    assert_eq!(b.try_receive().unwrap().unwrap().payload, b"z");
}

#[test]
fn test_seeded_loss_is_partial_and_reproducible() {
    let run = || {
        let hub = BroadcastHub::with_loss(0.5, Some(42));
        let mut a = hub.connect();
        let mut b = hub.connect();
        for _ in 0..200 {
            a.send(b"p").unwrap();
        }
        let mut got = 0;
        while b.try_receive().unwrap().is_some() {
            got += 1;
        }
        a.drain();
        (got, hub.stats())
    };

    let (got, (delivered, dropped)) = run();
    assert!(got > 0 && got < 200);
    assert_eq!(delivered + dropped, 400);
    assert_eq!(run().0, got);
}
