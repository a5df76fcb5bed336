//! UDP broadcast transport.
//!
//! A background task owns the receive side of the socket and pushes every
//! datagram into an unbounded inbox; `try_receive` pops from that inbox.
//! Sends go through a non-blocking clone of the same socket, so they never
//! wait on the runtime's readiness tracking.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use drone_protocol::{DEFAULT_PORT, MAX_DATAGRAM_BYTES};

use crate::transport::{Datagram, Transport};
use crate::NetworkError;

/// Configuration for the UDP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address to receive on.
    pub bind_addr: SocketAddr,
    /// Where outgoing datagrams are sent.
    pub broadcast_addr: SocketAddr,
    /// Receive buffer size. Longer datagrams are truncated by the OS and
    /// then fail to decode.
    pub max_datagram_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            broadcast_addr: SocketAddr::from(([255, 255, 255, 255], DEFAULT_PORT)),
            max_datagram_bytes: MAX_DATAGRAM_BYTES,
        }
    }
}

type InboxItem = Result<Datagram, NetworkError>;

pub struct UdpBroadcastTransport {
    socket: StdUdpSocket,
    broadcast_addr: SocketAddr,
    inbox: mpsc::UnboundedReceiver<InboxItem>,
    receiver: JoinHandle<()>,
}

impl UdpBroadcastTransport {
    /// Bind the socket, enable broadcast and start the receive task. Must be
    /// called inside a tokio runtime.
    pub fn bind(config: TransportConfig) -> Result<Self, NetworkError> {
        let socket = StdUdpSocket::bind(config.bind_addr)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        let recv_socket = UdpSocket::from_std(socket.try_clone()?)?;

        let (tx, inbox) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(receive_loop(recv_socket, tx, config.max_datagram_bytes));

        tracing::info!(
            bind_addr = %config.bind_addr,
            broadcast_addr = %config.broadcast_addr,
            "UDP broadcast transport ready"
        );

        Ok(Self {
            socket,
            broadcast_addr: config.broadcast_addr,
            inbox,
            receiver,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }
}

/// Pause before retrying after `consecutive` failed receives in a row.
/// Doubles from 10ms and is capped at one second.
fn receive_backoff(consecutive: u32) -> Duration {
    const BASE: Duration = Duration::from_millis(10);
    const MAX: Duration = Duration::from_secs(1);
    if consecutive == 0 {
        return Duration::ZERO;
    }
    BASE.saturating_mul(1 << consecutive.saturating_sub(1).min(16)).min(MAX)
}

async fn receive_loop(
    socket: UdpSocket,
    tx: mpsc::UnboundedSender<InboxItem>,
    max_datagram_bytes: usize,
) {
    let mut buf = vec![0u8; max_datagram_bytes];
    let mut consecutive_errors = 0u32;
    loop {
        let item = match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                consecutive_errors = 0;
                tracing::trace!(%from, len, "Datagram received");
                Ok(Datagram::new(buf[..len].to_vec()))
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                tracing::warn!(error = %e, consecutive_errors, "UDP receive failed");
                Err(NetworkError::Io(e))
            }
        };
        if tx.send(item).is_err() {
            // Transport dropped.
            return;
        }
        if consecutive_errors > 0 {
            tokio::time::sleep(receive_backoff(consecutive_errors)).await;
        }
    }
}

impl Transport for UdpBroadcastTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        let sent = self.socket.send_to(payload, self.broadcast_addr)?;
        if sent != payload.len() {
            return Err(NetworkError::Transport(format!(
                "short send: {sent} of {} bytes",
                payload.len()
            )));
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Datagram>, NetworkError> {
        match self.inbox.try_recv() {
            Ok(Ok(datagram)) => Ok(Some(datagram)),
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NetworkError::Closed),
        }
    }
}

impl Drop for UdpBroadcastTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
