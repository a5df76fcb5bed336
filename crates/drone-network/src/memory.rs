//! In-process broadcast medium.
//!
//! Every send is offered to every attached endpoint, the sender included,
//! the way a real broadcast socket loops datagrams back. Each delivery is
//! dropped independently with the hub's loss probability.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::transport::{Datagram, Transport};
use crate::NetworkError;

struct Endpoint {
    tx: mpsc::UnboundedSender<Datagram>,
    online: bool,
}

struct HubInner {
    endpoints: Vec<Endpoint>,
    loss_probability: f64,
    rng: StdRng,
    delivered: u64,
    dropped: u64,
}

/// Shared broadcast medium. Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubInner>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// A lossless hub.
    pub fn new() -> Self {
        Self::with_loss(0.0, None)
    }

    /// A hub that drops each delivery with `loss_probability`. A seed makes
    /// the losses reproducible.
    pub fn with_loss(loss_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                endpoints: Vec::new(),
                loss_probability: if loss_probability.is_nan() {
                    0.0
                } else {
                    loss_probability.clamp(0.0, 1.0)
                },
                rng,
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// Attach a new endpoint.
    pub fn connect(&self) -> MemoryTransport {
        let (tx, inbox) = mpsc::unbounded_channel();
        let index = self.with_inner(|inner| {
            inner.endpoints.push(Endpoint { tx, online: true });
            inner.endpoints.len() - 1
        });
        MemoryTransport {
            hub: self.clone(),
            index,
            inbox,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.with_inner(|inner| inner.endpoints.len())
    }

    /// `(delivered, dropped)` counts since the hub was created.
    pub fn stats(&self) -> (u64, u64) {
        self.with_inner(|inner| (inner.delivered, inner.dropped))
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut HubInner) -> R) -> R {
        match self.inner.lock() {
            Ok(mut inner) => f(&mut inner),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set_online(&self, index: usize, online: bool) {
        self.with_inner(|inner| {
            if let Some(endpoint) = inner.endpoints.get_mut(index) {
                endpoint.online = online;
            }
        });
    }

    fn is_online(&self, index: usize) -> bool {
        self.with_inner(|inner| inner.endpoints.get(index).is_some_and(|e| e.online))
    }

    fn broadcast(&self, payload: &[u8]) {
        self.with_inner(|inner| {
            let HubInner {
                endpoints,
                loss_probability,
                rng,
                delivered,
                dropped,
            } = inner;
            for endpoint in endpoints.iter().filter(|e| e.online) {
                if *loss_probability > 0.0 && rng.gen_bool(*loss_probability) {
                    *dropped += 1;
                    continue;
                }
                // A closed inbox means the endpoint was dropped.
                if endpoint.tx.send(Datagram::new(payload.to_vec())).is_ok() {
                    *delivered += 1;
                }
            }
        });
    }
}

/// One endpoint on a [`BroadcastHub`].
pub struct MemoryTransport {
    hub: BroadcastHub,
    index: usize,
    inbox: mpsc::UnboundedReceiver<Datagram>,
}

impl MemoryTransport {
    /// Take the endpoint off the medium (or put it back). While offline its
    /// sends fail and nothing is delivered to it.
    pub fn set_online(&mut self, online: bool) {
        self.hub.set_online(self.index, online);
    }

    pub fn is_online(&self) -> bool {
        self.hub.is_online(self.index)
    }

    /// Discard everything already queued for this endpoint.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.inbox.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        if !self.is_online() {
            return Err(NetworkError::Transport("endpoint is offline".into()));
        }
        self.hub.broadcast(payload);
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Datagram>, NetworkError> {
        match self.inbox.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NetworkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_hears_its_own_broadcast() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect();
        let mut b = hub.connect();

        a.send(b"hello").unwrap();

        assert_eq!(a.try_receive().unwrap().unwrap().payload, b"hello");
        assert_eq!(b.try_receive().unwrap().unwrap().payload, b"hello");
        assert!(a.try_receive().unwrap().is_none());
        assert_eq!(hub.stats(), (2, 0));
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let hub = BroadcastHub::with_loss(1.0, Some(7));
        let mut a = hub.connect();
        let mut b = hub.connect();
        a.send(b"x").unwrap();
        assert!(b.try_receive().unwrap().is_none());
        assert_eq!(hub.stats(), (0, 2));
    }
}
