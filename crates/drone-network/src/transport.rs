use std::time::Instant;

use crate::NetworkError;

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub received_at: Instant,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            received_at: Instant::now(),
            payload,
        }
    }
}

/// A best-effort broadcast medium.
///
/// Neither call blocks. `try_receive` yields at most one datagram per call
/// and `Ok(None)` when nothing is pending.
pub trait Transport {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetworkError>;

    fn try_receive(&mut self) -> Result<Option<Datagram>, NetworkError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        (**self).send(payload)
    }

    fn try_receive(&mut self) -> Result<Option<Datagram>, NetworkError> {
        (**self).try_receive()
    }
}
