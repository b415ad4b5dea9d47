//! Injection queues.
//!
//! Each direction of a bridge owns one [`InjectionQueue`]. The operator side
//! holds the matching [`Injector`] and may enqueue raw packets at any time; the
//! pump drains the queue, in enqueue order, before every read.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::types::PACKET_DELIMITER;

#[derive(Debug, thiserror::Error)]
#[error("injection queue closed")]
pub struct InjectError;

/// Create a connected producer/consumer pair.
pub fn injection_queue() -> (Injector, InjectionQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Injector { tx }, InjectionQueue { rx })
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Injector {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Injector {
    /// Enqueue one application packet, appending the NUL terminator if missing.
    pub fn inject(&self, payload: impl AsRef<[u8]>) -> Result<(), InjectError> {
        let payload = payload.as_ref();
        let mut packet = BytesMut::with_capacity(payload.len() + 1);
        packet.extend_from_slice(payload);
        if payload.last() != Some(&PACKET_DELIMITER) {
            packet.extend_from_slice(&[PACKET_DELIMITER]);
        }
        self.inject_raw(packet.freeze())
    }

    /// Enqueue bytes exactly as given.
    pub fn inject_raw(&self, bytes: Bytes) -> Result<(), InjectError> {
        self.tx.send(bytes).map_err(|_| InjectError)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by exactly one pump at a time.
#[derive(Debug)]
pub struct InjectionQueue {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl InjectionQueue {
    /// Next waiting packet without blocking.
    pub fn try_pop(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next packet. Returns `None` once every injector is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
