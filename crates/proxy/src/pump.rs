//! Directional pump.
//!
//! A pump owns one read direction of a bridged connection. Each turn it:
//!
//! 1. writes every waiting injected packet to the destination, in order
//! 2. reads one chunk (up to [`READ_CHUNK`] bytes) from the source
//! 3. frames the chunk and dispatches every completed packet
//! 4. forwards the chunk, byte for byte, to the destination
//!
//! Dispatch never alters or delays what is forwarded beyond step 3 running
//! first. The pump stops only when the source closes or a socket errors.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatch::{Dispatched, Dispatcher};
use crate::framing::FrameBuffer;
use crate::inject::InjectionQueue;
use crate::types::Direction;

/// Read buffer size per turn.
pub const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum ExitReason {
    /// Source returned EOF.
    SourceClosed,
    SourceError(io::Error),
    DestinationError(io::Error),
}

/// Returned when a pump finishes; hands the injection queue back to the bridge.
#[derive(Debug)]
pub struct PumpExit {
    pub direction: Direction,
    pub queue: InjectionQueue,
    pub reason: ExitReason,
    pub bytes_forwarded: u64,
    pub bytes_injected: u64,
    pub packets: u64,
    /// Bytes of a trailing packet that never saw its NUL.
    pub unterminated: usize,
}

pub struct Pump<R, W> {
    direction: Direction,
    source: R,
    destination: W,
    queue: InjectionQueue,
    dispatcher: Arc<Dispatcher>,
    frames: FrameBuffer,
    bytes_forwarded: u64,
    bytes_injected: u64,
    packets: u64,
}

impl<R, W> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        direction: Direction,
        source: R,
        destination: W,
        queue: InjectionQueue,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
            queue,
            dispatcher,
            frames: FrameBuffer::with_capacity(READ_CHUNK),
            bytes_forwarded: 0,
            bytes_injected: 0,
            packets: 0,
        }
    }

    /// Pump until the source closes or either side fails.
    pub async fn run(mut self) -> PumpExit {
        let mut buf = vec![0u8; READ_CHUNK];

        let reason = loop {
            if let Err(e) = self.flush_injections().await {
                break ExitReason::DestinationError(e);
            }

            tokio::select! {
                biased;

                Some(packet) = self.queue.recv() => {
                    if let Err(e) = self.write_injected(&packet).await {
                        break ExitReason::DestinationError(e);
                    }
                }

                read = self.source.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => break ExitReason::SourceClosed,
                        Ok(n) => n,
                        Err(e) => break ExitReason::SourceError(e),
                    };
                    let chunk = &buf[..n];
                    self.observe(chunk);
                    if let Err(e) = self.forward(chunk).await {
                        break ExitReason::DestinationError(e);
                    }
                }
            }
        };

        match &reason {
            ExitReason::SourceClosed => {
                tracing::debug!(direction = %self.direction, "source closed");
            }
            ExitReason::SourceError(e) | ExitReason::DestinationError(e) => {
                tracing::warn!(direction = %self.direction, error = %e, "pump stopped");
            }
        }
        let unterminated = self.frames.pending_len();
        if unterminated > 0 {
            tracing::info!(
                direction = %self.direction,
                bytes = unterminated,
                "discarding unterminated packet at stream end"
            );
        }
        // Propagate the close so the opposite pump's source sees EOF.
        let _ = self.destination.shutdown().await;

        PumpExit {
            direction: self.direction,
            queue: self.queue,
            reason,
            bytes_forwarded: self.bytes_forwarded,
            bytes_injected: self.bytes_injected,
            packets: self.packets,
            unterminated,
        }
    }

    async fn flush_injections(&mut self) -> io::Result<()> {
        while let Some(packet) = self.queue.try_pop() {
            self.write_injected(&packet).await?;
        }
        Ok(())
    }

    async fn write_injected(&mut self, packet: &[u8]) -> io::Result<()> {
        tracing::info!(direction = %self.direction, bytes = packet.len(), "injecting packet");
        self.destination.write_all(packet).await?;
        self.destination.flush().await?;
        self.bytes_injected += packet.len() as u64;
        Ok(())
    }

    /// Frame and dispatch every packet completed by `chunk`.
    fn observe(&mut self, chunk: &[u8]) {
        self.frames.push(chunk);
        while let Some(packet) = self.frames.next_packet() {
            if packet.is_empty() {
                continue;
            }
            self.packets += 1;
            let outcome = self.dispatcher.handle(self.direction, &packet);
            if outcome == Dispatched::Rejected {
                tracing::debug!(direction = %self.direction, "packet rejected, relaying anyway");
            }
        }
    }

    async fn forward(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.destination.write_all(chunk).await?;
        self.destination.flush().await?;
        self.bytes_forwarded += chunk.len() as u64;
        Ok(())
    }
}
