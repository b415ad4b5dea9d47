//! NUL-delimited packet framing.
//!
//! TCP hands us arbitrary chunks; application packets end with a single NUL
//! byte. [`FrameBuffer`] keeps the unconsumed tail of the stream and yields each
//! complete packet (without its delimiter) in stream order. Bytes after the last
//! delimiter stay buffered until more data arrives.

use bytes::{Buf, Bytes, BytesMut};

use crate::types::PACKET_DELIMITER;

#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
    /// Prefix of `buf` already known to contain no delimiter.
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete packet, if any.
    ///
    /// Adjacent delimiters yield empty packets; callers decide whether to skip them.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        let offset = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == PACKET_DELIMITER);

        match offset {
            Some(offset) => {
                let end = self.scanned + offset;
                let packet = self.buf.split_to(end).freeze();
                self.buf.advance(1);
                self.scanned = 0;
                Some(packet)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Append `chunk` and drain every packet it completes.
    pub fn extend_and_split(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.push(chunk);
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet() {
            packets.push(packet);
        }
        packets
    }

    /// Bytes received after the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
