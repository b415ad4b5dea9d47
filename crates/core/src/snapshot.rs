//! Snapshot decoding.
//!
//! A snapshot blob is base64 text wrapping a zlib stream. The inflated buffer is:
//!
//! | Offset | Size | Meaning |
//! |--------|------|---------|
//! | 0 | 1 | incoming garbage lines |
//! | 1 | 200 | 20 rows x 10 columns, row-major, one byte per cell |
//!
//! Each cell byte carries the mino id in its high nibble and render flags in the
//! low nibble. Flags are dropped; ids above 8 collapse to garbage.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::types::{clamp_mino, Grid, FIELD_HEIGHT, FIELD_WIDTH};

/// Minimum inflated length: one header byte plus the full field.
pub const SNAPSHOT_MIN_LEN: usize = 1 + FIELD_WIDTH * FIELD_HEIGHT;

/// Upper bound on the inflated size we are willing to buffer.
const MAX_INFLATED_LEN: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("zlib inflate failed: {0}")]
    Inflate(#[from] std::io::Error),
    #[error("snapshot buffer too short: {len} bytes, need {min}")]
    TooShort { len: usize, min: usize },
}

/// A decoded snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Pending garbage lines reported by the client. Informational only.
    pub incoming_lines: u8,
    pub grid: Grid,
}

/// Decode a base64 + zlib snapshot blob into a grid.
pub fn decode_snapshot(blob: &str) -> Result<Snapshot, DecodeError> {
    let compressed = STANDARD.decode(blob.trim())?;

    let mut buffer = Vec::with_capacity(SNAPSHOT_MIN_LEN * 2);
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_LEN)
        .read_to_end(&mut buffer)?;

    if buffer.len() < SNAPSHOT_MIN_LEN {
        return Err(DecodeError::TooShort {
            len: buffer.len(),
            min: SNAPSHOT_MIN_LEN,
        });
    }

    let incoming_lines = buffer[0];
    tracing::trace!(incoming_lines, len = buffer.len(), "inflated snapshot");
    let mut rows = [[0u8; FIELD_WIDTH]; FIELD_HEIGHT];
    for (y, row) in rows.iter_mut().enumerate() {
        let start = 1 + y * FIELD_WIDTH;
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = clamp_mino(buffer[start + x] >> 4);
        }
    }

    Ok(Snapshot {
        incoming_lines,
        grid: Grid::from_rows(rows),
    })
}

/// Encode a grid in the client's snapshot format.
///
/// Used to build fixtures and injected packets; the low nibble is left zero.
pub fn encode_snapshot(incoming_lines: u8, grid: &Grid) -> std::io::Result<String> {
    let mut raw = Vec::with_capacity(SNAPSHOT_MIN_LEN);
    raw.push(incoming_lines);
    for row in grid.rows().iter() {
        raw.extend(row.iter().map(|&mino| mino << 4));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}
