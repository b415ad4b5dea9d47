//! Core types module - shared data structures and constants
//!
//! This module defines the fundamental types used throughout the proxy.
//! All types are pure data structures with no external dependencies, making them
//! usable in any context (snapshot decoding, session tracking, replay export).
//!
//! # Board Dimensions
//!
//! Tetris Friends snapshots always describe a standard playfield:
//!
//! - **Width**: 10 columns (indexed 0-9)
//! - **Height**: 20 rows (indexed 0-19, in wire order)
//!
//! # Mino Identifiers
//!
//! | Id | Meaning |
//! |----|---------|
//! | 0 | Empty |
//! | 1-7 | Tetromino colours |
//! | 8 | Garbage (also used for "hurry up" rows) |
//!
//! # Examples
//!
//! ```
//! use tf_sniffer_types::{Grid, Direction, FIELD_HEIGHT, FIELD_WIDTH};
//!
//! let mut grid = Grid::empty();
//! grid.set(3, 19, 12);
//! assert_eq!(grid.get(3, 19), Some(8)); // clamped to garbage
//! assert_eq!(grid.first_populated_row(), Some(19));
//!
//! assert_eq!(Direction::FromClient.as_str(), "client");
//! assert_eq!(FIELD_WIDTH, 10);
//! assert_eq!(FIELD_HEIGHT, 20);
//! ```

use std::fmt;

/// Field width in cells (10 columns)
pub const FIELD_WIDTH: usize = 10;

/// Field height in cells (20 rows)
pub const FIELD_HEIGHT: usize = 20;

/// Highest mino id the core keeps; anything above collapses to garbage.
pub const MAX_MINO: u8 = 8;

/// Garbage block mino id.
pub const GARBAGE_MINO: u8 = 8;

/// Packet delimiter on the wire (both directions).
pub const PACKET_DELIMITER: u8 = 0;

/// Which side of the bridge a packet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read from the game client, travelling to the upstream server.
    FromClient,
    /// Read from the upstream server, travelling to the game client.
    FromServer,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::FromClient => "client",
            Direction::FromServer => "server",
        }
    }

    /// The direction travelling the other way across the same bridge.
    pub fn reverse(self) -> Self {
        match self {
            Direction::FromClient => Direction::FromServer,
            Direction::FromServer => Direction::FromClient,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded 20x10 board, row-major in wire order.
///
/// Every stored value is clamped into `0..=MAX_MINO`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grid {
    cells: [[u8; FIELD_WIDTH]; FIELD_HEIGHT],
}

impl Grid {
    pub const fn empty() -> Self {
        Self {
            cells: [[0u8; FIELD_WIDTH]; FIELD_HEIGHT],
        }
    }

    /// Build a grid from raw rows, clamping every cell.
    pub fn from_rows(rows: [[u8; FIELD_WIDTH]; FIELD_HEIGHT]) -> Self {
        let mut grid = Self { cells: rows };
        for row in grid.cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = clamp_mino(*cell);
            }
        }
        grid
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        self.cells.get(y).and_then(|row| row.get(x)).copied()
    }

    /// Set a cell; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, mino: u8) {
        if let Some(cell) = self.cells.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = clamp_mino(mino);
        }
    }

    pub fn rows(&self) -> &[[u8; FIELD_WIDTH]; FIELD_HEIGHT] {
        &self.cells
    }

    pub fn row(&self, y: usize) -> Option<&[u8; FIELD_WIDTH]> {
        self.cells.get(y)
    }

    /// Index of the first row holding at least one block.
    pub fn first_populated_row(&self) -> Option<usize> {
        self.cells
            .iter()
            .position(|row| row.iter().any(|&c| c != 0))
    }

    pub fn is_empty(&self) -> bool {
        self.first_populated_row().is_none()
    }

    pub fn block_count(&self) -> usize {
        self.cells
            .iter()
            .flat_map(|row| row.iter())
            .filter(|&&c| c != 0)
            .count()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid [")?;
        for row in self.cells.iter() {
            write!(f, "  ")?;
            for &c in row.iter() {
                if c == 0 {
                    write!(f, ".")?;
                } else {
                    write!(f, "{}", c)?;
                }
            }
            writeln!(f)?;
        }
        write!(f, "]")
    }
}

/// One decoded board plus the elapsed-time label it was recorded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub grid: Grid,
    pub label: String,
}

impl Frame {
    pub fn new(grid: Grid, label: impl Into<String>) -> Self {
        Self {
            grid,
            label: label.into(),
        }
    }
}

/// Collapse any mino id above [`MAX_MINO`] to garbage.
#[inline]
pub fn clamp_mino(mino: u8) -> u8 {
    if mino > MAX_MINO {
        GARBAGE_MINO
    } else {
        mino
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_valid_ids() {
        for id in 0..=MAX_MINO {
            assert_eq!(clamp_mino(id), id);
        }
        assert_eq!(clamp_mino(9), GARBAGE_MINO);
        assert_eq!(clamp_mino(15), GARBAGE_MINO);
    }

    #[test]
    fn from_rows_clamps_every_cell() {
        let mut rows = [[0u8; FIELD_WIDTH]; FIELD_HEIGHT];
        rows[0][0] = 14;
        rows[19][9] = 3;
        let grid = Grid::from_rows(rows);
        assert_eq!(grid.get(0, 0), Some(8));
        assert_eq!(grid.get(9, 19), Some(3));
        assert_eq!(grid.block_count(), 2);
    }

    #[test]
    fn out_of_range_access_is_none() {
        let mut grid = Grid::empty();
        grid.set(10, 0, 1);
        grid.set(0, 20, 1);
        assert!(grid.is_empty());
        assert_eq!(grid.get(10, 0), None);
        assert_eq!(grid.row(20), None);
    }

    #[test]
    fn direction_reverse() {
        assert_eq!(Direction::FromClient.reverse(), Direction::FromServer);
        assert_eq!(Direction::FromServer.reverse(), Direction::FromClient);
        assert_eq!(Direction::FromServer.to_string(), "server");
    }
}
