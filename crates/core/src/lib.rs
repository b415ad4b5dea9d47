//! Core module - snapshot decoding, session tracking and replay export
//!
//! This crate holds everything that understands game state but never touches a
//! socket. It is deterministic and testable on its own:
//!
//! - **Decoding**: turn the client's compressed snapshot blobs into [`Grid`]s
//! - **Tracking**: accumulate per-player frames while a game is in progress
//! - **Export**: encode a finished player's frames as a fumen replay
//!
//! # Module Structure
//!
//! - [`snapshot`]: base64 + zlib snapshot decoder (and a fixture encoder)
//! - [`session`]: the Idle/Active session state machine
//! - [`replay`]: [`ReplayExporter`] and the fumen v115 encoder
//!
//! # Example
//!
//! ```
//! use tf_sniffer_core::{decode_snapshot, encode_snapshot, FumenExporter, ReplayExporter, SessionState};
//! use tf_sniffer_core::types::Grid;
//!
//! let mut grid = Grid::empty();
//! grid.set(4, 0, 5);
//! let blob = encode_snapshot(0, &grid).unwrap();
//!
//! let session = SessionState::new();
//! let snap = decode_snapshot(&blob).unwrap();
//! let rec = session.record_frame("player7", snap.grid);
//! assert!(rec.activated);
//!
//! let mut replays = Vec::new();
//! session.end_game(|player, frames| {
//!     replays.push((player.to_string(), FumenExporter.export(player, frames)));
//! });
//! assert_eq!(replays.len(), 1);
//! assert!(replays[0].1.starts_with("v115@"));
//! assert!(!session.is_active());
//! ```

pub mod replay;
pub mod session;
pub mod snapshot;

pub use tf_sniffer_types as types;

// Re-export commonly used types for convenience
pub use replay::{encode_fumen, FumenExporter, ReplayExporter};
pub use session::{format_elapsed, GameSummary, RecordedFrame, SessionPhase, SessionState};
pub use snapshot::{decode_snapshot, encode_snapshot, DecodeError, Snapshot, SNAPSHOT_MIN_LEN};
pub use types::{Frame, Grid};
