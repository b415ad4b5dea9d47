//! Diagnostic sink.
//!
//! Anything the dispatcher cannot act on (unknown commands, unknown markup,
//! parse failures, dropped frames) plus a few informational events is handed
//! to a [`DiagnosticSink`] together with the direction it came from. The sink
//! never feeds anything back into dispatch.

use std::fmt;

use parking_lot::Mutex;

use crate::types::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `%xt%<command>%...%` with a command no rule knows about.
    UnknownCommand { fields: Vec<String> },
    /// Delimited packet whose first field is not `xt`.
    UnknownPacket { raw: String },
    /// `<msg t="sys">` body with an unrecognized action.
    UnknownSysAction { action: String, dump: Vec<String> },
    /// Markup root that no rule handles.
    UnknownTag { tag: String, dump: Vec<String> },
    /// Packet abandoned because it could not be parsed.
    ParseFailure { error: String, prefix: String },
    /// Snapshot whose blob failed to decode; only that frame is lost.
    FrameDropped { player: String, error: String },
    /// Server greeting with population counters.
    UserCount { online: String, games: String },
    /// Replay exported for one player at game end.
    Replay {
        player: String,
        frames: usize,
        replay: String,
    },
}

impl Diagnostic {
    /// Short machine-friendly kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::UnknownCommand { .. } => "unknown_command",
            Diagnostic::UnknownPacket { .. } => "unknown_packet",
            Diagnostic::UnknownSysAction { .. } => "unknown_sys_action",
            Diagnostic::UnknownTag { .. } => "unknown_tag",
            Diagnostic::ParseFailure { .. } => "parse_failure",
            Diagnostic::FrameDropped { .. } => "frame_dropped",
            Diagnostic::UserCount { .. } => "user_count",
            Diagnostic::Replay { .. } => "replay",
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self,
            Diagnostic::ParseFailure { .. } | Diagnostic::FrameDropped { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownCommand { fields } => write!(f, "[{}]", fields.join(", ")),
            Diagnostic::UnknownPacket { raw } => write!(f, "unknown % packet {}", raw),
            Diagnostic::UnknownSysAction { action, dump } => {
                write!(f, "unknown sys action {}", action)?;
                for line in dump {
                    write!(f, "\n{}", line)?;
                }
                Ok(())
            }
            Diagnostic::UnknownTag { tag, dump } => {
                write!(f, "unknown tag <{}>", tag)?;
                for line in dump {
                    write!(f, "\n{}", line)?;
                }
                Ok(())
            }
            Diagnostic::ParseFailure { error, prefix } => {
                write!(f, "parse failure: {} (packet: {:?})", error, prefix)
            }
            Diagnostic::FrameDropped { player, error } => {
                write!(f, "dropped snapshot for player {}: {}", player, error)
            }
            Diagnostic::UserCount { online, games } => write!(
                f,
                "Logged in successfully. {} online, {} games played.",
                online, games
            ),
            Diagnostic::Replay {
                player,
                frames,
                replay,
            } => write!(f, "replay for player {} ({} frames): {}", player, frames, replay),
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, origin: Direction, diagnostic: Diagnostic);
}

/// Renders diagnostics through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, origin: Direction, diagnostic: Diagnostic) {
        if diagnostic.is_failure() {
            tracing::warn!(origin = %origin, kind = diagnostic.kind(), "{}", diagnostic);
        } else {
            tracing::info!(origin = %origin, kind = diagnostic.kind(), "{}", diagnostic);
        }
    }
}

/// Keeps every diagnostic in memory. Handy for tests and for embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Direction, Diagnostic)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Direction, Diagnostic)> {
        self.entries.lock().clone()
    }

    pub fn take(&self) -> Vec<(Direction, Diagnostic)> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, origin: Direction, diagnostic: Diagnostic) {
        self.entries.lock().push((origin, diagnostic));
    }
}
