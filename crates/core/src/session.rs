//! Session state tracking.
//!
//! A single [`SessionState`] lives for the whole process and is shared by both
//! directions of every bridge. It is a two-state machine:
//!
//! - **Idle**: no game in progress, no frames held.
//! - **Active**: a game is in progress; decoded frames accumulate per player.
//!
//! Every read-modify-write happens under one mutex so a frame can never be
//! appended after a concurrent game end has drained the mapping.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::types::{Frame, Grid};

/// Externally visible phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Active { started: Instant },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    frames: BTreeMap<String, Vec<Frame>>,
}

/// Result of appending one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    /// `MM:SS` since the game started.
    pub label: String,
    /// True when this frame moved the session from Idle to Active.
    pub activated: bool,
    /// Frames now held for this player, including this one.
    pub player_frames: usize,
}

/// Summary of a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub players: usize,
    pub frames: usize,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                frames: BTreeMap::new(),
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.inner.lock().phase {
            Phase::Idle => SessionPhase::Idle,
            Phase::Active { .. } => SessionPhase::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    pub fn started_at(&self) -> Option<Instant> {
        match self.inner.lock().phase {
            Phase::Idle => None,
            Phase::Active { started } => Some(started),
        }
    }

    /// Append a decoded grid for `player`, activating the session if idle.
    pub fn record_frame(&self, player: &str, grid: Grid) -> RecordedFrame {
        self.record_frame_at(player, grid, Instant::now())
    }

    /// Same as [`record_frame`](Self::record_frame) with an explicit clock reading.
    pub fn record_frame_at(&self, player: &str, grid: Grid, now: Instant) -> RecordedFrame {
        let mut inner = self.inner.lock();

        let (started, activated) = match inner.phase {
            Phase::Active { started } => (started, false),
            Phase::Idle => {
                inner.phase = Phase::Active { started: now };
                (now, true)
            }
        };

        let label = format_elapsed(now.saturating_duration_since(started));
        let frames = inner.frames.entry(player.to_string()).or_default();
        frames.push(Frame::new(grid, label.clone()));

        RecordedFrame {
            label,
            activated,
            player_frames: frames.len(),
        }
    }

    /// End the current game.
    ///
    /// While Active: flips to Idle, hands every player's ordered frames to
    /// `export` (players in identifier order), then clears the mapping. All of
    /// this happens under the session lock. While Idle this is a no-op and
    /// returns `None`.
    pub fn end_game<F>(&self, export: F) -> Option<GameSummary>
    where
        F: FnMut(&str, &[Frame]),
    {
        self.end_game_at(Instant::now(), export)
    }

    pub fn end_game_at<F>(&self, now: Instant, mut export: F) -> Option<GameSummary>
    where
        F: FnMut(&str, &[Frame]),
    {
        let mut inner = self.inner.lock();
        let started = match inner.phase {
            Phase::Idle => return None,
            Phase::Active { started } => started,
        };
        inner.phase = Phase::Idle;

        let frames = std::mem::take(&mut inner.frames);
        let mut summary = GameSummary {
            players: 0,
            frames: 0,
            duration: now.saturating_duration_since(started),
        };
        for (player, player_frames) in frames.iter() {
            if player_frames.is_empty() {
                continue;
            }
            export(player, player_frames);
            summary.players += 1;
            summary.frames += player_frames.len();
        }
        Some(summary)
    }

    pub fn frame_count(&self, player: &str) -> usize {
        self.inner
            .lock()
            .frames
            .get(player)
            .map(|f| f.len())
            .unwrap_or(0)
    }

    /// Player ids with at least one frame, in identifier order.
    pub fn players(&self) -> Vec<String> {
        self.inner.lock().frames.keys().cloned().collect()
    }

    /// Copy of one player's frames.
    pub fn frames(&self, player: &str) -> Vec<Frame> {
        self.inner
            .lock()
            .frames
            .get(player)
            .cloned()
            .unwrap_or_default()
    }
}

/// Format an elapsed duration as `MM:SS`; minutes wrap at 60.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", (secs / 60) % 60, secs % 60)
}
