//! Replay export.
//!
//! [`ReplayExporter`] turns one player's ordered frames into a shareable string.
//! The default [`FumenExporter`] writes fumen v115 data, the format understood by
//! the common Tetris diagram editors.
//!
//! # Fumen v115 layout
//!
//! - The field is 24 rows x 10 columns: 23 playfield rows plus one garbage row
//!   below the floor. Our 20-row grid occupies the bottom 20 playfield rows.
//! - Each page stores the per-cell difference to the previous page's field
//!   (`cur - prev + 8`), run-length encoded as `diff * 240 + (run - 1)` in two
//!   base-64 digits. A page whose field is unchanged is folded into a repeat
//!   counter stored after the previous unchanged field.
//! - Each page then stores a 3-digit action (piece, rotation, position, flags)
//!   and, when it differs from the previous page, an escaped comment.
//! - Base-64 digits are little-endian.

use crate::types::{Frame, Grid, FIELD_HEIGHT, FIELD_WIDTH};

/// Produces an external replay string for one player's game.
pub trait ReplayExporter: Send + Sync {
    fn export(&self, player: &str, frames: &[Frame]) -> String;
}

/// Fumen v115 encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FumenExporter;

impl ReplayExporter for FumenExporter {
    fn export(&self, _player: &str, frames: &[Frame]) -> String {
        encode_fumen(frames)
    }
}

const ENCODE_TABLE: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const COMMENT_TABLE: &[u8] =
    b" !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

const COMMENT_RADIX: u32 = COMMENT_TABLE.len() as u32 + 1;
const MAX_COMMENT_LEN: usize = 4095;

/// Playfield rows (excluding the garbage row).
const FIELD_TOP: usize = 23;
const FIELD_ROWS: usize = FIELD_TOP + 1;
const FIELD_BLOCKS: u32 = (FIELD_ROWS * FIELD_WIDTH) as u32;

/// Digit value where a repeat counter saturates.
const MAX_DIGIT: u8 = 63;

const VERSION_PREFIX: &str = "v115@";

/// Field indexed top-down: row 0 is the top playfield row, row 22 the floor
/// row and row 23 the garbage row.
type Field = [[u8; FIELD_WIDTH]; FIELD_ROWS];

#[derive(Debug, Default)]
struct Digits(Vec<u8>);

impl Digits {
    fn push(&mut self, mut value: u32, count: usize) {
        for _ in 0..count {
            self.0.push((value % 64) as u8);
            value /= 64;
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Encode frames as a fumen v115 string. An empty slice encodes one blank page.
pub fn encode_fumen(frames: &[Frame]) -> String {
    let mut out = Digits::default();
    let mut prev: Field = [[0u8; FIELD_WIDTH]; FIELD_ROWS];
    let mut prev_comment = String::new();
    let mut repeat_at: Option<usize> = None;

    let blank = Frame::new(Grid::empty(), "");
    let pages: &[Frame] = if frames.is_empty() {
        std::slice::from_ref(&blank)
    } else {
        frames
    };

    for (index, frame) in pages.iter().enumerate() {
        let current = field_from_grid(&frame.grid);

        let (changed, field_digits) = encode_field(&prev, &current);
        if changed {
            out.0.extend_from_slice(&field_digits.0);
            repeat_at = None;
        } else {
            match repeat_at {
                Some(at) if out.0[at] < MAX_DIGIT => out.0[at] += 1,
                _ => {
                    out.0.extend_from_slice(&field_digits.0);
                    out.push(0, 1);
                    repeat_at = Some(out.len() - 1);
                }
            }
        }

        let comment_changed = frame.label != prev_comment;
        let action = Action {
            colorize: index == 0,
            comment: comment_changed,
            lock: true,
        };
        out.push(action.value(), 3);

        if comment_changed {
            push_comment(&mut out, &frame.label);
            prev_comment = frame.label.clone();
        }

        prev = current;
        if action.lock {
            clear_full_rows(&mut prev);
        }
    }

    let body: String = out.0.iter().map(|&d| ENCODE_TABLE[d as usize] as char).collect();
    let mut result = String::with_capacity(VERSION_PREFIX.len() + body.len() + body.len() / 47 + 1);
    result.push_str(VERSION_PREFIX);
    result.push_str(&split_for_display(&body));
    result
}

/// Empty-piece action. Only the flag bits vary for snapshot pages.
#[derive(Debug, Clone, Copy)]
struct Action {
    colorize: bool,
    comment: bool,
    lock: bool,
}

impl Action {
    fn value(&self) -> u32 {
        // Piece, rotation and location are all zero for an empty piece.
        // Flag bits: rise=1, mirror=2, colour=4, comment=8, unlocked=16.
        let flags = u32::from(self.colorize) * 4
            + u32::from(self.comment) * 8
            + u32::from(!self.lock) * 16;
        flags * 8 * 4 * FIELD_BLOCKS
    }
}

fn field_from_grid(grid: &Grid) -> Field {
    let mut field: Field = [[0u8; FIELD_WIDTH]; FIELD_ROWS];
    // Grid row 0 is the well floor in the client's coordinate system.
    for (y, row) in grid.rows().iter().enumerate().take(FIELD_HEIGHT) {
        field[FIELD_TOP - 1 - y] = *row;
    }
    field
}

fn encode_field(prev: &Field, current: &Field) -> (bool, Digits) {
    let mut digits = Digits::default();
    let diff_at = |x: usize, y: usize| u32::from(current[y][x]) + 8 - u32::from(prev[y][x]);

    let mut changed = false;
    let mut run_diff = diff_at(0, 0);
    let mut run_len: u32 = 0;
    for y in 0..FIELD_ROWS {
        for x in 0..FIELD_WIDTH {
            let diff = diff_at(x, y);
            if diff != 8 {
                changed = true;
            }
            if diff == run_diff {
                run_len += 1;
            } else {
                digits.push(run_diff * FIELD_BLOCKS + (run_len - 1), 2);
                run_diff = diff;
                run_len = 1;
            }
        }
    }
    digits.push(run_diff * FIELD_BLOCKS + (run_len - 1), 2);

    (changed, digits)
}

fn push_comment(out: &mut Digits, comment: &str) {
    let escaped = escape_comment(comment);
    let bytes = &escaped.as_bytes()[..escaped.len().min(MAX_COMMENT_LEN)];
    out.push(bytes.len() as u32, 2);

    for chunk in bytes.chunks(4) {
        let mut value = 0u32;
        let mut scale = 1u32;
        for &b in chunk {
            let code = COMMENT_TABLE.iter().position(|&c| c == b).unwrap_or(0) as u32;
            value += code * scale;
            scale *= COMMENT_RADIX;
        }
        out.push(value, 5);
    }
}

/// Percent-escape a comment the way the fumen editors expect.
fn escape_comment(comment: &str) -> String {
    let mut out = String::with_capacity(comment.len());
    for ch in comment.chars() {
        let code = ch as u32;
        if ch.is_ascii_alphanumeric() || "@*_+-./".contains(ch) {
            out.push(ch);
        } else if code < 0x100 {
            out.push_str(&format!("%{:02X}", code));
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                out.push_str(&format!("%u{:04X}", unit));
            }
        }
    }
    out
}

/// Drop full playfield rows and shift the rows above down.
fn clear_full_rows(field: &mut Field) {
    let kept: Vec<[u8; FIELD_WIDTH]> = field[..FIELD_TOP]
        .iter()
        .filter(|row| row.iter().any(|&c| c == 0))
        .copied()
        .collect();
    let cleared = FIELD_TOP - kept.len();
    if cleared == 0 {
        return;
    }
    for row in field[..cleared].iter_mut() {
        *row = [0u8; FIELD_WIDTH];
    }
    field[cleared..FIELD_TOP].copy_from_slice(&kept);
}

fn split_for_display(body: &str) -> String {
    if body.len() < 41 {
        return body.to_string();
    }
    let (head, tail) = body.split_at(42.min(body.len()));
    let mut out = String::from(head);
    for chunk in tail.as_bytes().chunks(47) {
        out.push('?');
        // Chunks come from an ASCII-only alphabet.
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}
