//! In-memory pattern matching with an 8-byte word skip.
//!
//! The matcher picks one anchor byte of the pattern: the byte just before the
//! pattern's trailing run of repeated bytes (or the first byte when the whole
//! pattern is one run). Zero-filled data rarely matches such an anchor, so long
//! runs of padding are crossed a word at a time. For each candidate the data
//! word at the anchor position is XORed against the anchor broadcast to all
//! eight lanes; a zero lane is the next position where the anchor matches, and
//! a word with no zero lane rules out eight candidates at once. Candidates that
//! survive are verified with a word-wise comparison of the whole pattern.

const LOW7: u64 = 0x7F7F_7F7F_7F7F_7F7F;
const LANES: u64 = 0x0101_0101_0101_0101;

/// High bit set in every lane of `x` that is zero. Exact per lane, no carries.
#[inline]
pub fn zero_lanes(x: u64) -> u64 {
    !(((x & LOW7) + LOW7) | x | LOW7)
}

#[inline]
fn load(bytes: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(w)
}

/// Compare two equal-length slices eight bytes at a time.
pub fn words_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut wa = a.chunks_exact(8);
    let mut wb = b.chunks_exact(8);
    for (x, y) in (&mut wa).zip(&mut wb) {
        if load(x) != load(y) {
            return false;
        }
    }
    wa.remainder() == wb.remainder()
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Vec<u8>,
    anchor: usize,
    broadcast: u64,
}

impl Matcher {
    /// Build a matcher. `pattern` must not be empty.
    pub fn new(pattern: &[u8]) -> Self {
        debug_assert!(!pattern.is_empty());
        let last = pattern[pattern.len() - 1];
        let run_start = pattern
            .iter()
            .rposition(|&b| b != last)
            .map_or(0, |p| p + 1);
        let anchor = run_start.saturating_sub(1);
        Self {
            pattern: pattern.to_vec(),
            anchor,
            broadcast: LANES.wrapping_mul(u64::from(pattern[anchor])),
        }
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn anchor(&self) -> usize {
        self.anchor
    }

    /// First match starting at or after `from`.
    pub fn find_forward(&self, hay: &[u8], from: usize) -> Option<usize> {
        let n = self.pattern.len();
        if hay.len() < n {
            return None;
        }
        let last_start = hay.len() - n;
        let a = self.anchor;
        let mut i = from;
        while i <= last_start {
            let j = i + a;
            if j + 8 <= hay.len() {
                let lanes = zero_lanes(load(&hay[j..]) ^ self.broadcast);
                if lanes == 0 {
                    i += 8;
                    continue;
                }
                i += (lanes.trailing_zeros() / 8) as usize;
                if i > last_start {
                    break;
                }
            } else if hay[j] != self.pattern[a] {
                i += 1;
                continue;
            }
            if words_equal(&hay[i..i + n], &self.pattern) {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Last match starting at or before `max_start`.
    pub fn find_backward(&self, hay: &[u8], max_start: usize) -> Option<usize> {
        let n = self.pattern.len();
        if hay.len() < n {
            return None;
        }
        let a = self.anchor;
        let mut i = max_start.min(hay.len() - n);
        loop {
            let j = i + a;
            if j >= 7 {
                let lanes = zero_lanes(load(&hay[j - 7..]) ^ self.broadcast);
                if lanes == 0 {
                    i = i.checked_sub(8)?;
                    continue;
                }
                let lane = 7 - (lanes.leading_zeros() / 8) as usize;
                // Anchor hit at j - 7 + lane, so the candidate moves back by 7 - lane.
                i = i.checked_sub(7 - lane)?;
            } else if hay[j] != self.pattern[a] {
                i = i.checked_sub(1)?;
                continue;
            }
            if words_equal(&hay[i..i + n], &self.pattern) {
                return Some(i);
            }
            i = i.checked_sub(1)?;
        }
    }
}
