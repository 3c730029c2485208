//! Byte comparison of two sessions' windows and next/previous difference search.
//!
//! [`DifferenceEngine::compute`] fills a [`DiffMap`] flagging every differing
//! byte position of the two windows. Bytes present in only one window count as
//! differing. Walking to the next difference steps both windows a page at a
//! time; when the current windows are identical and full, [`DifferenceEngine::speedup`]
//! compares large chunks directly from both files instead, so gigabytes of
//! identical content are crossed without refilling windows.

use core_events::{ByteTags, CancelSignal, Direction, poll_cancel};
use core_session::FileSession;
use tracing::{debug, trace};

/// Result of comparing two windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffCount {
    Identical,
    Different(usize),
    /// Identical content with both sessions at offset 0; a previous-difference
    /// scan stops here.
    AtStart,
    /// Both windows are empty (both sessions past EOF). The caller keeps
    /// stepping back until content reappears.
    ForceContinue,
}

impl DiffCount {
    /// Signed form: 0 identical, N differing bytes (1 at start), -1 force continue.
    pub fn as_signed(self) -> i64 {
        match self {
            DiffCount::Identical => 0,
            DiffCount::Different(n) => n as i64,
            DiffCount::AtStart => 1,
            DiffCount::ForceContinue => -1,
        }
    }

    /// True when a difference walk should stop here.
    pub fn is_boundary(self) -> bool {
        matches!(self, DiffCount::Different(_) | DiffCount::AtStart)
    }
}

/// Which walk a compute belongs to; only `Previous` applies the start-of-file stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffScan {
    Refresh,
    Next,
    Previous,
}

impl From<Direction> for DiffScan {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Forward => DiffScan::Next,
            Direction::Backward => DiffScan::Previous,
        }
    }
}

/// Outcome of a next/previous difference walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Stopped on a window containing a difference (or at start of file).
    Boundary { steps: u64, skipped: u64 },
    /// Reached the end of both files without a difference.
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DiffMap {
    flags: Vec<bool>,
    count: DiffCount,
}

impl DiffMap {
    fn new() -> Self {
        Self {
            flags: Vec::new(),
            count: DiffCount::Identical,
        }
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    pub fn count(&self) -> DiffCount {
        self.count
    }

    pub fn is_marked(&self, idx: usize) -> bool {
        self.flags.get(idx).copied().unwrap_or(false)
    }

    /// OR the diff flag into a render tag slice.
    pub fn tag_into(&self, tags: &mut [ByteTags]) {
        for (tag, _) in tags.iter_mut().zip(&self.flags).filter(|(_, f)| **f) {
            tag.insert(ByteTags::DIFF);
        }
    }
}

/// Mark differing positions of two windows into `flags` and return the count.
///
/// `flags` must be at least as long as the longer window; positions beyond it
/// are cleared.
pub fn compare_windows(a: &[u8], b: &[u8], flags: &mut [bool]) -> usize {
    flags.fill(false);
    let common = a.len().min(b.len());
    let mut different = 0;
    for (i, (x, y)) in a[..common].iter().zip(&b[..common]).enumerate() {
        if x != y {
            flags[i] = true;
            different += 1;
        }
    }
    let longest = a.len().max(b.len());
    for flag in &mut flags[common..longest] {
        *flag = true;
    }
    different + (longest - common)
}

pub struct DifferenceEngine {
    map: DiffMap,
    speedup_chunk: usize,
    chunk_a: Vec<u8>,
    chunk_b: Vec<u8>,
}

impl DifferenceEngine {
    pub fn new(speedup_chunk: usize) -> Self {
        Self {
            map: DiffMap::new(),
            speedup_chunk: speedup_chunk.max(1),
            chunk_a: Vec::new(),
            chunk_b: Vec::new(),
        }
    }

    pub fn map(&self) -> &DiffMap {
        &self.map
    }

    /// Compare the two windows and update the map.
    pub fn compute(&mut self, a: &FileSession, b: &FileSession, scan: DiffScan) -> DiffCount {
        let size = a.capacity().max(b.capacity());
        if self.map.flags.len() != size {
            self.map.flags.resize(size, false);
        }
        let different = compare_windows(a.window(), b.window(), &mut self.map.flags);
        let count = if a.valid_bytes() == 0 && b.valid_bytes() == 0 {
            DiffCount::ForceContinue
        } else if different > 0 {
            DiffCount::Different(different)
        } else if scan == DiffScan::Previous && a.offset() == 0 && b.offset() == 0 {
            DiffCount::AtStart
        } else {
            DiffCount::Identical
        };
        self.map.count = count;
        trace!(target: "diff", a = a.offset(), b = b.offset(), count = count.as_signed(), "computed");
        count
    }

    /// Skip identical content chunk by chunk, starting just past (forward) or
    /// just before (backward) the current windows. Both sessions end up moved by
    /// the skipped amount with freshly loaded windows. Returns `(skipped, cancelled)`.
    ///
    /// Only meaningful when the current windows are identical and full.
    pub fn speedup(
        &mut self,
        a: &mut FileSession,
        b: &mut FileSession,
        direction: Direction,
        cancel: &dyn CancelSignal,
    ) -> (u64, bool) {
        let chunk = self.speedup_chunk;
        self.chunk_a.resize(chunk, 0);
        self.chunk_b.resize(chunk, 0);
        let chunk_len = chunk as u64;
        let window = a.capacity().max(b.capacity()).max(1);
        let (mut pa, mut pb) = match direction {
            Direction::Forward => (
                a.offset() + a.capacity() as u64,
                b.offset() + b.capacity() as u64,
            ),
            Direction::Backward => (a.offset(), b.offset()),
        };
        let mut skipped = 0u64;
        let mut cancelled = false;
        loop {
            if poll_cancel(cancel) {
                cancelled = true;
                break;
            }
            let (ra, rb) = match direction {
                Direction::Forward => (pa, pb),
                Direction::Backward => {
                    if pa < chunk_len || pb < chunk_len {
                        break;
                    }
                    (pa - chunk_len, pb - chunk_len)
                }
            };
            let na = a.read_at(ra, &mut self.chunk_a);
            let nb = b.read_at(rb, &mut self.chunk_b);
            if na != chunk || nb != chunk || self.chunk_a != self.chunk_b {
                skipped += self.identical_windows(na, nb, window, direction);
                break;
            }
            match direction {
                Direction::Forward => {
                    pa += chunk_len;
                    pb += chunk_len;
                }
                Direction::Backward => {
                    pa -= chunk_len;
                    pb -= chunk_len;
                }
            }
            skipped += chunk_len;
        }
        if skipped > 0 {
            let delta = direction.signed(skipped);
            a.step(delta);
            b.step(delta);
            debug!(target: "diff", skipped, cancelled, a = a.offset(), b = b.offset(), "speedup_skipped");
        }
        (skipped, cancelled)
    }

    /// Bytes of whole identical windows at the leading edge of the chunk pair
    /// that stopped a skip, so the walk resumes on the window holding the
    /// first difference instead of re-reading the chunk.
    fn identical_windows(&self, na: usize, nb: usize, window: usize, direction: Direction) -> u64 {
        let common = na.min(nb);
        let (a, b) = (&self.chunk_a[..common], &self.chunk_b[..common]);
        let run = match direction {
            Direction::Forward => a.iter().zip(b).position(|(x, y)| x != y).unwrap_or(common),
            Direction::Backward => {
                if na != nb || common != self.chunk_a.len() {
                    return 0;
                }
                match a.iter().zip(b).rposition(|(x, y)| x != y) {
                    Some(last) => common - 1 - last,
                    None => common,
                }
            }
        };
        (run / window * window) as u64
    }

    /// Step both sessions a window at a time until their windows differ.
    ///
    /// When both run past EOF the sessions are backed up a page at a time until
    /// content is visible again and the walk reports [`WalkOutcome::Exhausted`].
    pub fn find_next(
        &mut self,
        a: &mut FileSession,
        b: &mut FileSession,
        direction: Direction,
        cancel: &dyn CancelSignal,
    ) -> WalkOutcome {
        let scan = DiffScan::from(direction);
        let step = direction.signed(a.capacity().max(b.capacity()) as u64);
        let mut steps = 0u64;
        let mut skipped = 0u64;
        let mut current = self.compute(a, b, DiffScan::Refresh);
        loop {
            if poll_cancel(cancel) {
                debug!(target: "diff", a = a.offset(), b = b.offset(), "walk_cancelled");
                self.compute(a, b, DiffScan::Refresh);
                return WalkOutcome::Cancelled;
            }
            if current == DiffCount::Identical && !a.is_short() && !b.is_short() {
                let (n, cancelled) = self.speedup(a, b, direction, cancel);
                skipped += n;
                if cancelled {
                    self.compute(a, b, DiffScan::Refresh);
                    return WalkOutcome::Cancelled;
                }
            }
            a.step(step);
            b.step(step);
            steps += 1;
            current = self.compute(a, b, scan);
            match current {
                DiffCount::Different(_) | DiffCount::AtStart => {
                    debug!(target: "diff", a = a.offset(), b = b.offset(), steps, skipped, "difference_found");
                    return WalkOutcome::Boundary { steps, skipped };
                }
                DiffCount::ForceContinue => {
                    self.back_up_to_content(a, b);
                    debug!(target: "diff", a = a.offset(), b = b.offset(), "walk_exhausted");
                    return WalkOutcome::Exhausted;
                }
                DiffCount::Identical => {}
            }
        }
    }

    /// While both windows are empty, move both back a page.
    pub fn back_up_to_content(&mut self, a: &mut FileSession, b: &mut FileSession) {
        while self.compute(a, b, DiffScan::Refresh) == DiffCount::ForceContinue {
            if a.offset() == 0 && b.offset() == 0 {
                break;
            }
            let back_a = -(a.page_step() as i64);
            let back_b = -(b.page_step() as i64);
            a.step(back_a);
            b.step(back_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{CancelAfter, NeverCancel};
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn open(f: &tempfile::NamedTempFile, cap: usize) -> FileSession {
        FileSession::open(f.path(), cap, 16).unwrap()
    }

    #[test]
    fn compare_marks_excess_of_longer_window() {
        let mut flags = vec![false; 8];
        let n = compare_windows(b"abcdef", b"abXd", &mut flags);
        assert_eq!(n, 3);
        assert_eq!(flags, vec![false, false, true, false, true, true, false, false]);
    }

    #[test]
    fn single_byte_difference_in_thousand() {
        let a_bytes = vec![7u8; 1000];
        let mut b_bytes = a_bytes.clone();
        b_bytes[500] = 8;
        let (fa, fb) = (fixture(&a_bytes), fixture(&b_bytes));
        let (sa, sb) = (open(&fa, 1000), open(&fb, 1000));
        let mut engine = DifferenceEngine::new(4096);
        assert_eq!(
            engine.compute(&sa, &sb, DiffScan::Refresh),
            DiffCount::Different(1)
        );
        assert!(engine.map().is_marked(500));
        let marked = engine.map().flags().iter().filter(|f| **f).count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn previous_scan_stops_at_start_of_file() {
        let data = vec![1u8; 256];
        let (fa, fb) = (fixture(&data), fixture(&data));
        let (sa, sb) = (open(&fa, 64), open(&fb, 64));
        let mut engine = DifferenceEngine::new(4096);
        assert_eq!(engine.compute(&sa, &sb, DiffScan::Next), DiffCount::Identical);
        assert_eq!(engine.compute(&sa, &sb, DiffScan::Previous), DiffCount::AtStart);
    }

    #[test]
    fn both_past_eof_forces_continue() {
        let data = vec![1u8; 100];
        let (fa, fb) = (fixture(&data), fixture(&data));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        sa.move_to(100);
        sb.move_to(100);
        let mut engine = DifferenceEngine::new(4096);
        assert_eq!(
            engine.compute(&sa, &sb, DiffScan::Next),
            DiffCount::ForceContinue
        );
        assert_eq!(DiffCount::ForceContinue.as_signed(), -1);
    }

    #[test]
    fn walk_finds_difference_far_ahead_using_speedup() {
        let mut a_bytes = vec![0u8; 200_000];
        a_bytes[150_123] = 0xAA;
        let b_bytes = vec![0u8; 200_000];
        let (fa, fb) = (fixture(&a_bytes), fixture(&b_bytes));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        let mut engine = DifferenceEngine::new(4096);
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Forward, &NeverCancel);
        let WalkOutcome::Boundary { skipped, .. } = outcome else {
            panic!("expected boundary, got {outcome:?}");
        };
        assert!(skipped > 0);
        assert_eq!(sa.offset(), sb.offset());
        let idx = (150_123 - sa.offset()) as usize;
        assert!(engine.map().is_marked(idx));
        assert_eq!(engine.map().count(), DiffCount::Different(1));
    }

    /// Counts polls; never cancels.
    #[derive(Default)]
    struct PollCount(std::cell::Cell<u64>);

    impl CancelSignal for PollCount {
        fn is_cancelled(&self) -> bool {
            self.0.set(self.0.get() + 1);
            false
        }
    }

    const MIB: usize = 1024 * 1024;

    #[test]
    fn skip_lands_on_window_holding_difference_inside_chunk() {
        let a_bytes = vec![0u8; 4 * MIB];
        let mut b_bytes = a_bytes.clone();
        let diff_at = 2 * MIB - 128;
        b_bytes[diff_at] = 1;
        let (fa, fb) = (fixture(&a_bytes), fixture(&b_bytes));
        let (mut sa, mut sb) = (open(&fa, 1024), open(&fb, 1024));
        let mut engine = DifferenceEngine::new(MIB);
        let polls = PollCount::default();
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Forward, &polls);
        assert_eq!(
            outcome,
            WalkOutcome::Boundary {
                steps: 1,
                skipped: (MIB + 1022 * 1024) as u64
            }
        );
        assert!(polls.0.get() < 8, "polls = {}", polls.0.get());
        assert!(sa.offset() <= diff_at as u64 && (diff_at as u64) < sa.offset() + 1024);
        assert_eq!(engine.map().count(), DiffCount::Different(1));
    }

    #[test]
    fn backward_skip_lands_on_window_holding_difference_inside_chunk() {
        let a_bytes = vec![9u8; 4 * MIB];
        let mut b_bytes = a_bytes.clone();
        let diff_at = MIB + 100;
        b_bytes[diff_at] = 0;
        let (fa, fb) = (fixture(&a_bytes), fixture(&b_bytes));
        let (mut sa, mut sb) = (open(&fa, 1024), open(&fb, 1024));
        sa.move_to((4 * MIB - 1024) as u64);
        sb.move_to((4 * MIB - 1024) as u64);
        let mut engine = DifferenceEngine::new(MIB);
        let polls = PollCount::default();
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Backward, &polls);
        assert!(matches!(outcome, WalkOutcome::Boundary { steps: 1, .. }), "{outcome:?}");
        assert!(polls.0.get() < 8, "polls = {}", polls.0.get());
        assert_eq!(sa.offset(), MIB as u64);
    }

    #[test]
    fn walk_backward_finds_difference() {
        let mut a_bytes = vec![5u8; 50_000];
        a_bytes[1_000] = 6;
        let b_bytes = vec![5u8; 50_000];
        let (fa, fb) = (fixture(&a_bytes), fixture(&b_bytes));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        sa.move_to(40_000);
        sb.move_to(40_000);
        let mut engine = DifferenceEngine::new(4096);
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Backward, &NeverCancel);
        assert!(matches!(outcome, WalkOutcome::Boundary { .. }));
        assert!(sa.offset() <= 1_000 && 1_000 < sa.offset() + 64);
    }

    #[test]
    fn identical_files_exhaust_and_back_up_to_content() {
        let data = vec![3u8; 1000];
        let (fa, fb) = (fixture(&data), fixture(&data));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        let mut engine = DifferenceEngine::new(4096);
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Forward, &NeverCancel);
        assert_eq!(outcome, WalkOutcome::Exhausted);
        assert!(sa.valid_bytes() > 0);
        assert!(sb.valid_bytes() > 0);
    }

    #[test]
    fn identical_files_walk_back_to_start() {
        let data = vec![3u8; 1000];
        let (fa, fb) = (fixture(&data), fixture(&data));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        sa.move_to(700);
        sb.move_to(700);
        let mut engine = DifferenceEngine::new(4096);
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Backward, &NeverCancel);
        assert!(matches!(outcome, WalkOutcome::Boundary { .. }));
        assert_eq!((sa.offset(), sb.offset()), (0, 0));
        assert_eq!(engine.map().count(), DiffCount::AtStart);
    }

    #[test]
    fn cancelled_walk_leaves_complete_windows() {
        let data = vec![0u8; 100_000];
        let (fa, fb) = (fixture(&data), fixture(&data));
        let (mut sa, mut sb) = (open(&fa, 64), open(&fb, 64));
        let mut engine = DifferenceEngine::new(4096);
        let outcome = engine.find_next(&mut sa, &mut sb, Direction::Forward, &CancelAfter::new(3));
        assert_eq!(outcome, WalkOutcome::Cancelled);
        assert!(sa.offset() <= sa.filesize());
        assert_eq!(sa.valid_bytes(), 64);
        assert_eq!(sa.offset(), sb.offset());
    }
}
