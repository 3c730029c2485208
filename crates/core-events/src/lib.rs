//! Command vocabulary, cancellation signal and per-byte render tags shared by
//! every hexcmp crate.
//!
//! Commands are plain data: the driver translates key presses into a
//! [`Command`] carrying an explicit [`Targets`] set, and `core-model`
//! dispatches it against the two file sessions. Long chunked loops
//! (pattern search, difference skipping, smart scroll) poll a
//! [`CancelSignal`] once per chunk.

use std::sync::atomic::{AtomicU64, Ordering};

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed counters inspected by tests and logged at shutdown by the binary.
// -------------------------------------------------------------------------------------------------
pub static CANCEL_POLLS: AtomicU64 = AtomicU64::new(0);
pub static CANCEL_HITS: AtomicU64 = AtomicU64::new(0);

/// One of the two file panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Top,
    Bottom,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::Top => 0,
            Side::Bottom => 1,
        }
    }
}

/// The sessions a navigation command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targets {
    Top,
    Bottom,
    Both,
}

impl Targets {
    pub fn contains(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Targets::Both, _) | (Targets::Top, Side::Top) | (Targets::Bottom, Side::Bottom)
        )
    }

    pub fn sides(self) -> impl Iterator<Item = Side> {
        [Side::Top, Side::Bottom]
            .into_iter()
            .filter(move |s| self.contains(*s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Apply the direction to a magnitude.
    pub fn signed(self, magnitude: u64) -> i64 {
        let m = i64::try_from(magnitude).unwrap_or(i64::MAX);
        match self {
            Direction::Forward => m,
            Direction::Backward => -m,
        }
    }
}

/// Navigation granularity. `All` means beginning or end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSize {
    Byte,
    Line,
    Page,
    All,
}

/// A parsed goto request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoTarget {
    /// Absolute byte offset.
    Absolute(u64),
    /// Percentage of each file's size (1..=99); 100 and above means end of file.
    Percent(u32),
    /// Offset relative to the current position; remembered for repeat.
    Relative(i64),
}

/// Bytes to look for, as committed by the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub bytes: Vec<u8>,
}

/// One logical action. Each variant carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move {
        size: StepSize,
        direction: Direction,
        targets: Targets,
    },
    /// `term == None` repeats the last search (find next / find previous).
    Find {
        term: Option<SearchTerm>,
        direction: Direction,
        targets: Targets,
    },
    /// Move to the next byte that differs from the byte at the top of the window.
    SeekDifferent {
        direction: Direction,
        targets: Targets,
    },
    Goto {
        target: GotoTarget,
        targets: Targets,
    },
    RepeatJump {
        targets: Targets,
    },
    JumpBack {
        targets: Targets,
    },
    /// Skip forward or backward by a fixed percentage of the file size.
    Skip {
        direction: Direction,
        targets: Targets,
    },
    NextDifference,
    PreviousDifference,
    /// Move `follower` to the other session's offset.
    Sync {
        follower: Side,
    },
    /// Toggle "use only" on a side (the other side is locked in place).
    UseOnly(Side),
    ToggleCaseFold,
    ToggleRaster,
    SmartScroll,
    Quit,
}

impl Command {
    /// True for commands that keep an active search cursor alive.
    pub fn continues_search(&self) -> bool {
        matches!(self, Command::Find { term: None, .. })
    }
}

/// Cooperative cancellation checked once per chunk by long-running loops.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

/// Poll a signal, counting polls and hits.
pub fn poll_cancel(signal: &dyn CancelSignal) -> bool {
    CANCEL_POLLS.fetch_add(1, Ordering::Relaxed);
    let hit = signal.is_cancelled();
    if hit {
        CANCEL_HITS.fetch_add(1, Ordering::Relaxed);
    }
    hit
}

/// Signal that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Fires after a fixed number of polls. Used to cancel mid-loop deterministically.
#[derive(Debug)]
pub struct CancelAfter {
    remaining: AtomicU64,
}

impl CancelAfter {
    pub fn new(polls: u64) -> Self {
        Self {
            remaining: AtomicU64::new(polls),
        }
    }
}

impl CancelSignal for CancelAfter {
    fn is_cancelled(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_err()
    }
}

bitflags::bitflags! {
    /// Per-byte render tags produced for the renderer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ByteTags: u8 {
        const DIFF = 1;
        const SEARCH = 2;
        const EDIT = 4;
        const INSERTED = 8;
        const REPEATED = 16;
    }
}
