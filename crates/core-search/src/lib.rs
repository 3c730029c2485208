//! Pattern search over whole files, forward or backward, in bounded memory.
//!
//! The engine reads fixed-size chunks through a [`FileSession`] and keeps the
//! `len(pattern) - 1` bytes at the chunk edge so matches straddling a boundary
//! are found in the next chunk. Within a chunk, [`scan::Matcher`] filters
//! candidates with an 8-byte word skip.
//!
//! A [`SearchCursor`] carries the state that makes find-next / find-previous
//! repeatable:
//! - `Fresh`: no active search, start from the current viewport.
//! - `ResumeAt(o)`: continue from a previous match at `o`, one byte past it when
//!   the advance flag is set so repeats do not land on the same hit.
//! - `WrappedToStart`: a backward search ran out and parked the view at offset
//!   0; the next forward search starts at 0.
//!
//! Each chunk polls the cancel signal. Cancelling parks the session at the
//! first unscanned offset and leaves the cursor non-advancing there.

pub mod scan;

use core_events::{ByteTags, CancelSignal, Direction, poll_cancel};
use core_session::FileSession;
use scan::Matcher;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("search term is empty")]
    Empty,
    #[error("invalid hex byte `{0}`")]
    InvalidHex(String),
}

/// Parse space-separated hex bytes. Tokens longer than two digits are split
/// into pairs, so `DEADBEEF` and `DE AD BE EF` are the same term.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, PatternError> {
    let mut out = Vec::new();
    for token in input.split_whitespace() {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.len() > 2 && token.len() % 2 == 1 {
            return Err(PatternError::InvalidHex(token.to_string()));
        }
        let digits = token.as_bytes();
        let pairs: Vec<&[u8]> = if digits.len() <= 2 {
            vec![digits]
        } else {
            digits.chunks(2).collect()
        };
        for pair in pairs {
            let text = std::str::from_utf8(pair).map_err(|_| PatternError::InvalidHex(token.to_string()))?;
            let byte = u8::from_str_radix(text, 16)
                .map_err(|_| PatternError::InvalidHex(token.to_string()))?;
            out.push(byte);
        }
    }
    if out.is_empty() {
        return Err(PatternError::Empty);
    }
    Ok(out)
}

/// Text term: the raw bytes of the string.
pub fn parse_text(input: &str) -> Result<Vec<u8>, PatternError> {
    if input.is_empty() {
        return Err(PatternError::Empty);
    }
    Ok(input.as_bytes().to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMarker {
    Fresh,
    ResumeAt(u64),
    WrappedToStart,
}

#[derive(Debug, Clone)]
pub struct SearchCursor {
    pattern: Vec<u8>,
    needle: Vec<u8>,
    case_fold: bool,
    marker: ResumeMarker,
    match_len: usize,
    advance: bool,
    last_match: Option<u64>,
}

impl SearchCursor {
    pub fn new(pattern: Vec<u8>, case_fold: bool) -> Self {
        let needle = fold(&pattern, case_fold);
        Self {
            pattern,
            needle,
            case_fold,
            marker: ResumeMarker::Fresh,
            match_len: 0,
            advance: false,
            last_match: None,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn case_fold(&self) -> bool {
        self.case_fold
    }

    pub fn marker(&self) -> ResumeMarker {
        self.marker
    }

    pub fn advance(&self) -> bool {
        self.advance
    }

    pub fn match_len(&self) -> usize {
        self.match_len
    }

    pub fn last_match(&self) -> Option<u64> {
        self.last_match
    }

    /// Forget position and highlight; the term is kept for a later find-next.
    pub fn reset(&mut self) {
        self.marker = ResumeMarker::Fresh;
        self.advance = false;
        self.match_len = 0;
        self.last_match = None;
    }

    /// Change case folding; the cursor restarts from the viewport.
    pub fn set_case_fold(&mut self, case_fold: bool) {
        self.case_fold = case_fold;
        self.needle = fold(&self.pattern, case_fold);
        self.reset();
    }

    /// Mark the bytes of the last match that fall inside a window starting at
    /// `window_offset`.
    pub fn tag_into(&self, window_offset: u64, tags: &mut [ByteTags]) {
        let Some(start) = self.last_match else {
            return;
        };
        let end = start + self.match_len as u64;
        let win_end = window_offset + tags.len() as u64;
        let from = start.max(window_offset);
        let to = end.min(win_end);
        if from >= to {
            return;
        }
        let lo = (from - window_offset) as usize;
        let hi = (to - window_offset) as usize;
        for tag in &mut tags[lo..hi] {
            tag.insert(ByteTags::SEARCH);
        }
    }
}

fn fold(bytes: &[u8], case_fold: bool) -> Vec<u8> {
    if case_fold {
        bytes.to_ascii_lowercase()
    } else {
        bytes.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(u64),
    NotFound,
    /// Halted by the cancel signal; the search resumes from `at`.
    Cancelled { at: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub forward_chunk: usize,
    pub backward_chunk: usize,
    /// Bytes kept above a hit when repositioning the viewport.
    pub lead_in: u64,
}

pub struct PatternSearchEngine {
    settings: SearchSettings,
    buf: Vec<u8>,
    carry: Vec<u8>,
}

impl PatternSearchEngine {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            buf: Vec::new(),
            carry: Vec::new(),
        }
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    /// Line width changes move the lead-in with it.
    pub fn set_lead_in(&mut self, lead_in: u64) {
        self.settings.lead_in = lead_in;
    }

    /// Search in `direction` using and updating `cursor`.
    pub fn find(
        &mut self,
        session: &mut FileSession,
        cursor: &mut SearchCursor,
        direction: Direction,
        cancel: &dyn CancelSignal,
    ) -> SearchOutcome {
        if cursor.needle.is_empty() {
            return SearchOutcome::NotFound;
        }
        let outcome = match direction {
            Direction::Forward => self.forward(session, cursor, cancel),
            Direction::Backward => self.backward(session, cursor, cancel),
        };
        info!(
            target: "search",
            path = %session.path().display(),
            ?direction,
            ?outcome,
            len = cursor.needle.len(),
            case_fold = cursor.case_fold,
            "search_complete"
        );
        outcome
    }

    fn forward(
        &mut self,
        session: &mut FileSession,
        cursor: &mut SearchCursor,
        cancel: &dyn CancelSignal,
    ) -> SearchOutcome {
        let matcher = Matcher::new(&cursor.needle);
        let n = matcher.len();
        let start = match cursor.marker {
            ResumeMarker::Fresh => session.offset(),
            ResumeMarker::ResumeAt(o) => o + u64::from(cursor.advance),
            ResumeMarker::WrappedToStart => 0,
        };
        let chunk = self.settings.forward_chunk.max(n);
        self.buf.resize(chunk + n - 1, 0);

        let mut pos = start;
        let mut carry = 0usize;
        loop {
            if poll_cancel(cancel) {
                return park(session, cursor, pos - carry as u64);
            }
            let read = session.read_at(pos, &mut self.buf[carry..carry + chunk]);
            if read == 0 {
                break;
            }
            if cursor.case_fold {
                self.buf[carry..carry + read].make_ascii_lowercase();
            }
            let len = carry + read;
            let base = pos - carry as u64;
            if let Some(i) = matcher.find_forward(&self.buf[..len], 0) {
                return self.found(session, cursor, base + i as u64);
            }
            pos += read as u64;
            carry = (n - 1).min(len);
            self.buf.copy_within(len - carry..len, 0);
            if read < chunk {
                break;
            }
        }
        debug!(target: "search", start, "forward_exhausted");
        cursor.reset();
        session.move_to_end();
        SearchOutcome::NotFound
    }

    fn backward(
        &mut self,
        session: &mut FileSession,
        cursor: &mut SearchCursor,
        cancel: &dyn CancelSignal,
    ) -> SearchOutcome {
        let matcher = Matcher::new(&cursor.needle);
        let n = matcher.len();
        let limit = match cursor.marker {
            ResumeMarker::Fresh => Some(session.offset()),
            ResumeMarker::ResumeAt(o) if cursor.advance => o.checked_sub(1),
            ResumeMarker::ResumeAt(o) => Some(o),
            ResumeMarker::WrappedToStart => None,
        };
        let Some(limit) = limit else {
            return wrap_to_start(session, cursor);
        };
        let chunk = self.settings.backward_chunk.max(n);
        self.buf.resize(chunk + n - 1, 0);
        self.carry.clear();

        // Starts at or above `resume` have been checked.
        let mut resume = limit;
        let mut hi = limit.saturating_add(n as u64).min(session.filesize());
        while hi > 0 {
            if poll_cancel(cancel) {
                return park(session, cursor, resume);
            }
            let lo = hi.saturating_sub(chunk as u64);
            let want = (hi - lo) as usize;
            let read = session.read_at(lo, &mut self.buf[..want]);
            if read == 0 {
                break;
            }
            if cursor.case_fold {
                self.buf[..read].make_ascii_lowercase();
            }
            // The carried head of the chunk above only joins a complete read.
            let len = if read == want {
                let carried = self.carry.len();
                self.buf[want..want + carried].copy_from_slice(&self.carry);
                want + carried
            } else {
                read
            };
            if let Some(i) = matcher.find_backward(&self.buf[..len], usize::MAX) {
                return self.found(session, cursor, lo + i as u64);
            }
            self.carry.clear();
            self.carry
                .extend_from_slice(&self.buf[..(n - 1).min(len)]);
            resume = lo;
            hi = lo;
        }
        debug!(target: "search", limit, "backward_exhausted");
        wrap_to_start(session, cursor)
    }

    fn found(
        &mut self,
        session: &mut FileSession,
        cursor: &mut SearchCursor,
        at: u64,
    ) -> SearchOutcome {
        cursor.marker = ResumeMarker::ResumeAt(at);
        cursor.advance = true;
        cursor.match_len = cursor.needle.len();
        cursor.last_match = Some(at);
        session.jump_to(at.saturating_sub(self.settings.lead_in));
        SearchOutcome::Found(at)
    }

    /// Move to the next (or previous) byte differing from the byte at the top of
    /// the window. Backward hits are placed on the last line of the page.
    pub fn seek_different(
        &mut self,
        session: &mut FileSession,
        direction: Direction,
        cancel: &dyn CancelSignal,
    ) -> SearchOutcome {
        let Some(&head) = session.window().first() else {
            return SearchOutcome::NotFound;
        };
        let chunk = self.settings.forward_chunk;
        self.buf.resize(chunk, 0);
        match direction {
            Direction::Forward => {
                let mut pos = session.offset() + 1;
                loop {
                    if poll_cancel(cancel) {
                        session.move_to(pos);
                        return SearchOutcome::Cancelled { at: pos };
                    }
                    let read = session.read_at(pos, &mut self.buf);
                    if read == 0 {
                        break;
                    }
                    if let Some(i) = self.buf[..read].iter().position(|&b| b != head) {
                        let at = pos + i as u64;
                        session.jump_to(at);
                        return SearchOutcome::Found(at);
                    }
                    pos += read as u64;
                }
                session.move_to_end();
            }
            Direction::Backward => {
                let mut hi = session.offset();
                while hi > 0 {
                    if poll_cancel(cancel) {
                        session.move_to(hi);
                        return SearchOutcome::Cancelled { at: hi };
                    }
                    let lo = hi.saturating_sub(chunk as u64);
                    let want = (hi - lo) as usize;
                    let read = session.read_at(lo, &mut self.buf[..want]);
                    if let Some(i) = self.buf[..read].iter().rposition(|&b| b != head) {
                        let at = lo + i as u64;
                        let page = session.page_step();
                        session.jump_to(if at >= page { at - page } else { at });
                        return SearchOutcome::Found(at);
                    }
                    hi = lo;
                }
                session.move_to(0);
            }
        }
        SearchOutcome::NotFound
    }
}

fn park(session: &mut FileSession, cursor: &mut SearchCursor, at: u64) -> SearchOutcome {
    let at = at.min(session.filesize());
    cursor.marker = ResumeMarker::ResumeAt(at);
    cursor.advance = false;
    session.move_to(at);
    debug!(target: "search", at, "search_cancelled");
    SearchOutcome::Cancelled { at }
}

fn wrap_to_start(session: &mut FileSession, cursor: &mut SearchCursor) -> SearchOutcome {
    cursor.reset();
    cursor.marker = ResumeMarker::WrappedToStart;
    session.move_to(0);
    SearchOutcome::NotFound
}
