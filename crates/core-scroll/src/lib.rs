//! Smart scroll: a page with runs of identical lines collapsed.
//!
//! Each line is compared with the last line put on the page. A match only
//! bumps that line's repeat counter; anything else becomes the next displayed
//! line. The file is read in large blocks until the page has a line per row or
//! the file ends, and the offset of the first line that did not fit is kept in
//! [`ScrollState`] so the next press continues from there.

use core_events::{CancelSignal, poll_cancel};
use core_session::FileSession;
use tracing::debug;

/// Where the next compacted page starts. `None` means "the line after the
/// current viewport".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub resume: Option<u64>,
}

impl ScrollState {
    pub fn reset(&mut self) {
        self.resume = None;
    }

    pub fn is_active(&self) -> bool {
        self.resume.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactLine {
    /// File offset of the displayed copy.
    pub offset: u64,
    pub len: usize,
    /// Identical lines suppressed directly after this one.
    pub repeats: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactPage {
    pub start: u64,
    /// Offset just past the last byte accounted for by the page.
    pub end: u64,
    pub line_width: usize,
    data: Vec<u8>,
    lines: Vec<CompactLine>,
}

impl CompactPage {
    pub fn lines(&self) -> &[CompactLine] {
        &self.lines
    }

    pub fn line_bytes(&self, index: usize) -> &[u8] {
        let from = index * self.line_width;
        let len = self.lines.get(index).map_or(0, |l| l.len);
        &self.data[from..from + len]
    }

    /// Bytes covered by the displayed lines and their repeats.
    pub fn consumed(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| (1 + l.repeats) * l.len as u64)
            .sum()
    }

    fn last_line(&self) -> Option<&[u8]> {
        let n = self.lines.len();
        (n > 0).then(|| self.line_bytes(n - 1))
    }

    fn push(&mut self, offset: u64, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        // Keep rows aligned in `data` even after a short final line.
        self.data.resize(self.data.len() + self.line_width - bytes.len(), 0);
        self.lines.push(CompactLine {
            offset,
            len: bytes.len(),
            repeats: 0,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollOutcome {
    Compacted(CompactPage),
    /// Less than a page remained; the session shows a normal page instead.
    Plain,
    Cancelled { at: u64 },
}

pub struct ScrollCompactor {
    block_pages: usize,
    block: Vec<u8>,
}

impl ScrollCompactor {
    pub fn new(block_pages: usize) -> Self {
        Self {
            block_pages: block_pages.max(1),
            block: Vec::new(),
        }
    }

    pub fn next_page(
        &mut self,
        session: &mut FileSession,
        state: &mut ScrollState,
        cancel: &dyn CancelSignal,
    ) -> ScrollOutcome {
        let width = session.line_width();
        let capacity = session.capacity();
        let rows = (capacity / width).max(1);
        let start = state
            .resume
            .unwrap_or_else(|| (session.offset() / width as u64 + 1) * width as u64);

        if session.filesize().saturating_sub(start) < capacity as u64 {
            state.reset();
            let last_page = session.filesize().saturating_sub(session.page_step());
            session.move_to(start.min(last_page));
            debug!(target: "scroll", start, "scroll_plain_page");
            return ScrollOutcome::Plain;
        }

        let block_len = ((self.block_pages * capacity) / width).max(1) * width;
        self.block.resize(block_len, 0);
        let mut page = CompactPage {
            start,
            end: start,
            line_width: width,
            data: Vec::with_capacity(rows * width),
            lines: Vec::with_capacity(rows),
        };

        let mut pos = start;
        let mut next = None;
        'blocks: loop {
            if poll_cancel(cancel) {
                state.reset();
                session.move_to(pos);
                debug!(target: "scroll", at = pos, "scroll_cancelled");
                return ScrollOutcome::Cancelled { at: pos };
            }
            let read = session.read_at(pos, &mut self.block);
            for (i, line) in self.block[..read].chunks(width).enumerate() {
                let offset = pos + (i * width) as u64;
                if page.last_line() == Some(line) {
                    if let Some(last) = page.lines.last_mut() {
                        last.repeats += 1;
                    }
                    continue;
                }
                if page.lines.len() == rows {
                    next = Some(offset);
                    break 'blocks;
                }
                page.push(offset, line);
            }
            pos += read as u64;
            if read < self.block.len() {
                break;
            }
        }

        page.end = next.unwrap_or(pos);
        state.resume = next;
        session.move_to(start);
        debug!(
            target: "scroll",
            start,
            end = page.end,
            lines = page.lines.len(),
            "scroll_page_compacted"
        );
        ScrollOutcome::Compacted(page)
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

    fn line(byte: u8) -> Vec<u8> {
        vec![byte; 16]
    }

    #[test]
    fn runs_collapse_onto_the_line_above() {
        // Viewport at 0, so compaction starts on line 1.
        let mut data = line(b'h');
        data.extend(line(b'a'));
        for _ in 0..50 {
            data.extend(line(0));
        }
        for b in b'b'..=b'z' {
            data.extend(line(b));
        }
        let f = fixture(&data);
        let mut s = FileSession::open(f.path(), 64, 16).unwrap();
        let mut state = ScrollState::default();
        let mut c = ScrollCompactor::new(2);
        let ScrollOutcome::Compacted(page) = c.next_page(&mut s, &mut state, &NeverCancel) else {
            panic!("expected a compacted page");
        };
        assert_eq!(page.start, 16);
        let repeats: Vec<u64> = page.lines().iter().map(|l| l.repeats).collect();
        assert_eq!(repeats, vec![0, 49, 0, 0]);
        assert_eq!(page.line_bytes(1), &line(0)[..]);
        assert_eq!(page.line_bytes(2), &line(b'b')[..]);
        assert_eq!(page.consumed(), page.end - page.start);
        assert_eq!(state.resume, Some(page.end));
        assert_eq!(s.offset(), 16);

        let ScrollOutcome::Compacted(second) = c.next_page(&mut s, &mut state, &NeverCancel) else {
            panic!("expected a compacted page");
        };
        assert_eq!(second.start, page.end);
        assert_eq!(second.line_bytes(0), &line(b'd')[..]);
    }

    #[test]
    fn small_remainder_falls_back_to_plain_page() {
        let f = fixture(&vec![7u8; 100]);
        let mut s = FileSession::open(f.path(), 64, 16).unwrap();
        let mut state = ScrollState {
            resume: Some(80),
        };
        let mut c = ScrollCompactor::new(4);
        assert_eq!(c.next_page(&mut s, &mut state, &NeverCancel), ScrollOutcome::Plain);
        assert!(!state.is_active());
        assert_eq!(s.offset(), 100 - 48);
    }

    #[test]
    fn truncated_final_line_is_its_own_row() {
        let mut data = line(1);
        data.extend(std::iter::repeat_n(0u8, 16 * 10));
        data.extend([0u8; 5]);
        let f = fixture(&data);
        let mut s = FileSession::open(f.path(), 64, 16).unwrap();
        s.move_to(0);
        let mut state = ScrollState {
            resume: Some(0),
        };
        let mut c = ScrollCompactor::new(1);
        let ScrollOutcome::Compacted(page) = c.next_page(&mut s, &mut state, &NeverCancel) else {
            panic!("expected a compacted page");
        };
        let shape: Vec<(usize, u64)> = page.lines().iter().map(|l| (l.len, l.repeats)).collect();
        assert_eq!(shape, vec![(16, 0), (16, 9), (5, 0)]);
        assert_eq!(page.end, data.len() as u64);
        assert_eq!(state.resume, None);
    }

    #[test]
    fn cancel_leaves_full_window_at_scanned_offset() {
        let f = fixture(&vec![0u8; 64 * 1024]);
        let mut s = FileSession::open(f.path(), 64, 16).unwrap();
        let mut state = ScrollState::default();
        let mut c = ScrollCompactor::new(1);
        let out = c.next_page(&mut s, &mut state, &CancelAfter::new(3));
        assert_eq!(out, ScrollOutcome::Cancelled { at: 16 + 3 * 64 });
        assert_eq!(s.offset(), 16 + 3 * 64);
        assert_eq!(s.valid_bytes(), 64);
        assert!(!state.is_active());
    }
}
