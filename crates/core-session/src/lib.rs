//! One open file and the byte window currently shown from it.
//!
//! A [`FileSession`] owns the file handle, the navigation state and a window
//! buffer of fixed capacity. The window always mirrors the file at
//! `[offset, offset + valid)`: every move re-reads it completely, and a read
//! shortfall (EOF, I/O error) only shrinks `valid`. No component sees a
//! distinct error type for a short read.
//!
//! Navigation clears no highlighting by itself; diff and search tags that
//! referenced the previous window are recomputed by the caller.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use core_events::{Direction, StepSize};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Largest file accepted at open time (256 TiB).
pub const MAX_FILE_SIZE: u64 = 1 << 48;
/// Percent of the file skipped by a forward skip.
pub const SKIP_FORWARD_PERCENT: u64 = 5;
/// Percent of the file skipped by a backward skip.
pub const SKIP_BACKWARD_PERCENT: u64 = 1;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Unable to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("File is empty: {}", path.display())]
    Empty { path: PathBuf },
    #[error("File is too big: {} ({size} bytes)", path.display())]
    TooLarge { path: PathBuf, size: u64 },
}

pub struct FileSession {
    file: File,
    path: PathBuf,
    filesize: u64,
    offset: u64,
    window: Vec<u8>,
    valid: usize,
    line_width: usize,
    editable: bool,
    writable: bool,
    last_offset: u64,
    repeat_offset: i64,
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("path", &self.path)
            .field("filesize", &self.filesize)
            .field("offset", &self.offset)
            .field("capacity", &self.window.len())
            .field("valid", &self.valid)
            .field("editable", &self.editable)
            .finish()
    }
}

impl FileSession {
    /// Open `path` read-only and load the first window.
    ///
    /// `editable` records whether a read-write open would succeed; the handle
    /// itself is only upgraded when an edit is committed.
    pub fn open(path: &Path, capacity: usize, line_width: usize) -> Result<Self, OpenError> {
        let io_err = |source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        };
        let editable = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .is_ok();
        let file = File::open(path).map_err(io_err)?;
        let filesize = file.metadata().map_err(io_err)?.len();
        if filesize == 0 {
            return Err(OpenError::Empty {
                path: path.to_path_buf(),
            });
        }
        if filesize > MAX_FILE_SIZE {
            return Err(OpenError::TooLarge {
                path: path.to_path_buf(),
                size: filesize,
            });
        }
        let mut session = Self {
            file,
            path: path.to_path_buf(),
            filesize,
            offset: 0,
            window: vec![0; capacity.max(1)],
            valid: 0,
            line_width: line_width.max(1),
            editable,
            writable: false,
            last_offset: 0,
            repeat_offset: 0,
        };
        session.move_to(0);
        debug!(target: "session", path = %path.display(), filesize, editable, "session_open");
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Valid bytes of the current window.
    pub fn window(&self) -> &[u8] {
        &self.window[..self.valid]
    }

    pub fn valid_bytes(&self) -> usize {
        self.valid
    }

    pub fn capacity(&self) -> usize {
        self.window.len()
    }

    pub fn line_width(&self) -> usize {
        self.line_width
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    pub fn repeat_offset(&self) -> i64 {
        self.repeat_offset
    }

    /// True when the window is shorter than capacity (EOF inside or before it).
    pub fn is_short(&self) -> bool {
        self.valid < self.window.len()
    }

    /// Bytes moved by one page step: a page minus one line of overlap.
    pub fn page_step(&self) -> u64 {
        let cap = self.window.len();
        if cap > self.line_width {
            (cap - self.line_width) as u64
        } else {
            cap as u64
        }
    }

    /// Step magnitude for a granularity; `All` has no magnitude.
    pub fn step_amount(&self, size: StepSize) -> Option<u64> {
        match size {
            StepSize::Byte => Some(1),
            StepSize::Line => Some(self.line_width as u64),
            StepSize::Page => Some(self.page_step()),
            StepSize::All => None,
        }
    }

    /// Change window capacity and geometry, then reload at the current offset.
    pub fn resize(&mut self, capacity: usize, line_width: usize) {
        self.window = vec![0; capacity.max(1)];
        self.line_width = line_width.max(1);
        self.refresh();
    }

    /// Move the window to `offset` (clamped to `[0, filesize]`) and reload it.
    pub fn move_to(&mut self, offset: u64) {
        self.offset = offset.min(self.filesize);
        let pos = self.offset;
        let mut window = std::mem::take(&mut self.window);
        self.valid = self.read_at(pos, &mut window);
        self.window = window;
        trace!(target: "session", offset = self.offset, valid = self.valid, "window_loaded");
    }

    /// Reload the window at the current offset.
    pub fn refresh(&mut self) {
        self.move_to(self.offset);
    }

    /// Move so that the last page of the file is shown.
    pub fn move_to_end(&mut self) {
        let end = self.filesize.saturating_sub(self.page_step());
        self.move_to(end);
    }

    /// Move by a signed delta, saturating at both ends.
    pub fn step(&mut self, delta: i64) {
        let target = if delta < 0 {
            self.offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.offset.saturating_add(delta as u64)
        };
        self.move_to(target);
    }

    /// Apply a caller-supplied granularity in a direction.
    pub fn step_by(&mut self, size: StepSize, direction: Direction) {
        match (self.step_amount(size), direction) {
            (Some(amount), dir) => self.step(dir.signed(amount)),
            (None, Direction::Forward) => self.move_to_end(),
            (None, Direction::Backward) => self.move_to(0),
        }
    }

    /// Move and remember where we came from, for [`FileSession::jump_back`].
    pub fn jump_to(&mut self, offset: u64) {
        self.last_offset = self.offset;
        self.move_to(offset);
    }

    /// Return to the offset before the last jump. Repeating toggles between the two.
    pub fn jump_back(&mut self) {
        let back = self.last_offset;
        self.jump_to(back);
    }

    /// Jump relative to the current offset and remember the delta for repeats.
    pub fn jump_relative(&mut self, delta: i64) {
        self.repeat_offset = delta;
        self.last_offset = self.offset;
        self.step(delta);
    }

    /// Apply the last relative jump again. No-op when none was made.
    pub fn repeat_jump(&mut self) {
        if self.repeat_offset != 0 {
            self.jump_relative(self.repeat_offset);
        }
    }

    /// Skip a fixed percentage of the file size.
    pub fn skip_percent(&mut self, direction: Direction) {
        let percent = self.filesize / 100;
        match direction {
            Direction::Forward => self.step(Direction::Forward.signed(percent * SKIP_FORWARD_PERCENT)),
            Direction::Backward => {
                self.step(Direction::Backward.signed(percent * SKIP_BACKWARD_PERCENT))
            }
        }
    }

    /// Align with another session: same offset, or end of file when the other
    /// has nothing left to show.
    pub fn sync_to(&mut self, other: &FileSession) {
        if other.valid_bytes() > 0 {
            self.move_to(other.offset());
        } else {
            self.move_to_end();
        }
    }

    /// Percentage of the file at or before the end of the window, capped at 100.
    pub fn position_percent(&self) -> u8 {
        let end = self.offset.saturating_add(self.window.len() as u64);
        let pct = end.saturating_mul(100) / self.filesize.max(1);
        pct.min(100) as u8
    }

    /// Read as many bytes as possible at `pos` into `buf`.
    ///
    /// Returns the count read; an I/O error ends the read early and is logged, so
    /// callers treat it like EOF.
    pub fn read_at(&self, pos: u64, buf: &mut [u8]) -> usize {
        let mut f = &self.file;
        if let Err(e) = f.seek(SeekFrom::Start(pos)) {
            warn!(target: "session", path = %self.path.display(), pos, error = %e, "seek_failed");
            return 0;
        }
        let mut filled = 0;
        while filled < buf.len() {
            match f.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(target: "session", path = %self.path.display(), pos, filled, error = %e, "read_shortfall");
                    break;
                }
            }
        }
        filled
    }

    /// Reopen the handle read-write. Needed before any write.
    pub fn ensure_writable(&mut self) -> io::Result<()> {
        if self.writable {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.file = file;
        self.writable = true;
        debug!(target: "session", path = %self.path.display(), "session_writable");
        Ok(())
    }

    /// Write all of `data` at `pos`. Requires [`FileSession::ensure_writable`].
    pub fn write_at(&self, pos: u64, data: &[u8]) -> io::Result<()> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(pos))?;
        f.write_all(data)
    }

    /// Truncate or extend the file on disk.
    pub fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    /// Flush file data and metadata to stable storage.
    pub fn sync_all(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Reopen the file after an external change: new handle, new size, fresh window.
    /// The write capability is kept if it was held.
    pub fn reopen(&mut self) -> io::Result<()> {
        let file = if self.writable {
            OpenOptions::new().read(true).write(true).open(&self.path)?
        } else {
            File::open(&self.path)?
        };
        self.filesize = file.metadata()?.len();
        self.file = file;
        self.refresh();
        debug!(target: "session", path = %self.path.display(), filesize = self.filesize, "session_reopened");
        Ok(())
    }
}
