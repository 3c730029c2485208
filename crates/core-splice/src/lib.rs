//! In-place editing, including edits that grow or shrink the file.
//!
//! An [`EditBuffer`] holds the edited copy of one window. Committing it
//! replaces the original window range on disk. When the length changed, the
//! file tail after the window is shifted with one reusable chunk buffer:
//!
//! - shrinking moves the tail toward the start, front to back, each read
//!   strictly ahead of the previous write;
//! - growing moves it away from the start, back to front from EOF, each write
//!   landing in a region already read.
//!
//! Large shifts ask for confirmation first; declining writes nothing. A failed
//! write ends the commit where it stands, with no rollback.

mod buffer;
mod progress;

pub use buffer::{ByteState, Column, EditBuffer, EditError};
pub use progress::{Progress, ProgressPacer, ProgressSink};

use std::io;
use std::path::PathBuf;

use core_session::FileSession;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("cannot open {} for writing: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write failed at offset {pos}: {source}")]
    Write {
        pos: u64,
        #[source]
        source: io::Error,
    },
    #[error("short read at offset {pos}: wanted {wanted} bytes, got {got}")]
    ShortRead { pos: u64, wanted: usize, got: usize },
    #[error("sync failed: {0}")]
    Sync(#[source] io::Error),
    #[error("reopen failed: {0}")]
    Reopen(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was changed; no write happened.
    Unchanged,
    /// The shift confirmation was declined; no write happened.
    Declined,
    Written { delta: i64, filesize: u64 },
}

/// Asked before shifting more than the configured threshold.
pub trait Confirm {
    fn confirm_shift(&mut self, tail_bytes: u64) -> bool;
}

impl<F: FnMut(u64) -> bool> Confirm for F {
    fn confirm_shift(&mut self, tail_bytes: u64) -> bool {
        self(tail_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceSettings {
    pub chunk_size: usize,
    pub confirm_threshold: u64,
    pub progress_resolution: u32,
}

pub struct SpliceEditor {
    settings: SpliceSettings,
    chunk: Vec<u8>,
}

impl SpliceEditor {
    pub fn new(settings: SpliceSettings) -> Self {
        Self {
            settings,
            chunk: Vec::new(),
        }
    }

    pub fn settings(&self) -> SpliceSettings {
        self.settings
    }

    /// Write `edit` back to `session`'s file, shifting the tail if the length
    /// changed. On success the session is reopened and shows the edited window.
    pub fn commit(
        &mut self,
        session: &mut FileSession,
        edit: &EditBuffer,
        confirm: &mut dyn Confirm,
        sink: &mut dyn ProgressSink,
    ) -> Result<CommitOutcome, SpliceError> {
        if !edit.is_modified() {
            return Ok(CommitOutcome::Unchanged);
        }
        let delta = edit.delta();
        let filesize = session.filesize();
        let tail_start = (edit.origin() + edit.original_len() as u64).min(filesize);
        let tail_len = filesize - tail_start;

        if delta != 0 && tail_len > self.settings.confirm_threshold && !confirm.confirm_shift(tail_len) {
            info!(target: "splice", tail_len, delta, "splice_declined");
            return Ok(CommitOutcome::Declined);
        }

        session
            .ensure_writable()
            .map_err(|source| SpliceError::NotWritable {
                path: session.path().to_path_buf(),
                source,
            })?;

        if delta == 0 {
            write(session, edit.origin(), edit.bytes())?;
        } else if delta < 0 {
            write(session, edit.origin(), edit.bytes())?;
            self.shift_toward_start(session, tail_start, delta.unsigned_abs(), sink)?;
            let new_len = filesize - delta.unsigned_abs();
            session
                .set_len(new_len)
                .map_err(|source| SpliceError::Write {
                    pos: new_len,
                    source,
                })?;
        } else {
            self.shift_toward_end(session, tail_start, delta as u64, sink)?;
            write(session, edit.origin(), edit.bytes())?;
        }

        session.sync_all().map_err(SpliceError::Sync)?;
        session.reopen().map_err(SpliceError::Reopen)?;
        session.move_to(edit.origin());
        info!(
            target: "splice",
            path = %session.path().display(),
            origin = edit.origin(),
            delta,
            tail_len,
            filesize = session.filesize(),
            "splice_committed"
        );
        Ok(CommitOutcome::Written {
            delta,
            filesize: session.filesize(),
        })
    }

    fn shift_toward_start(
        &mut self,
        session: &FileSession,
        tail_start: u64,
        by: u64,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), SpliceError> {
        let end = session.filesize();
        let mut pacer = self.pacer(end - tail_start);
        let mut src = tail_start;
        while src < end {
            let n = self.load(session, src, end - src)?;
            write(session, src - by, &self.chunk[..n])?;
            src += n as u64;
            if let Some(p) = pacer.chunk_done() {
                sink.progress(p);
            }
        }
        Ok(())
    }

    fn shift_toward_end(
        &mut self,
        session: &FileSession,
        tail_start: u64,
        by: u64,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), SpliceError> {
        let mut end = session.filesize();
        let mut pacer = self.pacer(end - tail_start);
        while end > tail_start {
            let want = (end - tail_start).min(self.settings.chunk_size.max(1) as u64);
            let src = end - want;
            let n = self.load(session, src, want)?;
            write(session, src + by, &self.chunk[..n])?;
            end = src;
            if let Some(p) = pacer.chunk_done() {
                sink.progress(p);
            }
        }
        Ok(())
    }

    fn pacer(&self, tail_len: u64) -> ProgressPacer {
        let chunks = tail_len.div_ceil(self.settings.chunk_size.max(1) as u64);
        ProgressPacer::new(chunks, self.settings.progress_resolution)
    }

    /// Fill the chunk buffer from `pos`, at most `limit` bytes. Anything short
    /// of that is an error: the shift would otherwise lose data.
    fn load(&mut self, session: &FileSession, pos: u64, limit: u64) -> Result<usize, SpliceError> {
        let size = self.settings.chunk_size.max(1);
        self.chunk.resize(size, 0);
        let wanted = limit.min(size as u64) as usize;
        let got = session.read_at(pos, &mut self.chunk[..wanted]);
        if got < wanted {
            error!(target: "splice", pos, wanted, got, "splice_short_read");
            return Err(SpliceError::ShortRead { pos, wanted, got });
        }
        Ok(got)
    }
}

fn write(session: &FileSession, pos: u64, data: &[u8]) -> Result<(), SpliceError> {
    session.write_at(pos, data).map_err(|source| {
        error!(target: "splice", pos, len = data.len(), error = %source, "splice_write_failed");
        SpliceError::Write { pos, source }
    })
}
