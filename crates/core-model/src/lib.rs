//! Command layer: the two file sessions, their engines, and dispatch.
//!
//! A [`Context`] owns everything a command may touch: the top session, the
//! optional bottom session, the lock mode, the case-fold and raster toggles,
//! the per-side search cursors and the smart-scroll state. [`Context::dispatch`]
//! runs one [`Command`] to completion (or until the cancel signal fires) and
//! then recomputes the difference map, so tags are never stale when the
//! driver renders.
//!
//! State reset rules applied before each command:
//! * anything but a repeated find drops both search cursors (the term is kept);
//! * anything but smart scroll drops the compacted page and its resume point.

mod goto;
mod history;
mod layout;

pub use goto::{GotoError, parse_goto};
pub use history::{HISTORY_LIMIT, History};
pub use layout::{Layout, LayoutRegion, PaneRegions};

use std::path::Path;

use core_config::Config;
use core_diff::{DiffCount, DiffScan, DifferenceEngine, WalkOutcome};
use core_events::{ByteTags, CancelSignal, Command, Direction, GotoTarget, Side, Targets};
use core_scroll::{CompactPage, ScrollCompactor, ScrollOutcome, ScrollState};
use core_search::{PatternSearchEngine, SearchCursor, SearchOutcome, SearchSettings};
use core_session::{FileSession, OpenError};
use core_splice::{
    CommitOutcome, Confirm, EditBuffer, EditError, ProgressSink, SpliceEditor, SpliceError,
    SpliceSettings,
};
use tracing::{debug, info};

/// Which sessions follow "both" navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Neither,
    /// Only the top session moves; the bottom stays put.
    TopOnly,
    /// Only the bottom session moves; the top stays put.
    BottomOnly,
}

/// What the driver should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Notice(String),
    Quit,
}

pub struct Engines {
    pub diff: DifferenceEngine,
    pub search: PatternSearchEngine,
    pub scroll: ScrollCompactor,
    pub splice: SpliceEditor,
}

impl Engines {
    pub fn from_config(config: &Config) -> Self {
        let f = &config.file;
        Self {
            diff: DifferenceEngine::new(f.diff.speedup_chunk),
            search: PatternSearchEngine::new(SearchSettings {
                forward_chunk: f.search.forward_chunk,
                backward_chunk: f.search.backward_chunk,
                lead_in: config.search_lead_in(),
            }),
            scroll: ScrollCompactor::new(f.scroll.block_pages),
            splice: SpliceEditor::new(SpliceSettings {
                chunk_size: f.splice.chunk_size,
                confirm_threshold: f.splice.confirm_threshold,
                progress_resolution: f.splice.progress_resolution,
            }),
        }
    }
}

/// Open one or two files with the configured window geometry.
pub fn open_sessions(
    config: &Config,
    top: &Path,
    bottom: Option<&Path>,
) -> Result<(FileSession, Option<FileSession>), OpenError> {
    let capacity = config.window_capacity;
    let width = config.effective_line_width;
    let top = FileSession::open(top, capacity, width)?;
    let bottom = bottom
        .map(|p| FileSession::open(p, capacity, width))
        .transpose()?;
    Ok((top, bottom))
}

pub struct Context {
    top: FileSession,
    bottom: Option<FileSession>,
    engines: Engines,
    lock: LockMode,
    case_fold: bool,
    raster: bool,
    search_term: Option<Vec<u8>>,
    cursors: [Option<SearchCursor>; 2],
    scroll: ScrollState,
    page: Option<CompactPage>,
}

impl Context {
    pub fn new(top: FileSession, bottom: Option<FileSession>, engines: Engines) -> Self {
        let mut ctx = Self {
            top,
            bottom,
            engines,
            lock: LockMode::Neither,
            case_fold: false,
            raster: false,
            search_term: None,
            cursors: [None, None],
            scroll: ScrollState::default(),
            page: None,
        };
        ctx.refresh_diff();
        ctx
    }

    pub fn session(&self, side: Side) -> Option<&FileSession> {
        match side {
            Side::Top => Some(&self.top),
            Side::Bottom => self.bottom.as_ref(),
        }
    }

    fn session_mut(&mut self, side: Side) -> Option<&mut FileSession> {
        match side {
            Side::Top => Some(&mut self.top),
            Side::Bottom => self.bottom.as_mut(),
        }
    }

    pub fn two_files(&self) -> bool {
        self.bottom.is_some()
    }

    pub fn lock(&self) -> LockMode {
        self.lock
    }

    pub fn case_fold(&self) -> bool {
        self.case_fold
    }

    pub fn raster(&self) -> bool {
        self.raster
    }

    pub fn search_term(&self) -> Option<&[u8]> {
        self.search_term.as_deref()
    }

    pub fn cursor(&self, side: Side) -> Option<&SearchCursor> {
        self.cursors[side.index()].as_ref()
    }

    /// Compacted smart-scroll page replacing the top window, if one is active.
    pub fn page(&self) -> Option<&CompactPage> {
        self.page.as_ref()
    }

    pub fn diff_count(&self) -> Option<DiffCount> {
        self.bottom.as_ref().map(|_| self.engines.diff.map().count())
    }

    /// Session edited by the edit command: the bottom one when only it moves.
    pub fn edit_side(&self) -> Side {
        if self.lock == LockMode::BottomOnly && self.bottom.is_some() {
            Side::Bottom
        } else {
            Side::Top
        }
    }

    /// Narrow a target set by the lock mode and the sessions that exist.
    fn effective(&self, targets: Targets) -> Vec<Side> {
        let targets = match (targets, self.lock) {
            (Targets::Both, LockMode::TopOnly) => Targets::Top,
            (Targets::Both, LockMode::BottomOnly) => Targets::Bottom,
            (t, _) => t,
        };
        targets
            .sides()
            .filter(|s| self.session(*s).is_some())
            .collect()
    }

    /// Apply new window geometry to every session.
    pub fn resize(&mut self, capacity: usize, line_width: usize, lead_in: u64) {
        self.top.resize(capacity, line_width);
        if let Some(b) = self.bottom.as_mut() {
            b.resize(capacity, line_width);
        }
        self.engines.search.set_lead_in(lead_in);
        self.page = None;
        self.scroll.reset();
        self.refresh_diff();
        debug!(target: "model", capacity, line_width, "context_resized");
    }

    pub fn dispatch(&mut self, command: Command, cancel: &dyn CancelSignal) -> Flow {
        if !command.continues_search() {
            self.cursors = [None, None];
        }
        if command != Command::SmartScroll {
            self.scroll.reset();
            self.page = None;
        }
        debug!(target: "model", ?command, "dispatch");

        let flow = match command {
            Command::Move {
                size,
                direction,
                targets,
            } => {
                for side in self.effective(targets) {
                    if let Some(s) = self.session_mut(side) {
                        s.step_by(size, direction);
                    }
                }
                Flow::Continue
            }
            Command::Find {
                term,
                direction,
                targets,
            } => self.find(term.map(|t| t.bytes), direction, targets, cancel),
            Command::SeekDifferent { direction, targets } => {
                let mut flow = Flow::Continue;
                for side in self.effective(targets) {
                    let Some(s) = side_session(&mut self.top, &mut self.bottom, side) else {
                        continue;
                    };
                    if let SearchOutcome::Cancelled { .. } =
                        self.engines.search.seek_different(s, direction, cancel)
                    {
                        flow = Flow::Notice("Interrupted".into());
                        break;
                    }
                }
                flow
            }
            Command::Goto { target, targets } => {
                for side in self.effective(targets) {
                    if let Some(s) = self.session_mut(side) {
                        goto(s, target);
                    }
                }
                Flow::Continue
            }
            Command::RepeatJump { targets } => {
                for side in self.effective(targets) {
                    if let Some(s) = self.session_mut(side) {
                        s.repeat_jump();
                    }
                }
                Flow::Continue
            }
            Command::JumpBack { targets } => {
                for side in self.effective(targets) {
                    if let Some(s) = self.session_mut(side) {
                        s.jump_back();
                    }
                }
                Flow::Continue
            }
            Command::Skip { direction, targets } => {
                for side in self.effective(targets) {
                    if let Some(s) = self.session_mut(side) {
                        s.skip_percent(direction);
                    }
                }
                Flow::Continue
            }
            Command::NextDifference => self.walk_differences(Direction::Forward, cancel),
            Command::PreviousDifference => self.walk_differences(Direction::Backward, cancel),
            Command::Sync { follower } => {
                if let Some(bottom) = self.bottom.as_mut() {
                    match follower {
                        Side::Top => self.top.sync_to(bottom),
                        Side::Bottom => bottom.sync_to(&self.top),
                    }
                }
                Flow::Continue
            }
            Command::UseOnly(side) => {
                if self.bottom.is_some() {
                    let (only, toggled_off) = match side {
                        Side::Top => (LockMode::TopOnly, self.lock == LockMode::TopOnly),
                        Side::Bottom => (LockMode::BottomOnly, self.lock == LockMode::BottomOnly),
                    };
                    self.lock = if toggled_off { LockMode::Neither } else { only };
                    info!(target: "model", lock = ?self.lock, "lock_changed");
                }
                Flow::Continue
            }
            Command::ToggleCaseFold => {
                self.case_fold = !self.case_fold;
                Flow::Notice(if self.case_fold {
                    "Case-insensitive search".into()
                } else {
                    "Case-sensitive search".into()
                })
            }
            Command::ToggleRaster => {
                self.raster = !self.raster;
                Flow::Continue
            }
            Command::SmartScroll => {
                match self
                    .engines
                    .scroll
                    .next_page(&mut self.top, &mut self.scroll, cancel)
                {
                    ScrollOutcome::Compacted(page) => {
                        self.page = Some(page);
                        Flow::Continue
                    }
                    ScrollOutcome::Plain => {
                        self.page = None;
                        Flow::Continue
                    }
                    ScrollOutcome::Cancelled { .. } => {
                        self.page = None;
                        Flow::Notice("Interrupted".into())
                    }
                }
            }
            Command::Quit => return Flow::Quit,
        };
        self.refresh_diff();
        flow
    }

    fn find(
        &mut self,
        term: Option<Vec<u8>>,
        direction: Direction,
        targets: Targets,
        cancel: &dyn CancelSignal,
    ) -> Flow {
        if let Some(bytes) = term {
            self.search_term = Some(bytes);
            self.cursors = [None, None];
        }
        let Some(pattern) = self.search_term.clone() else {
            return Flow::Notice("No previous search".into());
        };
        let mut found = false;
        for side in self.effective(targets) {
            let case_fold = self.case_fold;
            let cursor = self.cursors[side.index()]
                .get_or_insert_with(|| SearchCursor::new(pattern.clone(), case_fold));
            let Some(s) = side_session(&mut self.top, &mut self.bottom, side) else {
                continue;
            };
            match self.engines.search.find(s, cursor, direction, cancel) {
                SearchOutcome::Found(_) => found = true,
                SearchOutcome::NotFound => {}
                SearchOutcome::Cancelled { .. } => return Flow::Notice("Search interrupted".into()),
            }
        }
        if found {
            Flow::Continue
        } else {
            Flow::Notice("Not found".into())
        }
    }

    fn walk_differences(&mut self, direction: Direction, cancel: &dyn CancelSignal) -> Flow {
        let Some(bottom) = self.bottom.as_mut() else {
            return Flow::Notice("Only one file".into());
        };
        self.lock = LockMode::Neither;
        match self
            .engines
            .diff
            .find_next(&mut self.top, bottom, direction, cancel)
        {
            WalkOutcome::Boundary { .. } => Flow::Continue,
            WalkOutcome::Exhausted => Flow::Notice("No more differences".into()),
            WalkOutcome::Cancelled => Flow::Notice("Interrupted".into()),
        }
    }

    /// Recompute the diff map; both sessions past EOF back up until visible.
    fn refresh_diff(&mut self) {
        let Some(bottom) = self.bottom.as_mut() else {
            return;
        };
        if self.engines.diff.compute(&self.top, bottom, DiffScan::Refresh) == DiffCount::ForceContinue {
            self.engines.diff.back_up_to_content(&mut self.top, bottom);
        }
    }

    /// Render tags for one session's window.
    pub fn tags(&self, side: Side) -> Vec<ByteTags> {
        let Some(s) = self.session(side) else {
            return Vec::new();
        };
        let mut tags = vec![ByteTags::empty(); s.capacity()];
        if self.bottom.is_some() {
            self.engines.diff.map().tag_into(&mut tags);
        }
        if let Some(c) = self.cursor(side) {
            c.tag_into(s.offset(), &mut tags);
        }
        tags
    }

    /// Start editing `side`; a missing bottom session falls back to the top.
    pub fn begin_edit(&mut self, side: Side) -> Result<EditBuffer, EditError> {
        self.page = None;
        self.scroll.reset();
        EditBuffer::begin(self.session(side).unwrap_or(&self.top))
    }

    pub fn commit_edit(
        &mut self,
        side: Side,
        edit: &EditBuffer,
        confirm: &mut dyn Confirm,
        sink: &mut dyn ProgressSink,
    ) -> Result<CommitOutcome, SpliceError> {
        let s = match side {
            Side::Bottom if self.bottom.is_some() => self.bottom.as_mut(),
            _ => Some(&mut self.top),
        };
        let outcome = match s {
            Some(s) => self.engines.splice.commit(s, edit, confirm, sink)?,
            None => CommitOutcome::Unchanged,
        };
        self.refresh_diff();
        Ok(outcome)
    }
}

fn side_session<'a>(
    top: &'a mut FileSession,
    bottom: &'a mut Option<FileSession>,
    side: Side,
) -> Option<&'a mut FileSession> {
    match side {
        Side::Top => Some(top),
        Side::Bottom => bottom.as_mut(),
    }
}

fn goto(session: &mut FileSession, target: GotoTarget) {
    match target {
        GotoTarget::Absolute(offset) => session.jump_to(offset),
        GotoTarget::Percent(p) if p >= 100 => {
            let end = session.filesize().saturating_sub(session.page_step());
            session.jump_to(end);
        }
        GotoTarget::Percent(p) => session.jump_to(session.filesize() / 100 * u64::from(p)),
        GotoTarget::Relative(delta) => session.jump_relative(delta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{NeverCancel, SearchTerm, StepSize};
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn config() -> Config {
        let mut c = Config::default();
        c.window_capacity = 64;
        c.effective_line_width = 16;
        c.file.search.forward_chunk = 4096;
        c.file.search.backward_chunk = 4096;
        c.file.diff.speedup_chunk = 4096;
        c
    }

    fn pair(a: &[u8], b: &[u8]) -> (tempfile::NamedTempFile, tempfile::NamedTempFile, Context) {
        let (fa, fb) = (fixture(a), fixture(b));
        let cfg = config();
        let (top, bottom) = open_sessions(&cfg, fa.path(), Some(fb.path())).unwrap();
        let ctx = Context::new(top, bottom, Engines::from_config(&cfg));
        (fa, fb, ctx)
    }

    fn move_both(size: StepSize, direction: Direction) -> Command {
        Command::Move {
            size,
            direction,
            targets: Targets::Both,
        }
    }

    #[test]
    fn single_differing_byte_is_counted() {
        let a = vec![0u8; 1000];
        let mut b = a.clone();
        b[500] = 1;
        let (_fa, _fb, mut ctx) = pair(&a, &b);
        assert_eq!(ctx.dispatch(Command::NextDifference, &NeverCancel), Flow::Continue);
        let top = ctx.session(Side::Top).unwrap();
        assert!(top.offset() <= 500 && 500 < top.offset() + 64);
        assert_eq!(ctx.diff_count(), Some(DiffCount::Different(1)));
        let tags = ctx.tags(Side::Top);
        let marked: Vec<usize> = (0..tags.len()).filter(|&i| tags[i].contains(ByteTags::DIFF)).collect();
        assert_eq!(marked, vec![(500 - top.offset()) as usize]);
    }

    #[test]
    fn lock_restricts_both_targets() {
        let data = vec![7u8; 4096];
        let (_fa, _fb, mut ctx) = pair(&data, &data);
        ctx.dispatch(Command::UseOnly(Side::Top), &NeverCancel);
        ctx.dispatch(move_both(StepSize::Line, Direction::Forward), &NeverCancel);
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 16);
        assert_eq!(ctx.session(Side::Bottom).unwrap().offset(), 0);
        // A difference walk clears the lock.
        ctx.dispatch(Command::NextDifference, &NeverCancel);
        assert_eq!(ctx.lock(), LockMode::Neither);
        ctx.dispatch(Command::UseOnly(Side::Bottom), &NeverCancel);
        ctx.dispatch(Command::UseOnly(Side::Bottom), &NeverCancel);
        assert_eq!(ctx.lock(), LockMode::Neither);
    }

    #[test]
    fn navigation_resets_search_but_keeps_term() {
        let data = b"..AB....AB....AB..".repeat(4);
        let (_fa, _fb, mut ctx) = pair(&data, &data);
        let find = |term: Option<&[u8]>| Command::Find {
            term: term.map(|t| SearchTerm {
                bytes: t.to_vec(),
            }),
            direction: Direction::Forward,
            targets: Targets::Top,
        };
        ctx.dispatch(find(Some(b"AB")), &NeverCancel);
        assert_eq!(ctx.cursor(Side::Top).and_then(|c| c.last_match()), Some(2));
        ctx.dispatch(find(None), &NeverCancel);
        assert_eq!(ctx.cursor(Side::Top).and_then(|c| c.last_match()), Some(8));
        ctx.dispatch(Command::ToggleRaster, &NeverCancel);
        assert!(ctx.cursor(Side::Top).is_none());
        assert_eq!(ctx.search_term(), Some(&b"AB"[..]));
        // The lead-in left the viewport at 0, so a fresh cursor finds the first hit again.
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 0);
        ctx.dispatch(find(None), &NeverCancel);
        assert_eq!(ctx.cursor(Side::Top).and_then(|c| c.last_match()), Some(2));
    }

    #[test]
    fn find_without_term_is_a_notice() {
        let (_fa, _fb, mut ctx) = pair(b"abc", b"abc");
        let flow = ctx.dispatch(
            Command::Find {
                term: None,
                direction: Direction::Forward,
                targets: Targets::Both,
            },
            &NeverCancel,
        );
        assert_eq!(flow, Flow::Notice("No previous search".into()));
    }

    #[test]
    fn goto_forms_move_each_file() {
        let (_fa, _fb, mut ctx) = pair(&[1u8; 1000], &[1u8; 2000]);
        let goto = |target| Command::Goto {
            target,
            targets: Targets::Both,
        };
        ctx.dispatch(goto(GotoTarget::Percent(50)), &NeverCancel);
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 500);
        assert_eq!(ctx.session(Side::Bottom).unwrap().offset(), 1000);
        ctx.dispatch(goto(GotoTarget::Relative(-100)), &NeverCancel);
        ctx.dispatch(Command::RepeatJump { targets: Targets::Both }, &NeverCancel);
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 300);
        ctx.dispatch(Command::JumpBack { targets: Targets::Top }, &NeverCancel);
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 400);
        ctx.dispatch(goto(GotoTarget::Percent(100)), &NeverCancel);
        assert_eq!(ctx.session(Side::Top).unwrap().offset(), 1000 - 48);
    }

    #[test]
    fn both_past_eof_backs_up_to_content() {
        let (_fa, _fb, mut ctx) = pair(&[1u8; 300], &[2u8; 300]);
        ctx.dispatch(
            Command::Goto {
                target: GotoTarget::Absolute(10_000),
                targets: Targets::Both,
            },
            &NeverCancel,
        );
        let top = ctx.session(Side::Top).unwrap();
        assert!(top.valid_bytes() > 0);
        assert!(matches!(ctx.diff_count(), Some(DiffCount::Different(_))));
    }

    #[test]
    fn edit_commit_refreshes_session_and_diff() {
        let (fa, _fb, mut ctx) = pair(b"hello world", b"hello world");
        let mut edit = ctx.begin_edit(Side::Top).unwrap();
        edit.toggle_column();
        edit.enter_ascii(b'J');
        let out = ctx
            .commit_edit(Side::Top, &edit, &mut |_: u64| true, &mut |_: core_splice::Progress| {})
            .unwrap();
        assert_eq!(out, CommitOutcome::Written { delta: 0, filesize: 11 });
        assert_eq!(std::fs::read(fa.path()).unwrap(), b"Jello world");
        assert_eq!(ctx.diff_count(), Some(DiffCount::Different(1)));
    }
}
