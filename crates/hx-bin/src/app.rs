//! Interactive runtime: the main key loop, prompts and the edit loop.

use std::io::{Write, stdout};

use anyhow::Result;
use core_config::{Config, ConfigContext};
use core_events::{Command, Direction, SearchTerm, Side, Targets};
use core_model::{Context, Flow, History, Layout, parse_goto};
use core_search::{parse_hex, parse_text};
use core_splice::{Column, CommitOutcome, EditBuffer, Progress};
use core_terminal::{PendingInput, TerminalBackend};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use tracing::{debug, error, info, warn};

use crate::keys::{self, Action};
use crate::prompt::{Charset, LineInput, PromptStep};
use crate::render::{self, EditView, PromptLine};

pub const STATUS_ROWS: u16 = 1;
pub const PROMPT_ROWS: u16 = 1;

/// Longest goto string accepted.
const GOTO_LEN: usize = 24;

#[derive(Clone, Copy)]
enum HistoryKind {
    Text,
    Hex,
    Position,
}

pub struct App {
    ctx: Context,
    config: Config,
    layout: Layout,
    prompt: PromptLine,
    size: (u16, u16),
    text_history: History,
    hex_history: History,
    goto_history: History,
}

fn pressed(ev: Event) -> Option<KeyEvent> {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(key),
        _ => None,
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Show `text` on the prompt row without redrawing the rest of the screen.
fn show_on_row(y: u16, text: &str) -> std::io::Result<()> {
    let mut out = stdout().lock();
    queue!(out, MoveTo(0, y), Clear(ClearType::CurrentLine), Print(text))?;
    out.flush()
}

/// Prompt-row updates outside the frame are best effort; a failed one is logged.
fn log_draw_failure(what: &'static str, result: std::io::Result<()>) {
    if let Err(e) = result {
        warn!(target: "runtime", what, error = %e, "row_draw_failed");
    }
}

/// Ask a yes/no question on the prompt row; anything but `y` is no.
fn ask_on_row(y: u16, question: &str) -> std::io::Result<bool> {
    show_on_row(y, &format!(" {question} "))?;
    loop {
        if let Some(key) = pressed(event::read()?) {
            return Ok(matches!(key.code, KeyCode::Char('y' | 'Y')));
        }
    }
}

impl App {
    pub fn new(ctx: Context, config: Config, size: (u16, u16)) -> Self {
        let layout = Layout::from_context(Self::geometry(size, ctx.two_files()));
        Self {
            ctx,
            config,
            layout,
            prompt: PromptLine::Hint,
            size,
            text_history: History::default(),
            hex_history: History::default(),
            goto_history: History::default(),
        }
    }

    fn geometry(size: (u16, u16), two_files: bool) -> ConfigContext {
        ConfigContext::new(size.0, size.1, STATUS_ROWS, PROMPT_ROWS, two_files)
    }

    pub fn run(&mut self, backend: &dyn TerminalBackend) -> Result<()> {
        let _span = tracing::debug_span!(target: "runtime", "event_loop").entered();
        loop {
            self.sync_size(backend)?;
            self.draw(None, None)?;
            let Some(key) = pressed(event::read()?) else {
                continue;
            };
            let Some(action) = keys::translate(&key, self.ctx.two_files()) else {
                continue;
            };
            self.prompt = PromptLine::Hint;
            match action {
                Action::Run(command) => {
                    if self.run_command(command)? == Flow::Quit {
                        info!(target: "runtime", "quit");
                        return Ok(());
                    }
                }
                Action::FindPrompt => self.find_prompt(backend)?,
                Action::GotoPrompt => self.goto_prompt(backend)?,
                Action::Edit => self.edit(backend)?,
                Action::Help => self.help()?,
            }
        }
    }

    /// Re-read the terminal size and re-derive geometry when it changed.
    fn sync_size(&mut self, backend: &dyn TerminalBackend) -> Result<()> {
        let size = backend.size()?;
        if size == self.size {
            return Ok(());
        }
        self.size = size;
        let geometry = Self::geometry(size, self.ctx.two_files());
        self.layout = Layout::from_context(geometry);
        let rebuilt = self.config.recompute_with_context(geometry);
        if let Some(capacity) = rebuilt {
            self.ctx
                .resize(capacity, self.config.effective_line_width, self.config.search_lead_in());
        }
        debug!(
            target: "runtime",
            columns = size.0,
            rows = size.1,
            capacity = self.config.window_capacity,
            rebuilt = rebuilt.is_some(),
            "terminal_resized"
        );
        Ok(())
    }

    fn draw(&self, edit: Option<&EditView<'_>>, help: Option<&[&str]>) -> Result<()> {
        let frame = render::compose(&self.ctx, &self.layout, edit, &self.prompt, help);
        let mut out = stdout().lock();
        render::flush(&mut out, &frame)?;
        match render::prompt_cursor(&self.prompt) {
            Some(x) => queue!(out, MoveTo(x, self.layout.prompt().y), Show)?,
            None => queue!(out, Hide)?,
        }
        out.flush()?;
        Ok(())
    }

    fn run_command(&mut self, command: Command) -> Result<Flow> {
        let busy = match &command {
            Command::Find { .. } => Some("Searching..."),
            Command::SeekDifferent { .. } | Command::NextDifference | Command::PreviousDifference => {
                Some("Scanning...")
            }
            Command::SmartScroll => Some("Scrolling..."),
            _ => None,
        };
        if let Some(text) = busy {
            show_on_row(self.layout.prompt().y, &format!(" {text} press any key to stop"))?;
        }
        let flow = self.ctx.dispatch(command, &PendingInput);
        if let Flow::Notice(text) = &flow {
            self.prompt = PromptLine::Notice(text.clone());
        }
        Ok(flow)
    }

    fn history_mut(&mut self, kind: HistoryKind) -> &mut History {
        match kind {
            HistoryKind::Text => &mut self.text_history,
            HistoryKind::Hex => &mut self.hex_history,
            HistoryKind::Position => &mut self.goto_history,
        }
    }

    /// Read one line on the prompt row. `None` when cancelled or empty.
    fn read_line(
        &mut self,
        backend: &dyn TerminalBackend,
        title: &'static str,
        charset: Charset,
        kind: HistoryKind,
        max_len: usize,
    ) -> Result<Option<String>> {
        let history = std::mem::take(self.history_mut(kind));
        let result = self.read_line_with(backend, title, charset, &history, max_len);
        *self.history_mut(kind) = history;
        let line = result?;
        if let Some(text) = &line {
            self.history_mut(kind).push(text);
        }
        Ok(line)
    }

    fn read_line_with(
        &mut self,
        backend: &dyn TerminalBackend,
        title: &'static str,
        charset: Charset,
        history: &History,
        max_len: usize,
    ) -> Result<Option<String>> {
        let mut input = LineInput::new(title, charset, max_len, history);
        loop {
            self.prompt = PromptLine::Input {
                title: input.title().to_string(),
                text: input.text(),
                cursor: input.cursor(),
            };
            self.draw(None, None)?;
            let ev = event::read()?;
            if let Event::Resize(..) = ev {
                self.sync_size(backend)?;
                continue;
            }
            let Some(key) = pressed(ev) else {
                continue;
            };
            match input.handle(&key) {
                PromptStep::Editing => {}
                PromptStep::Cancel => {
                    self.prompt = PromptLine::Hint;
                    return Ok(None);
                }
                PromptStep::Submit(text) => {
                    self.prompt = PromptLine::Hint;
                    let text = text.trim_end().to_string();
                    return Ok((!text.is_empty()).then_some(text));
                }
            }
        }
    }

    /// Single-key choice on the prompt row.
    fn read_choice(&mut self, question: &str) -> Result<Option<KeyEvent>> {
        self.prompt = PromptLine::Question(question.to_string());
        self.draw(None, None)?;
        self.prompt = PromptLine::Hint;
        loop {
            if let Some(key) = pressed(event::read()?) {
                return Ok((key.code != KeyCode::Esc && !is_interrupt(&key)).then_some(key));
            }
        }
    }

    fn find_prompt(&mut self, backend: &dyn TerminalBackend) -> Result<()> {
        let has_term = self.ctx.search_term().is_some();
        let question = if has_term {
            "Find:  H hex  T text  N next  P previous"
        } else {
            "Find:  H hex  T text"
        };
        let Some(key) = self.read_choice(question)? else {
            return Ok(());
        };
        let choice = match key.code {
            KeyCode::Char(c) => c.to_ascii_uppercase(),
            _ => return Ok(()),
        };
        let (hex, title, charset, kind) = match choice {
            'N' | 'P' if has_term => {
                let direction = if choice == 'N' { Direction::Forward } else { Direction::Backward };
                self.run_command(Command::Find {
                    term: None,
                    direction,
                    targets: Targets::Both,
                })?;
                return Ok(());
            }
            'H' => (true, "Find Hex Bytes", Charset::Hex, HistoryKind::Hex),
            'T' => (false, "Find Text", Charset::Text, HistoryKind::Text),
            _ => return Ok(()),
        };
        let max_len = usize::from(self.size.0.saturating_sub(16)).max(8);
        let Some(line) = self.read_line(backend, title, charset, kind, max_len)? else {
            return Ok(());
        };
        let parsed = if hex { parse_hex(&line) } else { parse_text(&line) };
        match parsed {
            Ok(bytes) => {
                debug!(target: "runtime", hex, len = bytes.len(), "search_term_entered");
                self.run_command(Command::Find {
                    term: Some(SearchTerm { bytes }),
                    direction: Direction::Forward,
                    targets: Targets::Both,
                })?;
            }
            Err(e) => self.prompt = PromptLine::Notice(e.to_string()),
        }
        Ok(())
    }

    fn goto_prompt(&mut self, backend: &dyn TerminalBackend) -> Result<()> {
        let Some(line) = self.read_line(backend, "Goto", Charset::Position, HistoryKind::Position, GOTO_LEN)? else {
            return Ok(());
        };
        match parse_goto(&line) {
            Ok(target) => {
                self.run_command(Command::Goto {
                    target,
                    targets: Targets::Both,
                })?;
            }
            Err(e) => self.prompt = PromptLine::Notice(e.to_string()),
        }
        Ok(())
    }

    fn help(&mut self) -> Result<()> {
        self.prompt = PromptLine::Notice("Press any key".into());
        self.draw(None, Some(keys::HELP))?;
        while pressed(event::read()?).is_none() {}
        self.prompt = PromptLine::Hint;
        Ok(())
    }

    fn edit(&mut self, backend: &dyn TerminalBackend) -> Result<()> {
        let side = self.ctx.edit_side();
        let mut buffer = match self.ctx.begin_edit(side) {
            Ok(b) => b,
            Err(e) => {
                self.prompt = PromptLine::Notice(e.to_string());
                return Ok(());
            }
        };
        let other = self
            .ctx
            .session(side.other())
            .map(|s| s.window().to_vec());
        info!(target: "runtime", ?side, origin = buffer.origin(), "edit_started");
        self.prompt = PromptLine::Notice("Editing: Tab switches column, Ins toggles insert, Esc ends".into());

        loop {
            self.edit_keys(backend, side, &mut buffer, other.as_deref())?;
            if !buffer.is_modified() {
                self.prompt = PromptLine::Hint;
                return Ok(());
            }
            let prompt_y = self.layout.prompt().y;
            if !ask_on_row(prompt_y, "Save changes (Y/N):")? {
                info!(target: "runtime", "edit_discarded");
                self.prompt = PromptLine::Notice("Changes discarded".into());
                return Ok(());
            }
            let mut confirm = |tail: u64| {
                ask_on_row(prompt_y, &format!("This moves {tail} bytes of the file. Continue (Y/N):"))
                    .unwrap_or_else(|e| {
                        log_draw_failure("shift_confirm", Err(e));
                        false
                    })
            };
            let mut progress = |p: Progress| {
                log_draw_failure(
                    "splice_progress",
                    show_on_row(
                        prompt_y,
                        &format!(" Writing {:>3}%  about {}s left", p.percent(), p.remaining.as_secs()),
                    ),
                );
            };
            match self.ctx.commit_edit(side, &buffer, &mut confirm, &mut progress) {
                Ok(CommitOutcome::Written { delta, filesize }) => {
                    self.prompt = PromptLine::Notice(format!("Saved: {delta:+} bytes, file is now {filesize} bytes"));
                    return Ok(());
                }
                Ok(CommitOutcome::Declined) => {
                    self.prompt = PromptLine::Notice("Not saved".into());
                    return Ok(());
                }
                Ok(CommitOutcome::Unchanged) => {
                    self.prompt = PromptLine::Hint;
                    return Ok(());
                }
                Err(e) => {
                    error!(target: "runtime", error = %e, "edit_commit_failed");
                    self.prompt = PromptLine::Notice(format!("{e}; edit kept"));
                }
            }
        }
    }

    /// Drive the edit buffer until Esc.
    fn edit_keys(
        &mut self,
        backend: &dyn TerminalBackend,
        side: Side,
        buffer: &mut EditBuffer,
        other: Option<&[u8]>,
    ) -> Result<()> {
        loop {
            self.draw(Some(&EditView { side, buffer: &*buffer }), None)?;
            let ev = event::read()?;
            if let Event::Resize(..) = ev {
                self.sync_size(backend)?;
                continue;
            }
            let Some(key) = pressed(ev) else {
                continue;
            };
            if key.code == KeyCode::Esc || is_interrupt(&key) {
                return Ok(());
            }
            apply_edit_key(buffer, &key, other);
        }
    }
}

/// Apply one key to the edit buffer. Returns false when the key did nothing.
pub fn apply_edit_key(buffer: &mut EditBuffer, key: &KeyEvent, other: Option<&[u8]>) -> bool {
    match key.code {
        KeyCode::Tab => buffer.toggle_column(),
        KeyCode::Insert => buffer.toggle_insert(),
        KeyCode::Left => buffer.left(),
        KeyCode::Right => buffer.right(),
        KeyCode::Up => buffer.up(),
        KeyCode::Down => buffer.down(),
        KeyCode::Home => buffer.line_home(),
        KeyCode::End => buffer.line_end(),
        KeyCode::Delete => return buffer.delete(),
        KeyCode::Backspace => return buffer.backspace(),
        KeyCode::Enter => return other.is_some_and(|o| buffer.copy_from(o)),
        KeyCode::Char(c) => {
            return match buffer.column() {
                Column::Hex => c
                    .to_digit(16)
                    .is_some_and(|d| buffer.enter_nibble(d as u8)),
                Column::Ascii => u8::try_from(c).is_ok_and(|b| buffer.enter_ascii(b)),
            };
        }
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::{Engines, open_sessions};
    use core_session::FileSession;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;
    use std::sync::{Arc, Mutex};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn buffer_over(bytes: &[u8]) -> (tempfile::NamedTempFile, EditBuffer) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        let s = FileSession::open(f.path(), 32, 8).unwrap();
        let b = EditBuffer::begin(&s).unwrap();
        (f, b)
    }

    #[test]
    fn hex_keys_edit_nibbles() {
        let (_f, mut b) = buffer_over(b"\x00\x00\x00");
        for c in ['a', 'B', 'z', '7'] {
            apply_edit_key(&mut b, &key(KeyCode::Char(c)), None);
        }
        assert_eq!(b.bytes(), &[0xAB, 0x70, 0x00]);
        assert!(!b.on_high_nibble());
    }

    #[test]
    fn ascii_column_insert_and_copy() {
        let (_f, mut b) = buffer_over(b"abc");
        apply_edit_key(&mut b, &key(KeyCode::Tab), None);
        apply_edit_key(&mut b, &key(KeyCode::Insert), None);
        apply_edit_key(&mut b, &key(KeyCode::Char('X')), None);
        assert_eq!(b.bytes(), b"Xabc");
        assert!(apply_edit_key(&mut b, &key(KeyCode::Enter), Some(b"0123")));
        assert_eq!(b.bytes(), b"X1abc");
        assert!(!apply_edit_key(&mut b, &key(KeyCode::Enter), None));
        apply_edit_key(&mut b, &key(KeyCode::Backspace), None);
        assert_eq!(b.bytes(), b"Xabc");
        assert_eq!(b.delta(), 1);
    }

    struct FixedSize(std::cell::Cell<(u16, u16)>);

    impl TerminalBackend for FixedSize {
        fn enter(&mut self) -> Result<()> {
            Ok(())
        }
        fn leave(&mut self) -> Result<()> {
            Ok(())
        }
        fn set_title(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn size(&self) -> Result<(u16, u16)> {
            Ok(self.0.get())
        }
    }

    #[test]
    fn resize_rebuilds_windows_when_geometry_changes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[7u8; 4096]).unwrap();
        f.flush().unwrap();
        let start = (80, 24);
        let mut config = Config::default();
        config.apply_context(App::geometry(start, false));
        let (top, bottom) = open_sessions(&config, f.path(), None).unwrap();
        let ctx = Context::new(top, bottom, Engines::from_config(&config));
        let mut app = App::new(ctx, config, start);
        let top = |app: &App| {
            let s = app.ctx.session(Side::Top).unwrap();
            (s.capacity(), s.line_width())
        };
        assert_eq!(top(&app), (22 * 16, 16));

        let backend = FixedSize(std::cell::Cell::new((80, 12)));
        app.sync_size(&backend).unwrap();
        assert_eq!(top(&app), (10 * 16, 16));

        // Same capacity, narrower lines.
        backend.0.set((40, 22));
        app.sync_size(&backend).unwrap();
        assert_eq!(top(&app), (20 * 8, 8));
    }

    #[test]
    fn failed_row_draw_is_logged() {
        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            log_draw_failure("splice_progress", Ok(()));
            log_draw_failure(
                "splice_progress",
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "terminal gone")),
            );
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out.matches("row_draw_failed").count(), 1);
        assert!(out.contains("WARN runtime:"), "{out}");
        assert!(out.contains("terminal gone"));
    }
}
