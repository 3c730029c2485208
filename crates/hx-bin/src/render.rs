//! Frame composition and terminal output.
//!
//! A frame is built as a list of styled rows first and written afterwards in
//! one pass of queued crossterm commands, so composing can be tested without a
//! terminal.

use std::io::{self, Write};

use core_config::GUTTER_COLUMNS;
use core_diff::DiffCount;
use core_events::{ByteTags, Side};
use core_model::{Context, Layout, LayoutRegion, LockMode};
use core_splice::{Column, EditBuffer};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub reverse: bool,
}

impl Style {
    const PLAIN: Style = Style {
        fg: None,
        bg: None,
        reverse: false,
    };
    const GUTTER: Style = Style {
        fg: Some(Color::DarkCyan),
        bg: None,
        reverse: false,
    };
    const MARK: Style = Style {
        fg: Some(Color::DarkGrey),
        bg: None,
        reverse: false,
    };
    const BAR: Style = Style {
        fg: None,
        bg: None,
        reverse: true,
    };

    fn fg(color: Color) -> Self {
        Style {
            fg: Some(color),
            ..Style::PLAIN
        }
    }

    fn with_reverse(self) -> Self {
        Style {
            reverse: true,
            ..self
        }
    }

    fn for_tags(tags: ByteTags) -> Self {
        if tags.contains(ByteTags::INSERTED) {
            Style::fg(Color::Cyan)
        } else if tags.contains(ByteTags::EDIT) {
            Style::fg(Color::Green)
        } else if tags.contains(ByteTags::SEARCH) {
            Style {
                fg: Some(Color::Black),
                bg: Some(Color::Yellow),
                reverse: false,
            }
        } else if tags.contains(ByteTags::DIFF) {
            Style::fg(Color::Red)
        } else if tags.contains(ByteTags::REPEATED) {
            Style::fg(Color::Magenta)
        } else {
            Style::PLAIN
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

/// Adjacent text with the same style is merged into one span.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpanLine {
    spans: Vec<Span>,
}

impl SpanLine {
    pub fn push(&mut self, text: &str, style: Style) {
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.chars().count()).sum()
    }

    /// Drop everything past `columns` characters.
    fn truncate(&mut self, columns: usize) {
        let mut left = columns;
        self.spans.retain_mut(|span| {
            if left == 0 {
                return false;
            }
            let n = span.text.chars().count();
            if n > left {
                span.text = span.text.chars().take(left).collect();
            }
            left -= n.min(left);
            true
        });
    }
}

pub fn ascii_cell(b: u8) -> char {
    match b {
        0x20..=0x7E => b as char,
        0x09..=0x0D => ' ',
        _ => '.',
    }
}

/// One data row: offset gutter, hex column, ASCII column.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    pub offset: u64,
    pub bytes: &'a [u8],
    pub tags: &'a [ByteTags],
    pub width: usize,
    pub raster: bool,
    /// Edit cursor: byte index in this row, column, and whether it sits on the high nibble.
    pub cursor: Option<(usize, Column, bool)>,
}

pub fn hex_row(row: &Row<'_>) -> SpanLine {
    let mut line = SpanLine::default();
    line.push(&format!("{:09X} ", row.offset), Style::GUTTER);
    for col in 0..row.width {
        let sep = if row.raster && col % 8 == 0 && !row.bytes.is_empty() { "|" } else { " " };
        line.push(sep, if sep == "|" { Style::MARK } else { Style::PLAIN });
        let cursor = match row.cursor {
            Some((c, Column::Hex, high)) if c == col => Some(high),
            _ => None,
        };
        match row.bytes.get(col) {
            Some(&b) => {
                let style = Style::for_tags(row.tags.get(col).copied().unwrap_or_default());
                let digits = format!("{b:02X}");
                let (hi, lo) = digits.split_at(1);
                match cursor {
                    Some(true) => {
                        line.push(hi, style.with_reverse());
                        line.push(lo, style);
                    }
                    Some(false) => {
                        line.push(hi, style);
                        line.push(lo, style.with_reverse());
                    }
                    None => line.push(&digits, style),
                }
            }
            None if cursor.is_some() => line.push("  ", Style::BAR),
            None => line.push("  ", Style::PLAIN),
        }
    }
    line.push("  ", Style::PLAIN);
    for col in 0..row.width {
        let on_cursor = matches!(row.cursor, Some((c, Column::Ascii, _)) if c == col);
        match row.bytes.get(col) {
            Some(&b) => {
                let style = Style::for_tags(row.tags.get(col).copied().unwrap_or_default());
                let style = if on_cursor { style.with_reverse() } else { style };
                line.push(&ascii_cell(b).to_string(), style);
            }
            None if on_cursor => line.push(" ", Style::BAR),
            None => line.push(" ", Style::PLAIN),
        }
    }
    line
}

/// A smart-scroll row: the data row followed by the count of identical lines
/// folded into it. The count stays visible within `columns`, giving up the
/// tail of the ASCII column when the row is too wide.
pub fn compact_row(row: &Row<'_>, repeats: u64, columns: usize) -> SpanLine {
    let mut line = hex_row(row);
    if repeats > 0 {
        let count = format!(" +{repeats}");
        let room = columns.saturating_sub(count.len());
        if line.width() > room {
            line.truncate(room);
        }
        line.push(&count, Style::GUTTER);
    }
    line
}

/// Text shown on the prompt row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptLine {
    Hint,
    Notice(String),
    Input { title: String, text: String, cursor: usize },
    Question(String),
}

/// Active edit, drawn in place of its pane's window.
pub struct EditView<'a> {
    pub side: Side,
    pub buffer: &'a EditBuffer,
}

pub struct Frame {
    rows: Vec<(u16, SpanLine)>,
    width: u16,
}

impl Frame {
    fn new(width: u16) -> Self {
        Self {
            rows: Vec::new(),
            width,
        }
    }

    fn put(&mut self, y: u16, line: SpanLine) {
        self.rows.push((y, line));
    }

    fn put_text(&mut self, y: u16, text: &str, style: Style) {
        let mut line = SpanLine::default();
        let clipped: String = text.chars().take(usize::from(self.width)).collect();
        line.push(&clipped, style);
        self.put(y, line);
    }

    pub fn rows(&self) -> &[(u16, SpanLine)] {
        &self.rows
    }

    pub fn line(&self, y: u16) -> Option<&SpanLine> {
        self.rows.iter().find(|(row, _)| *row == y).map(|(_, l)| l)
    }
}

fn held(ctx: &Context, side: Side) -> bool {
    matches!(
        (ctx.lock(), side),
        (LockMode::TopOnly, Side::Bottom) | (LockMode::BottomOnly, Side::Top)
    )
}

fn status_text(ctx: &Context, side: Side, edit: Option<&EditView<'_>>) -> String {
    let Some(s) = ctx.session(side) else {
        return String::new();
    };
    let mut text = format!(
        " {}   {:#X} of {:#X}  {:>3}%",
        s.path().display(),
        s.offset(),
        s.filesize(),
        s.position_percent()
    );
    if held(ctx, side) {
        text.push_str("   [held]");
    }
    if let Some(e) = edit.filter(|e| e.side == side) {
        let column = match e.buffer.column() {
            Column::Hex => "hex",
            Column::Ascii => "ascii",
        };
        let mode = if e.buffer.insert_mode() { "insert" } else { "overwrite" };
        text.push_str(&format!("   EDIT {column} {mode}"));
        if e.buffer.delta() != 0 {
            text.push_str(&format!(" ({:+} bytes)", e.buffer.delta()));
        }
    }
    text
}

fn hint_text(ctx: &Context) -> String {
    let mut text = String::from(" F find  G goto  N P next/prev  Enter ");
    text.push_str(if ctx.two_files() { "next diff" } else { "smart scroll" });
    text.push_str("  E edit  H help  Q quit ");
    let mut flags = Vec::new();
    if let Some(DiffCount::Different(n)) = ctx.diff_count() {
        flags.push(format!("{n} differ"));
    }
    if ctx.case_fold() {
        flags.push("nocase".to_string());
    }
    if ctx.raster() {
        flags.push("raster".to_string());
    }
    if !flags.is_empty() {
        text.push_str(&format!(" [{}]", flags.join(" ")));
    }
    text
}

fn edit_rows(frame: &mut Frame, data: &LayoutRegion, e: &EditBuffer, width: usize, raster: bool) {
    let rows = usize::from(data.height).max(1);
    let cursor_row = e.cursor() / width;
    let first = cursor_row.saturating_sub(rows - 1);
    let mut tags = vec![ByteTags::empty(); e.len()];
    e.tag_into(&mut tags);
    for r in 0..rows {
        let from = ((first + r) * width).min(e.len());
        let to = (from + width).min(e.len());
        let cursor = (first + r == cursor_row).then(|| (e.cursor() % width, e.column(), e.on_high_nibble()));
        if from == to && cursor.is_none() {
            frame.put_text(data.y + r as u16, "", Style::PLAIN);
            continue;
        }
        let line = hex_row(&Row {
            offset: e.origin() + ((first + r) * width) as u64,
            bytes: &e.bytes()[from..to],
            tags: &tags[from..to],
            width,
            raster,
            cursor,
        });
        frame.put(data.y + r as u16, line);
    }
}

fn window_rows(frame: &mut Frame, ctx: &Context, side: Side, data: &LayoutRegion) {
    let Some(s) = ctx.session(side) else {
        return;
    };
    let width = s.line_width().max(1);
    let tags = ctx.tags(side);
    let window = s.window();
    for r in 0..usize::from(data.height) {
        let y = data.y + r as u16;
        let from = (r * width).min(window.len());
        let to = (from + width).min(window.len());
        if from == to {
            frame.put_text(y, "", Style::PLAIN);
            continue;
        }
        frame.put(
            y,
            hex_row(&Row {
                offset: s.offset() + (r * width) as u64,
                bytes: &window[from..to],
                tags: &tags[from..to],
                width,
                raster: ctx.raster(),
                cursor: None,
            }),
        );
    }
}

fn page_rows(frame: &mut Frame, ctx: &Context, data: &LayoutRegion) -> bool {
    let Some(page) = ctx.page() else {
        return false;
    };
    for r in 0..usize::from(data.height) {
        let y = data.y + r as u16;
        let Some(line) = page.lines().get(r) else {
            frame.put_text(y, "", Style::PLAIN);
            continue;
        };
        let bytes = page.line_bytes(r);
        let tag = if line.repeats > 0 { ByteTags::REPEATED } else { ByteTags::empty() };
        let tags = vec![tag; bytes.len()];
        let row = Row {
            offset: line.offset,
            bytes,
            tags: &tags,
            width: page.line_width,
            raster: ctx.raster(),
            cursor: None,
        };
        frame.put(y, compact_row(&row, line.repeats, usize::from(frame.width)));
    }
    true
}

/// Compose a full frame for the current state.
pub fn compose(
    ctx: &Context,
    layout: &Layout,
    edit: Option<&EditView<'_>>,
    prompt: &PromptLine,
    help: Option<&[&str]>,
) -> Frame {
    let width = layout.prompt().width;
    let mut frame = Frame::new(width);
    if let Some(lines) = help {
        let mut y = 0u16;
        for text in lines {
            frame.put_text(y, text, Style::PLAIN);
            y = y.saturating_add(1);
        }
    } else {
        for side in [Side::Top, Side::Bottom] {
            let Some(pane) = layout.pane(side) else {
                continue;
            };
            frame.put_text(pane.status.y, &status_text(ctx, side, edit), Style::BAR);
            match edit.filter(|e| e.side == side) {
                Some(e) => {
                    let line_width = ctx.session(side).map_or(16, |s| s.line_width().max(1));
                    edit_rows(&mut frame, &pane.data, e.buffer, line_width, ctx.raster());
                }
                None if side == Side::Top && page_rows(&mut frame, ctx, &pane.data) => {}
                None => window_rows(&mut frame, ctx, side, &pane.data),
            }
        }
    }
    let text = match prompt {
        PromptLine::Hint => hint_text(ctx),
        PromptLine::Notice(n) => format!(" {n}"),
        PromptLine::Input { title, text, .. } => format!(" {title}: {text}"),
        PromptLine::Question(q) => format!(" {q}"),
    };
    frame.put_text(layout.prompt().y, &text, Style::PLAIN);
    frame
}

/// Column of the visible text cursor on the prompt row, if any.
pub fn prompt_cursor(prompt: &PromptLine) -> Option<u16> {
    match prompt {
        PromptLine::Input { title, cursor, .. } => {
            u16::try_from(title.len() + 3 + cursor).ok()
        }
        PromptLine::Question(q) => u16::try_from(q.len() + 2).ok(),
        _ => None,
    }
}

fn apply_style<W: Write>(out: &mut W, style: Style) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
    if let Some(fg) = style.fg {
        queue!(out, SetForegroundColor(fg))?;
    }
    if let Some(bg) = style.bg {
        queue!(out, SetBackgroundColor(bg))?;
    }
    if style.reverse {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    Ok(())
}

/// Write a frame: each row is cleared, then its spans printed.
pub fn flush<W: Write>(out: &mut W, frame: &Frame) -> io::Result<()> {
    queue!(out, Clear(ClearType::All))?;
    for (y, line) in frame.rows() {
        queue!(out, MoveTo(0, *y))?;
        for span in line.spans() {
            apply_style(out, span.style)?;
            queue!(out, Print(&span.text))?;
        }
    }
    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
    out.flush()
}

/// Columns a data row occupies for a line width.
pub fn row_columns(width: usize) -> usize {
    usize::from(GUTTER_COLUMNS) + width * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row<'a>(bytes: &'a [u8], tags: &'a [ByteTags], width: usize) -> Row<'a> {
        Row {
            offset: 0x10,
            bytes,
            tags,
            width,
            raster: false,
            cursor: None,
        }
    }

    #[test]
    fn row_text_matches_gutter_width() {
        let bytes = b"AB\x00\n";
        let tags = [ByteTags::empty(); 4];
        let line = hex_row(&row(bytes, &tags, 8));
        let expected = format!("000000010  41 42 00 0A{}AB.{}", " ".repeat(14), " ".repeat(5));
        assert_eq!(line.text(), expected);
        assert_eq!(line.text().len(), row_columns(8));
    }

    #[test]
    fn tags_split_spans() {
        let bytes = [1u8, 2, 3];
        let tags = [ByteTags::empty(), ByteTags::DIFF, ByteTags::empty()];
        let line = hex_row(&row(&bytes, &tags, 3));
        let red: Vec<&str> = line
            .spans()
            .iter()
            .filter(|s| s.style.fg == Some(Color::Red))
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(red, vec!["02", "."]);
    }

    #[test]
    fn raster_marks_every_eighth_byte() {
        let bytes = [0u8; 16];
        let tags = [ByteTags::empty(); 16];
        let mut r = row(&bytes, &tags, 16);
        r.raster = true;
        let text = hex_row(&r).text();
        assert_eq!(text.matches('|').count(), 2);
        assert_eq!(&text[9..11], " |");
    }

    #[test]
    fn cursor_reverses_active_nibble() {
        let bytes = [0xABu8];
        let tags = [ByteTags::empty()];
        let mut r = row(&bytes, &tags, 1);
        r.cursor = Some((0, Column::Hex, false));
        let line = hex_row(&r);
        let reversed: Vec<&str> = line
            .spans()
            .iter()
            .filter(|s| s.style.reverse)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(reversed, vec!["B"]);
    }

    #[test]
    fn compact_row_shows_repeat_count() {
        let bytes = [0u8; 4];
        let tags = [ByteTags::REPEATED; 4];
        let line = compact_row(&row(&bytes, &tags, 4), 49, 80);
        assert_eq!(line.text(), format!("{} +49", hex_row(&row(&bytes, &tags, 4)).text()));
        let count = line.spans().last().unwrap();
        assert_eq!((count.text.as_str(), count.style), (" +49", Style::GUTTER));

        let plain = compact_row(&row(&bytes, &[ByteTags::empty(); 4], 4), 0, 80);
        assert!(!plain.text().contains('+'));
    }

    #[test]
    fn repeat_count_survives_narrow_screen() {
        let bytes = [0x41u8; 8];
        let tags = [ByteTags::REPEATED; 8];
        let columns = row_columns(8);
        let line = compact_row(&row(&bytes, &tags, 8), 1234, columns);
        assert_eq!(line.text().chars().count(), columns);
        assert!(line.text().ends_with("41  AA +1234"), "{}", line.text());
    }

    #[test]
    fn prompt_cursor_follows_title() {
        let p = PromptLine::Input {
            title: "Goto".into(),
            text: "12".into(),
            cursor: 2,
        };
        assert_eq!(prompt_cursor(&p), Some(9));
        assert_eq!(prompt_cursor(&PromptLine::Hint), None);
    }
}
