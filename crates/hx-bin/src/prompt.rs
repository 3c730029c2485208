//! Single-line prompt input with history recall.

use core_model::History;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Characters a prompt accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Printable ASCII.
    Text,
    /// Hex digits and spaces, shown upper case.
    Hex,
    /// Hex digits plus the goto prefixes and suffix.
    Position,
}

impl Charset {
    fn accept(self, c: char) -> Option<char> {
        match self {
            Charset::Text => (' '..='~').contains(&c).then_some(c),
            Charset::Hex => (c.is_ascii_hexdigit() || c == ' ').then(|| c.to_ascii_uppercase()),
            Charset::Position => (c.is_ascii_hexdigit() || matches!(c, 'x' | 'X' | '%' | '+' | '-'))
                .then(|| c.to_ascii_uppercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStep {
    Editing,
    Submit(String),
    Cancel,
}

#[derive(Debug)]
pub struct LineInput<'h> {
    title: &'static str,
    text: Vec<char>,
    cursor: usize,
    max_len: usize,
    charset: Charset,
    history: &'h History,
    /// Index into the history while browsing; `None` is the line being typed.
    browse: Option<usize>,
    draft: Vec<char>,
}

impl<'h> LineInput<'h> {
    pub fn new(title: &'static str, charset: Charset, max_len: usize, history: &'h History) -> Self {
        Self {
            title,
            text: Vec::new(),
            cursor: 0,
            max_len: max_len.max(1),
            charset,
            history,
            browse: None,
            draft: Vec::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn handle(&mut self, key: &KeyEvent) -> PromptStep {
        if key.kind != KeyEventKind::Press {
            return PromptStep::Editing;
        }
        match key.code {
            KeyCode::Esc => return PromptStep::Cancel,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return PromptStep::Cancel;
            }
            KeyCode::Enter => return PromptStep::Submit(self.text()),
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.text.remove(self.cursor);
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.text.len() {
                    self.text.remove(self.cursor);
                }
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.text.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.text.len(),
            KeyCode::Up => self.recall(self.browse.map_or(0, |n| n + 1)),
            KeyCode::Down => match self.browse {
                Some(0) => {
                    self.browse = None;
                    self.text = std::mem::take(&mut self.draft);
                    self.cursor = self.text.len();
                }
                Some(n) => self.recall(n - 1),
                None => {}
            },
            KeyCode::Char(c) => {
                if let Some(c) = self.charset.accept(c)
                    && self.text.len() < self.max_len
                {
                    self.text.insert(self.cursor, c);
                    self.cursor += 1;
                }
            }
            _ => {}
        }
        PromptStep::Editing
    }

    fn recall(&mut self, n: usize) {
        let Some(entry) = self.history.back(n) else {
            return;
        };
        if self.browse.is_none() {
            self.draft = std::mem::take(&mut self.text);
        }
        self.browse = Some(n);
        self.text = entry.chars().collect();
        self.cursor = self.text.len();
    }
}
