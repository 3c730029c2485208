use core_events::ByteTags;
use core_session::FileSession;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("{path} is read-only")]
    NotEditable { path: String },
    #[error("cannot edit past end of file")]
    PastEof,
}

/// Provenance of each byte in the edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteState {
    Unmodified,
    Inserted,
    Overwritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Hex,
    Ascii,
}

/// In-memory copy of one window, edited before anything touches disk.
///
/// The buffer stands in for the file range `[origin, origin + original_len)`;
/// its length may grow or shrink, and a commit splices it back in place of
/// that range.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    origin: u64,
    original_len: usize,
    bytes: Vec<u8>,
    states: Vec<ByteState>,
    line_width: usize,
    cursor: usize,
    high_nibble: bool,
    column: Column,
    insert_mode: bool,
}

impl EditBuffer {
    /// Seed a buffer from the session's current window.
    pub fn begin(session: &FileSession) -> Result<Self, EditError> {
        if !session.is_editable() {
            return Err(EditError::NotEditable {
                path: session.path().display().to_string(),
            });
        }
        if session.valid_bytes() == 0 && session.offset() > 0 {
            return Err(EditError::PastEof);
        }
        let bytes = session.window().to_vec();
        Ok(Self {
            origin: session.offset(),
            original_len: bytes.len(),
            states: vec![ByteState::Unmodified; bytes.len()],
            bytes,
            line_width: session.line_width(),
            cursor: 0,
            high_nibble: true,
            column: Column::Hex,
            insert_mode: false,
        })
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn original_len(&self) -> usize {
        self.original_len
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn states(&self) -> &[ByteState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn on_high_nibble(&self) -> bool {
        self.high_nibble
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    /// Size change a commit would apply to the file.
    pub fn delta(&self) -> i64 {
        self.bytes.len() as i64 - self.original_len as i64
    }

    pub fn is_modified(&self) -> bool {
        self.bytes.len() != self.original_len
            || self.states.iter().any(|s| *s != ByteState::Unmodified)
    }

    /// Cursor may rest one past the last byte, where entry appends.
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.bytes.len());
        self.high_nibble = true;
    }

    pub fn left(&mut self) {
        if !self.high_nibble {
            self.high_nibble = true;
        } else {
            self.set_cursor(self.cursor.saturating_sub(1));
        }
    }

    pub fn right(&mut self) {
        self.set_cursor(self.cursor + 1);
    }

    pub fn up(&mut self) {
        if self.cursor >= self.line_width {
            self.set_cursor(self.cursor - self.line_width);
        }
    }

    pub fn down(&mut self) {
        if self.cursor + self.line_width <= self.bytes.len() {
            self.set_cursor(self.cursor + self.line_width);
        }
    }

    pub fn line_home(&mut self) {
        self.set_cursor(self.cursor - self.cursor % self.line_width);
    }

    pub fn line_end(&mut self) {
        let start = self.cursor - self.cursor % self.line_width;
        let last = (start + self.line_width - 1).min(self.bytes.len().saturating_sub(1));
        self.set_cursor(last.max(start));
    }

    pub fn toggle_column(&mut self) {
        self.column = match self.column {
            Column::Hex => Column::Ascii,
            Column::Ascii => Column::Hex,
        };
        self.high_nibble = true;
    }

    pub fn toggle_insert(&mut self) {
        self.insert_mode = !self.insert_mode;
    }

    /// Enter one hex digit (0..=15) at the cursor nibble. Returns false for an
    /// out-of-range digit.
    pub fn enter_nibble(&mut self, digit: u8) -> bool {
        if digit > 0xF {
            return false;
        }
        if self.high_nibble {
            if self.insert_mode || self.cursor == self.bytes.len() {
                self.insert_at_cursor(digit << 4);
            } else {
                let old = self.bytes[self.cursor];
                self.overwrite(self.cursor, (digit << 4) | (old & 0x0F));
            }
            self.high_nibble = false;
        } else {
            let old = self.bytes[self.cursor];
            self.overwrite(self.cursor, (old & 0xF0) | digit);
            self.right();
        }
        true
    }

    /// Enter a printable ASCII byte. Returns false for anything else.
    pub fn enter_ascii(&mut self, byte: u8) -> bool {
        if !(0x20..=0x7E).contains(&byte) {
            return false;
        }
        self.put_byte(byte);
        true
    }

    /// Copy the byte at the same page position from another window.
    pub fn copy_from(&mut self, other: &[u8]) -> bool {
        match other.get(self.cursor) {
            Some(&b) => {
                self.put_byte(b);
                true
            }
            None => false,
        }
    }

    /// Remove the byte under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.bytes.len() {
            return false;
        }
        self.bytes.remove(self.cursor);
        self.states.remove(self.cursor);
        self.high_nibble = true;
        true
    }

    /// Remove the byte before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.set_cursor(self.cursor - 1);
        self.delete()
    }

    pub fn tag_into(&self, tags: &mut [ByteTags]) {
        for (tag, state) in tags.iter_mut().zip(&self.states) {
            match state {
                ByteState::Unmodified => {}
                ByteState::Overwritten => tag.insert(ByteTags::EDIT),
                ByteState::Inserted => tag.insert(ByteTags::EDIT | ByteTags::INSERTED),
            }
        }
    }

    fn put_byte(&mut self, byte: u8) {
        if self.insert_mode || self.cursor == self.bytes.len() {
            self.insert_at_cursor(byte);
        } else {
            self.overwrite(self.cursor, byte);
        }
        self.right();
    }

    fn insert_at_cursor(&mut self, byte: u8) {
        self.bytes.insert(self.cursor, byte);
        self.states.insert(self.cursor, ByteState::Inserted);
    }

    fn overwrite(&mut self, index: usize, byte: u8) {
        if self.bytes[index] != byte && self.states[index] == ByteState::Unmodified {
            self.states[index] = ByteState::Overwritten;
        }
        self.bytes[index] = byte;
    }
}
