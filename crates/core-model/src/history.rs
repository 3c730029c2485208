use std::collections::VecDeque;

/// Entries kept per prompt history.
pub const HISTORY_LIMIT: usize = 2000;

/// Process-lifetime prompt history. Re-entering an existing line moves it to
/// the most recent slot instead of duplicating it.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl History {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|e| e == entry) {
            self.entries.remove(pos);
        }
        self.entries.push_back(entry.to_string());
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `back(0)` is the most recent entry.
    pub fn back(&self, n: usize) -> Option<&str> {
        let idx = self.entries.len().checked_sub(n + 1)?;
        self.entries.get(idx).map(String::as_str)
    }
}
