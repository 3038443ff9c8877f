//! Type-ahead search.
//!
//! Printable keys accumulate into a buffer; the view schedules a flush
//! timeout that clears the buffer after a pause, so a fresh prefix starts
//! a fresh search. Matching is a case-insensitive prefix test against one
//! configured model column, walking only the rows the user can currently
//! see (collapsed subtrees are skipped), wrapping around once.

use std::time::Duration;

use crate::model::TreeModel;
use crate::view::rbtree::{LevelId, RowId, RowTree};

/// Idle time after which the search buffer is discarded.
pub const SEARCH_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Incremental search state.
pub struct TypeaheadSearch {
    enabled: bool,
    /// Model column searched; `None` disables matching entirely.
    column: Option<usize>,
    buffer: String,
}

impl Default for TypeaheadSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeaheadSearch {
    pub fn new() -> Self {
        Self {
            enabled: true,
            column: Some(0),
            buffer: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.buffer.clear();
        }
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Set the searched model column; `None` turns matching off.
    pub fn set_column(&mut self, column: Option<usize>) {
        self.column = column;
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append a typed character. Returns whether a search should run.
    pub fn push_char(&mut self, c: char) -> bool {
        if !self.enabled || self.column.is_none() {
            return false;
        }
        self.buffer.push(c);
        true
    }

    /// Drop the last typed character. Returns whether a search should run
    /// (false once the buffer is empty).
    pub fn backspace(&mut self) -> bool {
        self.buffer.pop();
        !self.buffer.is_empty()
    }

    /// Discard the buffer (flush timeout fired or Escape pressed).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn matches(&self, text: &str) -> bool {
        let buf = &self.buffer;
        if buf.is_empty() {
            return false;
        }
        let mut t = text.chars().flat_map(char::to_lowercase);
        for b in buf.chars().flat_map(char::to_lowercase) {
            if t.next() != Some(b) {
                return false;
            }
        }
        true
    }

    /// Find the first visible row at or after `start` whose searched
    /// column starts with the buffer, wrapping around to cover every
    /// visible row once. `None` when nothing matches or the buffer is
    /// empty.
    pub fn find_match(
        &self,
        model: &dyn TreeModel,
        tree: &RowTree,
        start: Option<(LevelId, RowId)>,
    ) -> Option<(LevelId, RowId)> {
        let column = self.column?;
        if self.buffer.is_empty() {
            return None;
        }
        let root = tree.root_level();
        let first = (root, tree.first_node(root)?);
        let start = start.unwrap_or(first);

        let mut pos = start;
        loop {
            let (level, node) = pos;
            let path = tree.find_path(level, node);
            if let Some(iter) = model.iter_from_path(&path)
                && let Some(value) = model.value(&iter, column)
                && self.matches(&value.display_text())
            {
                return Some(pos);
            }
            pos = tree.next_full(level, node).unwrap_or(first);
            if pos == start {
                return None;
            }
        }
    }
}
