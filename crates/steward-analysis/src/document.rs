//! Rope-backed document content.
//!
//! Documents are immutable once placed in a [`Snapshot`](crate::Snapshot):
//! an edit produces a new `Document`, the old one stays valid for any
//! request still holding the previous snapshot. Cloning is cheap since
//! `Rope` shares its nodes.

use lsp_types::{Position, Range};
use ropey::{Rope, RopeSlice};
use std::time::Instant;

/// A single content change reported by the client.
///
/// A change without a range replaces the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// The replaced range, in LSP (UTF-16) coordinates.
    pub range: Option<Range>,
    /// The new text for the range.
    pub text: String,
}

/// A tracked document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The document content as a rope for efficient editing.
    content: Rope,
    /// The client version, `None` for documents read from disk.
    version: Option<i32>,
    /// When the content last changed.
    changed_at: Instant,
}

impl Document {
    /// Create a new document with the given content.
    pub fn new(text: &str, version: Option<i32>, changed_at: Instant) -> Self {
        Self {
            content: Rope::from_str(text),
            version,
            changed_at,
        }
    }

    /// Get the document content as a string.
    pub fn text(&self) -> String {
        self.content.to_string()
    }

    /// Borrow the underlying rope.
    pub fn rope(&self) -> &Rope {
        &self.content
    }

    /// Get the client version of the document.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    /// When this content was produced.
    pub fn changed_at(&self) -> Instant {
        self.changed_at
    }

    /// Apply client changes in order, producing a new document.
    pub fn edited(
        &self,
        changes: &[ContentChange],
        version: Option<i32>,
        changed_at: Instant,
    ) -> Self {
        let mut content = self.content.clone();
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = position_to_char(&content, range.start);
                    let end = position_to_char(&content, range.end).max(start);
                    content.remove(start..end);
                    content.insert(start, &change.text);
                }
                None => content = Rope::from_str(&change.text),
            }
        }

        Self {
            content,
            version,
            changed_at,
        }
    }
}

/// Convert an LSP position to a char index, clamping to the line end.
fn position_to_char(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return rope.len_chars();
    }

    let line_start = rope.line_to_char(line);
    let line_end = line_start + content_len(rope.line(line));

    let start_cu = rope.char_to_utf16_cu(line_start);
    let target_cu = (start_cu + position.character as usize).min(rope.len_utf16_cu());
    rope.utf16_cu_to_char(target_cu).min(line_end)
}

/// Length of a line in chars, excluding its terminator.
fn content_len(line: RopeSlice<'_>) -> usize {
    let mut len = line.len_chars();
    if len > 0 && line.char(len - 1) == '\n' {
        len -= 1;
        if len > 0 && line.char(len - 1) == '\r' {
            len -= 1;
        }
    }
    len
}
