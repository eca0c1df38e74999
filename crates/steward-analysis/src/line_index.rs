//! Position conversion and word extraction.
//!
//! LSP positions count UTF-16 code units; Rust strings index bytes. Every
//! conversion between the two goes through [`LineIndex`].

use lsp_types::{Position, Range};

/// A line index for efficient offset-to-position conversion.
///
/// Building the index is O(n) in the source length; finding the line of an
/// offset is a binary search, and only the column is counted linearly.
///
/// # Example
///
/// ```
/// use steward_analysis::LineIndex;
/// use lsp_types::Position;
///
/// let index = LineIndex::new("one\ntwo");
/// assert_eq!(index.position(5), Position::new(1, 1));
/// assert_eq!(index.offset(Position::new(1, 1)), Some(5));
/// ```
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    /// Byte offset of the start of each line (including line 0 at offset 0).
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Build a line index from source text.
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }

        Self {
            source,
            line_starts,
        }
    }

    /// Number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The text of a line without its terminator.
    pub fn line(&self, line: usize) -> Option<&'a str> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());
        let text = &self.source[start..end];
        let text = text.strip_suffix('\n').unwrap_or(text);
        Some(text.strip_suffix('\r').unwrap_or(text))
    }

    /// Convert a byte offset to an LSP position.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        let column: usize = self.source[line_start..offset]
            .chars()
            .map(char::len_utf16)
            .sum();

        Position::new(line as u32, column as u32)
    }

    /// Convert a pair of byte offsets to an LSP range.
    pub fn range(&self, start: usize, end: usize) -> Range {
        Range::new(self.position(start), self.position(end))
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Returns `None` if the line does not exist; columns past the end of the
    /// line clamp to the line end.
    pub fn offset(&self, position: Position) -> Option<usize> {
        let line_start = *self.line_starts.get(position.line as usize)?;
        let line = self.line(position.line as usize)?;

        let mut units = 0usize;
        for (i, ch) in line.char_indices() {
            if units >= position.character as usize {
                return Some(line_start + i);
            }
            units += ch.len_utf16();
        }
        Some(line_start + line.len())
    }
}

/// Check if a character is part of an identifier.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Get the identifier under a position, with its range.
pub fn word_at(source: &str, position: Position) -> Option<(String, Range)> {
    let index = LineIndex::new(source);
    let offset = index.offset(position)?;

    let start = source[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map_or(offset, |(i, _)| i);
    let end = source[offset..]
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(source.len(), |(i, _)| offset + i);

    if start == end {
        return None;
    }

    Some((source[start..end].to_string(), index.range(start, end)))
}

/// Iterate over the identifiers of a source text as `(byte offset, word)`.
pub fn words(source: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut chars = source.char_indices().peekable();
    std::iter::from_fn(move || {
        while let Some(&(_, c)) = chars.peek() {
            if is_word_char(c) {
                break;
            }
            chars.next();
        }
        let (start, _) = chars.next()?;
        let mut end = source.len();
        while let Some(&(i, c)) = chars.peek() {
            if !is_word_char(c) {
                end = i;
                break;
            }
            chars.next();
        }
        Some((start, &source[start..end]))
    })
}

/// Byte ranges of every whole-word occurrence of `word`.
pub fn occurrences(source: &str, word: &str) -> Vec<(usize, usize)> {
    words(source)
        .filter(|(_, w)| *w == word)
        .map(|(start, w)| (start, start + w.len()))
        .collect()
}
