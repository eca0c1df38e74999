//! Keyword-driven definition scanning.

use crate::line_index::words;
use lsp_types::SymbolKind;

/// Keywords that introduce a named definition, with the symbol kind they produce.
const DEFINITION_KEYWORDS: &[(&str, SymbolKind)] = &[
    ("fn", SymbolKind::FUNCTION),
    ("def", SymbolKind::FUNCTION),
    ("function", SymbolKind::FUNCTION),
    ("struct", SymbolKind::STRUCT),
    ("class", SymbolKind::CLASS),
    ("enum", SymbolKind::ENUM),
    ("trait", SymbolKind::INTERFACE),
    ("interface", SymbolKind::INTERFACE),
    ("const", SymbolKind::CONSTANT),
    ("static", SymbolKind::CONSTANT),
    ("mod", SymbolKind::MODULE),
    ("module", SymbolKind::MODULE),
    ("namespace", SymbolKind::NAMESPACE),
];

/// A named definition found in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Definition<'a> {
    pub name: &'a str,
    pub kind: SymbolKind,
    /// Byte range of the name.
    pub start: usize,
    pub end: usize,
}

/// The symbol kind a keyword introduces, if it is a definition keyword.
pub(crate) fn keyword_kind(word: &str) -> Option<SymbolKind> {
    DEFINITION_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == word)
        .map(|(_, kind)| *kind)
}

/// Find `<keyword> <name>` pairs on the same line.
pub(crate) fn definitions(source: &str) -> Vec<Definition<'_>> {
    let mut found = Vec::new();
    let mut previous: Option<(usize, &str)> = None;

    for (start, word) in words(source) {
        if let Some((prev_start, prev)) = previous {
            let gap = &source[prev_start + prev.len()..start];
            let same_line = !gap.is_empty() && gap.chars().all(|c| c == ' ' || c == '\t');
            let is_name = keyword_kind(word).is_none()
                && !word.starts_with(|c: char| c.is_ascii_digit());

            if same_line && is_name {
                if let Some(kind) = keyword_kind(prev) {
                    found.push(Definition {
                        name: word,
                        kind,
                        start,
                        end: start + word.len(),
                    });
                }
            }
        }
        previous = Some((start, word));
    }

    found
}
