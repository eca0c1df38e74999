//! Lexical classification for semantic tokens.

use super::definitions::keyword_kind;
use super::lint::utf16_len;
use crate::line_index::{words, LineIndex};
use lsp_types::{Range, SemanticToken};

// Indices into `SEMANTIC_TOKEN_TYPES`.
const NUMBER: u32 = 0;
const COMMENT: u32 = 1;
const STRING: u32 = 2;
const KEYWORD: u32 = 3;

/// A token before delta encoding: `(line, start, length, type)` in UTF-16 units.
type RawToken = (u32, u32, u32, u32);

/// Classify a document, optionally restricted to the lines of `range`.
pub(crate) fn semantic_tokens(source: &str, range: Option<Range>) -> Vec<SemanticToken> {
    let index = LineIndex::new(source);
    let (first, last) = match range {
        Some(range) => (range.start.line as usize, range.end.line as usize),
        None => (0, usize::MAX),
    };

    let mut raw = Vec::new();
    for line_no in first..index.line_count().min(last.saturating_add(1)) {
        if let Some(line) = index.line(line_no) {
            classify_line(line, line_no as u32, &mut raw);
        }
    }

    encode(raw)
}

fn classify_line(line: &str, line_no: u32, out: &mut Vec<RawToken>) {
    let comment = comment_start(line);
    let code = &line[..comment.unwrap_or(line.len())];
    let col = |byte: usize| utf16_len(&line[..byte]);

    let strings = string_spans(code);
    for &(start, end) in &strings {
        out.push((line_no, col(start), utf16_len(&code[start..end]), STRING));
    }

    for (start, word) in words(code) {
        if strings.iter().any(|&(s, e)| start >= s && start < e) {
            continue;
        }
        let kind = if word.starts_with(|c: char| c.is_ascii_digit()) {
            NUMBER
        } else if keyword_kind(word).is_some() {
            KEYWORD
        } else {
            continue;
        };
        out.push((line_no, col(start), utf16_len(word), kind));
    }

    if let Some(start) = comment {
        out.push((line_no, col(start), utf16_len(&line[start..]), COMMENT));
    }
}

/// Byte offset where a line comment starts, ignoring `//` inside strings.
fn comment_start(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if trimmed == "#" || trimmed.starts_with("# ") {
        return Some(line.len() - trimmed.len());
    }

    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '/' if !in_string && line[i..].starts_with("//") => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte ranges of double-quoted strings, quotes included.
fn string_spans(code: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut escaped = false;

    for (i, c) in code.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if open.is_some() => escaped = true,
            '"' => match open.take() {
                Some(start) => spans.push((start, i + 1)),
                None => open = Some(i),
            },
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push((start, code.len()));
    }
    spans
}

fn encode(mut raw: Vec<RawToken>) -> Vec<SemanticToken> {
    raw.sort_unstable();

    let mut previous = (0, 0);
    raw.into_iter()
        .map(|(line, start, length, token_type)| {
            let delta_line = line - previous.0;
            let delta_start = if delta_line == 0 {
                start - previous.1
            } else {
                start
            };
            previous = (line, start);
            SemanticToken {
                delta_line,
                delta_start,
                length,
                token_type,
                token_modifiers_bitset: 0,
            }
        })
        .collect()
}
