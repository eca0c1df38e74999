//! Whitespace formatting.
//!
//! Provides formatting for:
//! - Tabs to spaces when the client asks for spaces
//! - Trailing whitespace removal
//! - A single final newline (whole-document formatting only)

use super::lint::utf16_len;
use crate::line_index::LineIndex;
use lsp_types::{FormattingOptions, Position, Range, TextEdit};

/// Compute formatting edits for a whole document or a line range.
pub(crate) fn format_edits(
    source: &str,
    range: Option<Range>,
    options: &FormattingOptions,
) -> Vec<TextEdit> {
    match range {
        Some(range) => format_range(source, range, options),
        None => format_document(source, options),
    }
}

/// Format a whole document as a single replacement edit.
fn format_document(source: &str, options: &FormattingOptions) -> Vec<TextEdit> {
    let index = LineIndex::new(source);
    let mut formatted: Vec<String> = (0..index.line_count())
        .filter_map(|line_no| index.line(line_no))
        .map(|line| format_line(line, options))
        .collect();

    // The segment after the last newline is not a line of its own.
    let had_final_newline = source.ends_with('\n');
    if had_final_newline {
        formatted.pop();
    }
    if options.trim_final_newlines.unwrap_or(true) {
        while formatted.last().is_some_and(String::is_empty) {
            formatted.pop();
        }
    }

    let mut text = formatted.join("\n");
    let wants_newline = options.insert_final_newline.unwrap_or(true) || had_final_newline;
    if wants_newline && !text.is_empty() {
        text.push('\n');
    }

    if text == source {
        return Vec::new();
    }

    let end = index.position(source.len());
    vec![TextEdit {
        range: Range::new(Position::new(0, 0), end),
        new_text: text,
    }]
}

/// Format the lines a range touches, one edit per changed line.
fn format_range(source: &str, range: Range, options: &FormattingOptions) -> Vec<TextEdit> {
    let index = LineIndex::new(source);
    let last = (range.end.line as usize).min(index.line_count().saturating_sub(1));

    (range.start.line as usize..=last)
        .filter_map(|line_no| {
            let line = index.line(line_no)?;
            let new_line = format_line(line, options);
            (new_line != line).then(|| TextEdit {
                range: Range::new(
                    Position::new(line_no as u32, 0),
                    Position::new(line_no as u32, utf16_len(line)),
                ),
                new_text: new_line,
            })
        })
        .collect()
}

fn format_line(line: &str, options: &FormattingOptions) -> String {
    let mut new_line = if options.insert_spaces && line.contains('\t') {
        line.replace('\t', &" ".repeat(options.tab_size.max(1) as usize))
    } else {
        line.to_string()
    };

    if options.trim_trailing_whitespace.unwrap_or(true) {
        new_line.truncate(new_line.trim_end().len());
    }
    new_line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> FormattingOptions {
        FormattingOptions {
            tab_size: 4,
            insert_spaces: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_format_document() {
        let edits = format_edits("fn a() {\n\tx  \n}\n\n\n", None, &options());
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "fn a() {\n    x\n}\n");
        assert_eq!(edits[0].range.end, Position::new(5, 0));
    }

    #[test]
    fn test_clean_document_has_no_edits() {
        assert!(format_edits("fn a() {}\n", None, &options()).is_empty());
    }

    #[test]
    fn test_inserts_final_newline() {
        let edits = format_edits("x", None, &options());
        assert_eq!(edits[0].new_text, "x\n");
    }

    #[test]
    fn test_format_range_only_touches_range() {
        let source = "a \nb \nc \n";
        let range = Range::new(Position::new(1, 0), Position::new(1, 1));
        let edits = format_edits(source, Some(range), &options());

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].range.start.line, 1);
        assert_eq!(edits[0].new_text, "b");
    }
}
