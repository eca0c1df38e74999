//! Line-level diagnostics and their quick fixes.

use crate::line_index::LineIndex;
use lsp_types::{
    CodeAction, CodeActionKind, Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range,
    TextEdit, Uri, WorkspaceEdit,
};
use std::collections::HashMap;

/// Diagnostic code for trailing whitespace.
pub(crate) const TRAILING_WHITESPACE: &str = "trailing-whitespace";

/// Diagnostic code for overlong lines.
pub(crate) const LINE_TOO_LONG: &str = "line-too-long";

/// Compute line diagnostics for a document.
pub(crate) fn diagnostics(source: &str, max_line_length: Option<usize>) -> Vec<Diagnostic> {
    let index = LineIndex::new(source);
    let mut diagnostics = Vec::new();

    for line_no in 0..index.line_count() {
        let Some(line) = index.line(line_no) else {
            continue;
        };
        let line_no = line_no as u32;

        let trimmed = line.trim_end();
        if trimmed.len() < line.len() {
            diagnostics.push(diagnostic(
                Range::new(
                    Position::new(line_no, utf16_len(trimmed)),
                    Position::new(line_no, utf16_len(line)),
                ),
                DiagnosticSeverity::HINT,
                TRAILING_WHITESPACE,
                "trailing whitespace".to_string(),
            ));
        }

        if let Some(max) = max_line_length {
            let length = line.chars().count();
            if length > max {
                diagnostics.push(diagnostic(
                    Range::new(
                        Position::new(line_no, 0),
                        Position::new(line_no, utf16_len(line)),
                    ),
                    DiagnosticSeverity::WARNING,
                    LINE_TOO_LONG,
                    format!("line is {length} characters long (limit {max})"),
                ));
            }
        }
    }

    diagnostics
}

/// Quick fixes for diagnostics this module produced.
#[allow(clippy::mutable_key_type)] // Uri is required as key by LSP WorkspaceEdit API
pub(crate) fn quick_fixes(uri: &Uri, diagnostics: &[Diagnostic]) -> Vec<CodeAction> {
    diagnostics
        .iter()
        .filter(|d| d.code == Some(NumberOrString::String(TRAILING_WHITESPACE.to_string())))
        .map(|d| {
            let mut changes = HashMap::new();
            changes.insert(
                uri.clone(),
                vec![TextEdit {
                    range: d.range,
                    new_text: String::new(),
                }],
            );

            CodeAction {
                title: "Remove trailing whitespace".to_string(),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![d.clone()]),
                edit: Some(WorkspaceEdit {
                    changes: Some(changes),
                    document_changes: None,
                    change_annotations: None,
                }),
                is_preferred: Some(true),
                ..Default::default()
            }
        })
        .collect()
}

fn diagnostic(
    range: Range,
    severity: DiagnosticSeverity,
    code: &str,
    message: String,
) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some("steward".to_string()),
        message,
        related_information: None,
        tags: None,
        code_description: None,
        data: None,
    }
}

pub(crate) fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_whitespace() {
        let diags = diagnostics("clean\ndirty  \n", None);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].range,
            Range::new(Position::new(1, 5), Position::new(1, 7))
        );
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::HINT));
    }

    #[test]
    fn test_line_too_long() {
        let diags = diagnostics("short\nway too long\n", Some(8));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].code,
            Some(NumberOrString::String(LINE_TOO_LONG.to_string()))
        );
        assert!(diagnostics("way too long", None).is_empty());
    }

    #[test]
    fn test_quick_fix_removes_whitespace() {
        let uri: Uri = "file:///a.rs".parse().unwrap();
        let diags = diagnostics("x \n", Some(1));
        let fixes = quick_fixes(&uri, &diags);

        // Only the whitespace diagnostic has a fix.
        assert_eq!(fixes.len(), 1);
        let edits = &fixes[0].edit.as_ref().unwrap().changes.as_ref().unwrap()[&uri];
        assert_eq!(edits[0].new_text, "");
        assert_eq!(edits[0].range, diags[0].range);
    }
}
