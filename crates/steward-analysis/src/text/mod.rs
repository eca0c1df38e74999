//! Word-based analysis provider.
//!
//! `TextAnalysis` knows nothing about any particular language. Symbols are
//! identifier words, definitions are `<keyword> <name>` pairs such as
//! `fn parse` or `class Widget`, and references are whole-word matches
//! across the snapshot. It is good enough to drive every request the
//! server supports and keeps the binary usable without a real compiler.

mod definitions;
mod formatting;
mod lint;
mod tokens;
mod workspace;

pub use workspace::has_extension;

use crate::error::{AnalysisError, AnalysisResult};
use crate::line_index::{occurrences, word_at, words, LineIndex};
use crate::provider::{AnalysisProvider, Symbol};
use crate::snapshot::Snapshot;
use definitions::definitions;
use lsp_types::{
    CodeAction, CodeLens, Command, CompletionItem, CompletionItemKind, Diagnostic,
    FormattingOptions, Hover, HoverContents, Location, MarkupContent, MarkupKind, OneOf,
    Position, Range, SemanticToken, TextEdit, Uri, WorkspaceEdit, WorkspaceSymbol,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Default limit for the line-length diagnostic.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 120;

/// Maximum number of workspace symbols returned for one query.
const MAX_WORKSPACE_SYMBOLS: usize = 128;

/// Command attached to reference-count code lenses.
pub const SHOW_REFERENCES_COMMAND: &str = "steward.showReferences";

/// Word-based [`AnalysisProvider`].
#[derive(Debug, Clone)]
pub struct TextAnalysis {
    max_line_length: Option<usize>,
}

impl Default for TextAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAnalysis {
    /// Create a provider with the default line-length limit.
    pub fn new() -> Self {
        Self {
            max_line_length: Some(DEFAULT_MAX_LINE_LENGTH),
        }
    }

    /// Set the line-length limit; `None` disables the diagnostic.
    pub fn with_max_line_length(mut self, max_line_length: Option<usize>) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    fn source(snapshot: &Snapshot, uri: &Uri) -> AnalysisResult<String> {
        snapshot
            .document(uri)
            .map(|doc| doc.text())
            .ok_or_else(|| AnalysisError::UnknownDocument(uri.clone()))
    }

    /// Every whole-word occurrence of `word` in the snapshot's source documents.
    fn workspace_occurrences(snapshot: &Snapshot, word: &str) -> Vec<Location> {
        let mut locations = Vec::new();
        for (uri, doc) in snapshot.documents() {
            let text = doc.text();
            let index = LineIndex::new(&text);
            for (start, end) in occurrences(&text, word) {
                locations.push(Location::new(uri.clone(), index.range(start, end)));
            }
        }
        locations
    }

    /// Every definition of `name` in the snapshot's source documents.
    fn workspace_definitions(snapshot: &Snapshot, name: &str) -> Vec<Location> {
        let mut locations = Vec::new();
        for (uri, doc) in snapshot.documents() {
            let text = doc.text();
            let index = LineIndex::new(&text);
            for def in definitions(&text).into_iter().filter(|d| d.name == name) {
                locations.push(Location::new(uri.clone(), index.range(def.start, def.end)));
            }
        }
        locations
    }
}

impl AnalysisProvider for TextAnalysis {
    fn symbol_at(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
    ) -> AnalysisResult<Option<Symbol>> {
        let text = Self::source(snapshot, uri)?;
        if LineIndex::new(&text).offset(position).is_none() {
            return Err(AnalysisError::InvalidPosition {
                line: position.line,
                character: position.character,
            });
        }

        Ok(word_at(&text, position)
            .filter(|(word, _)| !word.starts_with(|c: char| c.is_ascii_digit()))
            .map(|(name, range)| Symbol { name, range }))
    }

    fn hover(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
    ) -> AnalysisResult<Option<Hover>> {
        let Some(symbol) = self.symbol_at(snapshot, uri, position)? else {
            return Ok(None);
        };

        let usages = Self::workspace_occurrences(snapshot, &symbol.name);
        let files: BTreeSet<_> = usages.iter().map(|l| l.uri.as_str()).collect();

        let mut info = format!("## `{}`\n\n", symbol.name);
        if let Some(def) = Self::workspace_definitions(snapshot, &symbol.name).first() {
            info.push_str(&format!(
                "**Defined in:** {}:{}\n\n",
                def.uri.as_str(),
                def.range.start.line + 1
            ));
        }
        info.push_str(&format!(
            "**Used:** {} times in {} files",
            usages.len(),
            files.len()
        ));

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: info,
            }),
            range: Some(symbol.range),
        }))
    }

    fn definition(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
    ) -> AnalysisResult<Vec<Location>> {
        let Some(symbol) = self.symbol_at(snapshot, uri, position)? else {
            return Ok(Vec::new());
        };

        let definitions = Self::workspace_definitions(snapshot, &symbol.name);
        if !definitions.is_empty() {
            return Ok(definitions);
        }

        // No keyword definition: the first occurrence is the best guess.
        Ok(Self::workspace_occurrences(snapshot, &symbol.name)
            .into_iter()
            .take(1)
            .collect())
    }

    fn references(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
        include_declaration: bool,
    ) -> AnalysisResult<Vec<Location>> {
        let Some(symbol) = self.symbol_at(snapshot, uri, position)? else {
            return Ok(Vec::new());
        };

        let mut locations = Self::workspace_occurrences(snapshot, &symbol.name);
        if !include_declaration {
            let definitions = Self::workspace_definitions(snapshot, &symbol.name);
            locations.retain(|l| !definitions.contains(l));
        }
        Ok(locations)
    }

    fn completions(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
    ) -> AnalysisResult<Vec<CompletionItem>> {
        let text = Self::source(snapshot, uri)?;
        let Some(offset) = LineIndex::new(&text).offset(position) else {
            return Ok(Vec::new());
        };

        let before = &text[..offset];
        let prefix_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| crate::line_index::is_word_char(*c))
            .last()
            .map_or(offset, |(i, _)| i);
        let prefix = &text[prefix_start..offset];

        let candidates: BTreeSet<&str> = words(&text)
            .map(|(_, w)| w)
            .filter(|w| w.starts_with(prefix) && *w != prefix)
            .filter(|w| !w.starts_with(|c: char| c.is_ascii_digit()))
            .collect();

        Ok(candidates
            .into_iter()
            .map(|word| CompletionItem {
                label: word.to_string(),
                kind: Some(CompletionItemKind::TEXT),
                ..Default::default()
            })
            .collect())
    }

    fn semantic_tokens(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        range: Option<Range>,
    ) -> AnalysisResult<Vec<SemanticToken>> {
        let text = Self::source(snapshot, uri)?;
        Ok(tokens::semantic_tokens(&text, range))
    }

    fn formatting(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        range: Option<Range>,
        options: &FormattingOptions,
    ) -> AnalysisResult<Vec<TextEdit>> {
        let text = Self::source(snapshot, uri)?;
        Ok(formatting::format_edits(&text, range, options))
    }

    fn code_actions(
        &self,
        _snapshot: &Snapshot,
        uri: &Uri,
        _range: Range,
        diagnostics: &[Diagnostic],
    ) -> AnalysisResult<Vec<CodeAction>> {
        Ok(lint::quick_fixes(uri, diagnostics))
    }

    #[allow(clippy::mutable_key_type)] // Uri is required as key by LSP WorkspaceEdit API
    fn rename(
        &self,
        snapshot: &Snapshot,
        uri: &Uri,
        position: Position,
        new_name: &str,
    ) -> AnalysisResult<Option<WorkspaceEdit>> {
        let valid_name = !new_name.is_empty()
            && new_name.chars().all(crate::line_index::is_word_char)
            && !new_name.starts_with(|c: char| c.is_ascii_digit());
        if !valid_name {
            return Ok(None);
        }

        let Some(symbol) = self.symbol_at(snapshot, uri, position)? else {
            return Ok(None);
        };

        let mut changes: HashMap<Uri, Vec<TextEdit>> = HashMap::new();
        for location in Self::workspace_occurrences(snapshot, &symbol.name) {
            changes.entry(location.uri).or_default().push(TextEdit {
                range: location.range,
                new_text: new_name.to_string(),
            });
        }

        if changes.is_empty() {
            return Ok(None);
        }

        Ok(Some(WorkspaceEdit {
            changes: Some(changes),
            document_changes: None,
            change_annotations: None,
        }))
    }

    fn code_lenses(&self, snapshot: &Snapshot, uri: &Uri) -> AnalysisResult<Vec<CodeLens>> {
        let text = Self::source(snapshot, uri)?;
        let index = LineIndex::new(&text);

        Ok(definitions(&text)
            .into_iter()
            .map(|def| {
                let range = index.range(def.start, def.end);
                let count = Self::workspace_occurrences(snapshot, def.name)
                    .len()
                    .saturating_sub(1);
                let title = if count == 1 {
                    "1 reference".to_string()
                } else {
                    format!("{count} references")
                };

                CodeLens {
                    range,
                    command: Some(Command {
                        title,
                        command: SHOW_REFERENCES_COMMAND.to_string(),
                        arguments: Some(vec![
                            serde_json::json!(uri.as_str()),
                            serde_json::json!({
                                "line": range.start.line,
                                "character": range.start.character,
                            }),
                        ]),
                    }),
                    data: None,
                }
            })
            .collect())
    }

    fn workspace_symbols(
        &self,
        snapshot: &Snapshot,
        query: &str,
    ) -> AnalysisResult<Vec<WorkspaceSymbol>> {
        let query = query.to_lowercase();
        let mut symbols = Vec::new();

        'documents: for (uri, doc) in snapshot.documents() {
            let text = doc.text();
            let index = LineIndex::new(&text);
            for def in definitions(&text) {
                if !def.name.to_lowercase().contains(&query) {
                    continue;
                }
                symbols.push(WorkspaceSymbol {
                    name: def.name.to_string(),
                    kind: def.kind,
                    tags: None,
                    container_name: None,
                    location: OneOf::Left(Location::new(
                        uri.clone(),
                        index.range(def.start, def.end),
                    )),
                    data: None,
                });
                if symbols.len() >= MAX_WORKSPACE_SYMBOLS {
                    break 'documents;
                }
            }
        }

        Ok(symbols)
    }

    fn diagnostics(&self, snapshot: &Snapshot, uri: &Uri) -> AnalysisResult<Vec<Diagnostic>> {
        let text = Self::source(snapshot, uri)?;
        Ok(lint::diagnostics(&text, self.max_line_length))
    }

    fn decompile_metadata(
        &self,
        snapshot: &Snapshot,
        symbol: &str,
    ) -> AnalysisResult<Option<String>> {
        let usages = Self::workspace_occurrences(snapshot, symbol);
        if usages.is_empty() {
            return Ok(None);
        }

        let mut listing = format!("// Metadata for `{symbol}`\n// {} occurrences\n\n", usages.len());
        for location in &usages {
            let line = snapshot
                .document(&location.uri)
                .map(|doc| doc.text())
                .and_then(|text| {
                    LineIndex::new(&text)
                        .line(location.range.start.line as usize)
                        .map(|l| l.trim().to_string())
                })
                .unwrap_or_default();
            listing.push_str(&format!(
                "// {}:{}\n{}\n",
                location.uri.as_str(),
                location.range.start.line + 1,
                line
            ));
        }
        Ok(Some(listing))
    }

    fn load_workspace(
        &self,
        root: &Path,
        extensions: &[String],
    ) -> AnalysisResult<Vec<(PathBuf, String)>> {
        workspace::load(root, extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use std::time::Instant;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn workspace() -> (Snapshot, Uri, Uri) {
        let lib = uri("file:///ws/lib.rs");
        let main = uri("file:///ws/main.rs");
        let now = Instant::now();
        let snapshot = Snapshot::empty()
            .with_document(
                lib.clone(),
                Document::new("pub fn parse(input: &str) {}\n", Some(1), now),
            )
            .with_document(
                main.clone(),
                Document::new("fn main() {\n    parse(\"x\");\n    parse(\"y\");\n}\n", Some(1), now),
            );
        (snapshot, lib, main)
    }

    #[test]
    fn test_definition_prefers_keyword_definition() {
        let (snapshot, lib, main) = workspace();
        let locations = TextAnalysis::new()
            .definition(&snapshot, &main, Position::new(1, 6))
            .unwrap();

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, lib);
        assert_eq!(locations[0].range.start, Position::new(0, 7));
    }

    #[test]
    fn test_references_respect_include_declaration() {
        let (snapshot, _, main) = workspace();
        let provider = TextAnalysis::new();

        let all = provider.references(&snapshot, &main, Position::new(1, 6), true).unwrap();
        assert_eq!(all.len(), 3);

        let usages = provider.references(&snapshot, &main, Position::new(1, 6), false).unwrap();
        assert_eq!(usages.len(), 2);
        assert!(usages.iter().all(|l| l.uri == main));
    }

    #[test]
    fn test_rename_edits_every_document() {
        let (snapshot, lib, main) = workspace();
        let edit = TextAnalysis::new()
            .rename(&snapshot, &lib, Position::new(0, 8), "parse_input")
            .unwrap()
            .unwrap();

        let changes = edit.changes.unwrap();
        assert_eq!(changes[&lib].len(), 1);
        assert_eq!(changes[&main].len(), 2);
        assert!(changes[&main].iter().all(|e| e.new_text == "parse_input"));
    }

    #[test]
    fn test_rename_rejects_invalid_names() {
        let (snapshot, lib, _) = workspace();
        let provider = TextAnalysis::new();
        assert!(provider.rename(&snapshot, &lib, Position::new(0, 8), "not valid").unwrap().is_none());
        assert!(provider.rename(&snapshot, &lib, Position::new(0, 8), "9lives").unwrap().is_none());
    }

    #[test]
    fn test_completions_use_prefix() {
        let (snapshot, _, main) = workspace();
        let items = TextAnalysis::new()
            .completions(&snapshot, &main, Position::new(1, 9))
            .unwrap();
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.is_empty(), "complete word has no longer candidates: {labels:?}");

        let items = TextAnalysis::new()
            .completions(&snapshot, &main, Position::new(1, 5))
            .unwrap();
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["parse"]);
    }

    #[test]
    fn test_code_lens_counts_references() {
        let (snapshot, lib, _) = workspace();
        let lenses = TextAnalysis::new().code_lenses(&snapshot, &lib).unwrap();

        assert_eq!(lenses.len(), 1);
        assert_eq!(lenses[0].command.as_ref().unwrap().title, "2 references");
    }

    #[test]
    fn test_workspace_symbols_match_query() {
        let (snapshot, _, _) = workspace();
        let provider = TextAnalysis::new();

        let symbols = provider.workspace_symbols(&snapshot, "PARS").unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "parse");

        let all = provider.workspace_symbols(&snapshot, "").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_unknown_document_is_an_error() {
        let (snapshot, _, _) = workspace();
        let result = TextAnalysis::new().diagnostics(&snapshot, &uri("file:///ws/missing.rs"));
        assert!(matches!(result, Err(AnalysisError::UnknownDocument(_))));
    }

    #[test]
    fn test_decompile_metadata_lists_usages() {
        let (snapshot, _, _) = workspace();
        let provider = TextAnalysis::new();

        let listing = provider.decompile_metadata(&snapshot, "parse").unwrap().unwrap();
        assert!(listing.starts_with("// Metadata for `parse`"));
        assert!(listing.contains("// 3 occurrences"));
        assert!(provider.decompile_metadata(&snapshot, "nothing").unwrap().is_none());
    }
}
