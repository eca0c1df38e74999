//! The analysis capability consumed by request handlers.

use crate::error::AnalysisResult;
use crate::snapshot::Snapshot;
use lsp_types::{
    CodeAction, CodeLens, CompletionItem, Diagnostic, FormattingOptions, Hover, Location,
    Position, Range, SemanticToken, SemanticTokenType, TextEdit, Uri, WorkspaceEdit,
    WorkspaceSymbol,
};
use std::path::{Path, PathBuf};

/// Token types reported by [`AnalysisProvider::semantic_tokens`], in legend order.
pub const SEMANTIC_TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::NUMBER,
    SemanticTokenType::COMMENT,
    SemanticTokenType::STRING,
    SemanticTokenType::KEYWORD,
];

/// A symbol resolved at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol name.
    pub name: String,
    /// Where the name appears under the cursor.
    pub range: Range,
}

/// Language analysis over a [`Snapshot`].
///
/// Every operation is scoped to the snapshot it is given and must not hold
/// on to it afterwards. Operations a provider does not support return an
/// empty result; the defaults below do exactly that, so a provider only
/// overrides what it implements.
pub trait AnalysisProvider: Send + Sync {
    /// Resolve the symbol under the cursor.
    fn symbol_at(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Option<Symbol>> {
        Ok(None)
    }

    /// Describe the symbol under the cursor.
    fn hover(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Option<Hover>> {
        Ok(None)
    }

    /// Locate the definition of the symbol under the cursor.
    fn definition(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Vec<Location>> {
        Ok(Vec::new())
    }

    /// Locate implementations and derived types.
    fn implementations(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Vec<Location>> {
        Ok(Vec::new())
    }

    /// Find every reference to the symbol under the cursor.
    fn references(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
        _include_declaration: bool,
    ) -> AnalysisResult<Vec<Location>> {
        Ok(Vec::new())
    }

    /// Compute completions at the cursor.
    fn completions(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Vec<CompletionItem>> {
        Ok(Vec::new())
    }

    /// Classify the document (or a range of it) as delta-encoded tokens.
    fn semantic_tokens(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _range: Option<Range>,
    ) -> AnalysisResult<Vec<SemanticToken>> {
        Ok(Vec::new())
    }

    /// Compute formatting edits for the document or a range of it.
    fn formatting(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _range: Option<Range>,
        _options: &FormattingOptions,
    ) -> AnalysisResult<Vec<TextEdit>> {
        Ok(Vec::new())
    }

    /// Offer code actions for a range and the diagnostics the client sent.
    fn code_actions(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _range: Range,
        _diagnostics: &[Diagnostic],
    ) -> AnalysisResult<Vec<CodeAction>> {
        Ok(Vec::new())
    }

    /// Rename the symbol under the cursor across the snapshot.
    fn rename(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
        _new_name: &str,
    ) -> AnalysisResult<Option<WorkspaceEdit>> {
        Ok(None)
    }

    /// Compute code lenses for the document.
    fn code_lenses(&self, _snapshot: &Snapshot, _uri: &Uri) -> AnalysisResult<Vec<CodeLens>> {
        Ok(Vec::new())
    }

    /// Search symbols across the snapshot.
    fn workspace_symbols(
        &self,
        _snapshot: &Snapshot,
        _query: &str,
    ) -> AnalysisResult<Vec<WorkspaceSymbol>> {
        Ok(Vec::new())
    }

    /// Compute diagnostics for one document.
    fn diagnostics(&self, _snapshot: &Snapshot, _uri: &Uri) -> AnalysisResult<Vec<Diagnostic>> {
        Ok(Vec::new())
    }

    /// Produce source text for a symbol that has no document of its own.
    fn decompile_metadata(
        &self,
        _snapshot: &Snapshot,
        _symbol: &str,
    ) -> AnalysisResult<Option<String>> {
        Ok(None)
    }

    /// Read the workspace files below `root` with one of `extensions`.
    fn load_workspace(
        &self,
        _root: &Path,
        _extensions: &[String],
    ) -> AnalysisResult<Vec<(PathBuf, String)>> {
        Ok(Vec::new())
    }
}
