//! Workspace-level handlers: configuration, watched files, symbol search
//! and decompiled metadata.

use crate::dispatch::{or_absent, RequestContext};
use crate::error::RequestError;
use crate::settings::Settings;
use lsp_types::request::Request;
use lsp_types::{
    DidChangeConfigurationParams, DidChangeWatchedFilesParams, FileChangeType, Uri,
    WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use steward_analysis::uri::{uri_extension, uri_to_path};
use steward_analysis::{Document, Snapshot};

/// URI scheme of decompiled metadata documents.
pub const METADATA_SCHEME: &str = "steward-metadata";

/// `steward/metadata`: decompile a symbol into a synthetic document.
#[derive(Debug)]
pub enum MetadataRequest {}

impl Request for MetadataRequest {
    type Params = MetadataParams;
    type Result = Option<MetadataResult>;
    const METHOD: &'static str = "steward/metadata";
}

/// Parameters of [`MetadataRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataParams {
    /// The symbol to decompile.
    pub symbol_name: String,
}

/// Result of [`MetadataRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResult {
    /// The synthetic document's URI.
    pub uri: Uri,
    /// The decompiled source.
    pub source: String,
}

fn matches_extension(uri: &Uri, extensions: &[String]) -> bool {
    uri_extension(uri).is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

/// Handle workspace/didChangeConfiguration.
pub fn handle_did_change_configuration(
    ctx: &RequestContext<'_>,
    params: DidChangeConfigurationParams,
) -> Result<(), RequestError> {
    let settings = Settings::from_value(Some(params.settings));
    let view = ctx.view();
    let changed = settings != *view.settings;
    let debounce = settings.reload_debounce();

    if changed {
        ctx.client()
            .update_file_watchers(&view.capabilities, &view.settings, &settings);
    }

    ctx.store().set_settings(settings)?;
    if changed {
        tracing::info!("Configuration changed");
        ctx.store().request_solution_reload(debounce)?;
    }
    Ok(())
}

/// Handle workspace/didChangeWatchedFiles.
///
/// Project files schedule a solution reload. Source files that the client
/// does not have open are re-read from disk; deleted ones leave the
/// snapshot.
pub fn handle_did_change_watched_files(
    ctx: &RequestContext<'_>,
    params: DidChangeWatchedFilesParams,
) -> Result<(), RequestError> {
    let view = ctx.view();
    let settings = &view.settings;
    tracing::info!("Watched files changed: {} files", params.changes.len());

    let mut snapshot: Option<Snapshot> = None;
    let mut reloaded = false;
    let mut removed = Vec::new();
    let mut reload_solution = false;

    for change in params.changes {
        let uri = change.uri;
        tracing::debug!("File {}: {:?}", uri.as_str(), change.typ);

        if matches_extension(&uri, &settings.project_extensions) {
            reload_solution = true;
            continue;
        }
        if !matches_extension(&uri, &settings.source_extensions) {
            continue;
        }

        let current = snapshot.take().unwrap_or_else(|| Snapshot::clone(&view.snapshot));
        if change.typ == FileChangeType::DELETED {
            snapshot = Some(current.without_document(&uri));
            removed.push(uri);
        } else if view.open_docs.contains_key(&uri) {
            // The editor owns open documents.
            snapshot = Some(current);
        } else {
            match uri_to_path(&uri).map(std::fs::read_to_string) {
                Some(Ok(text)) => {
                    snapshot = Some(current.with_document(uri, Document::new(&text, None, Instant::now())));
                    reloaded = true;
                }
                Some(Err(e)) => {
                    tracing::debug!("Cannot read {}: {}", uri.as_str(), e);
                    snapshot = Some(current);
                }
                None => snapshot = Some(current),
            }
        }
    }

    if let Some(snapshot) = snapshot.filter(|s| s.revision() != view.snapshot.revision()) {
        ctx.store().apply_snapshot_change(snapshot)?;
    }
    for uri in removed {
        ctx.store().remove_open_doc_version(uri.clone())?;
        ctx.diagnostics().document_removed(uri);
    }
    if reloaded {
        ctx.diagnostics().backlog_update();
    }
    if reload_solution {
        ctx.store().request_solution_reload(settings.reload_debounce())?;
    }
    Ok(())
}

/// Handle workspace/symbol.
pub fn handle_workspace_symbol(
    ctx: &RequestContext<'_>,
    params: WorkspaceSymbolParams,
) -> Result<Option<WorkspaceSymbolResponse>, RequestError> {
    let symbols = or_absent(
        "workspace/symbol",
        ctx.provider().workspace_symbols(ctx.snapshot(), &params.query),
    );
    Ok(Some(WorkspaceSymbolResponse::Nested(symbols)))
}

/// Handle steward/metadata.
///
/// Decompiled documents are cached in the snapshot; a cached entry is
/// returned without asking the provider again.
pub fn handle_metadata(
    ctx: &RequestContext<'_>,
    params: MetadataParams,
) -> Result<Option<MetadataResult>, RequestError> {
    let name = params.symbol_name;
    if name.is_empty() || !name.chars().all(steward_analysis::line_index::is_word_char) {
        return Err(RequestError::InvalidParams(format!("not a symbol name: {name:?}")));
    }
    let uri: Uri = format!("{METADATA_SCHEME}:///{name}")
        .parse()
        .map_err(|_| RequestError::InvalidParams(format!("not a symbol name: {name:?}")))?;

    let snapshot = ctx.snapshot();
    if let Some(cached) = snapshot.metadata_document(&uri) {
        tracing::debug!("Metadata cache hit for {}", name);
        return Ok(Some(MetadataResult {
            uri,
            source: cached.text(),
        }));
    }

    let Some(source) = or_absent(
        MetadataRequest::METHOD,
        ctx.provider().decompile_metadata(snapshot, &name),
    ) else {
        return Ok(None);
    };

    ctx.store().apply_snapshot_change(snapshot.with_metadata(
        uri.clone(),
        Document::new(&source, None, Instant::now()),
    ))?;
    Ok(Some(MetadataResult { uri, source }))
}
