//! Text document synchronisation.
//!
//! All four notifications run as exclusive requests, so each one derives
//! its snapshot from the latest state and no edit is lost.

use crate::dispatch::RequestContext;
use crate::error::RequestError;
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams,
};
use std::time::Instant;
use steward_analysis::uri::{uri_extension, uri_to_path};
use steward_analysis::{ContentChange, Document};

/// Handle textDocument/didOpen.
pub fn handle_did_open(
    ctx: &RequestContext<'_>,
    params: DidOpenTextDocumentParams,
) -> Result<(), RequestError> {
    let doc = params.text_document;
    tracing::info!("Document opened: {}", doc.uri.as_str());

    let now = Instant::now();
    let snapshot = ctx
        .snapshot()
        .with_document(doc.uri.clone(), Document::new(&doc.text, Some(doc.version), now));
    ctx.store().apply_snapshot_change(snapshot)?;
    ctx.store().add_open_doc_version(doc.uri.clone(), doc.version)?;
    ctx.diagnostics().document_changed(doc.uri, now);
    Ok(())
}

/// Handle textDocument/didChange (incremental).
pub fn handle_did_change(
    ctx: &RequestContext<'_>,
    params: DidChangeTextDocumentParams,
) -> Result<(), RequestError> {
    let uri = params.text_document.uri;
    let version = params.text_document.version;
    tracing::debug!("Document changed: {} (v{})", uri.as_str(), version);

    let now = Instant::now();
    let changes: Vec<ContentChange> = params
        .content_changes
        .into_iter()
        .map(|change| ContentChange {
            range: change.range,
            text: change.text,
        })
        .collect();

    let document = match ctx.snapshot().document(&uri) {
        Some(current) => current.edited(&changes, Some(version), now),
        None => {
            tracing::warn!("Change for untracked document {}", uri.as_str());
            Document::new("", None, now).edited(&changes, Some(version), now)
        }
    };

    ctx.store()
        .apply_snapshot_change(ctx.snapshot().with_document(uri.clone(), document))?;
    ctx.store().add_open_doc_version(uri.clone(), version)?;
    ctx.diagnostics().document_changed(uri, now);
    Ok(())
}

/// Handle textDocument/didClose.
///
/// A closed file that still exists in the workspace goes back to its disk
/// content; anything else leaves the snapshot.
pub fn handle_did_close(
    ctx: &RequestContext<'_>,
    params: DidCloseTextDocumentParams,
) -> Result<(), RequestError> {
    let uri = params.text_document.uri;
    tracing::info!("Document closed: {}", uri.as_str());

    let snapshot = ctx.snapshot();
    let on_disk = uri_to_path(&uri)
        .filter(|path| snapshot.root().is_some_and(|root| path.starts_with(root)))
        .and_then(|path| std::fs::read_to_string(path).ok());

    let next = match on_disk {
        Some(text) => snapshot.with_document(uri.clone(), Document::new(&text, None, Instant::now())),
        None => snapshot.without_document(&uri),
    };

    ctx.store().apply_snapshot_change(next)?;
    ctx.store().remove_open_doc_version(uri.clone())?;
    ctx.diagnostics().document_closed(uri);
    Ok(())
}

/// Handle textDocument/didSave. Saving a project file schedules a reload.
pub fn handle_did_save(
    ctx: &RequestContext<'_>,
    params: DidSaveTextDocumentParams,
) -> Result<(), RequestError> {
    let uri = params.text_document.uri;
    let settings = &ctx.view().settings;

    let is_project = uri_extension(&uri).is_some_and(|ext| {
        settings
            .project_extensions
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&ext))
    });
    if is_project {
        tracing::info!("Project file saved: {}", uri.as_str());
        ctx.store().request_solution_reload(settings.reload_debounce())?;
    }
    Ok(())
}
