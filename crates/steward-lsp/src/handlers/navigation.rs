//! Symbol navigation: hover, definitions, references, highlights, rename.

use crate::dispatch::{or_absent, RequestContext};
use crate::error::RequestError;
use lsp_types::{
    DocumentHighlight, DocumentHighlightKind, DocumentHighlightParams, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverParams, Location, ReferenceParams, RenameParams,
    WorkspaceEdit,
};

fn locations(found: Vec<Location>) -> Option<GotoDefinitionResponse> {
    if found.is_empty() {
        None
    } else {
        Some(GotoDefinitionResponse::Array(found))
    }
}

/// Handle textDocument/hover.
pub fn handle_hover(
    ctx: &RequestContext<'_>,
    params: HoverParams,
) -> Result<Option<Hover>, RequestError> {
    let pos = params.text_document_position_params;
    Ok(or_absent(
        "hover",
        ctx.provider()
            .hover(ctx.snapshot(), &pos.text_document.uri, pos.position),
    ))
}

/// Handle textDocument/definition.
pub fn handle_definition(
    ctx: &RequestContext<'_>,
    params: GotoDefinitionParams,
) -> Result<Option<GotoDefinitionResponse>, RequestError> {
    let pos = params.text_document_position_params;
    Ok(locations(or_absent(
        "definition",
        ctx.provider()
            .definition(ctx.snapshot(), &pos.text_document.uri, pos.position),
    )))
}

/// Handle textDocument/implementation.
pub fn handle_implementation(
    ctx: &RequestContext<'_>,
    params: GotoDefinitionParams,
) -> Result<Option<GotoDefinitionResponse>, RequestError> {
    let pos = params.text_document_position_params;
    Ok(locations(or_absent(
        "implementation",
        ctx.provider()
            .implementations(ctx.snapshot(), &pos.text_document.uri, pos.position),
    )))
}

/// Handle textDocument/references.
pub fn handle_references(
    ctx: &RequestContext<'_>,
    params: ReferenceParams,
) -> Result<Option<Vec<Location>>, RequestError> {
    let pos = params.text_document_position;
    let found = or_absent(
        "references",
        ctx.provider().references(
            ctx.snapshot(),
            &pos.text_document.uri,
            pos.position,
            params.context.include_declaration,
        ),
    );
    Ok(if found.is_empty() { None } else { Some(found) })
}

/// Handle textDocument/documentHighlight: references within the document.
pub fn handle_document_highlight(
    ctx: &RequestContext<'_>,
    params: DocumentHighlightParams,
) -> Result<Option<Vec<DocumentHighlight>>, RequestError> {
    let pos = params.text_document_position_params;
    let uri = &pos.text_document.uri;
    let highlights: Vec<_> = or_absent(
        "documentHighlight",
        ctx.provider()
            .references(ctx.snapshot(), uri, pos.position, true),
    )
    .into_iter()
    .filter(|location| location.uri == *uri)
    .map(|location| DocumentHighlight {
        range: location.range,
        kind: Some(DocumentHighlightKind::TEXT),
    })
    .collect();

    Ok(if highlights.is_empty() {
        None
    } else {
        Some(highlights)
    })
}

/// Handle textDocument/rename.
pub fn handle_rename(
    ctx: &RequestContext<'_>,
    params: RenameParams,
) -> Result<Option<WorkspaceEdit>, RequestError> {
    let pos = params.text_document_position;
    Ok(or_absent(
        "rename",
        ctx.provider().rename(
            ctx.snapshot(),
            &pos.text_document.uri,
            pos.position,
            &params.new_name,
        ),
    ))
}
