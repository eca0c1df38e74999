//! Completion, formatting, code actions, semantic tokens and code lens.

use crate::dispatch::{or_absent, RequestContext};
use crate::error::RequestError;
use lsp_types::{
    CodeActionOrCommand, CodeActionParams, CodeActionResponse, CodeLens, CodeLensParams,
    CompletionParams, CompletionResponse, DocumentFormattingParams, DocumentRangeFormattingParams,
    SemanticTokens, SemanticTokensFullOptions, SemanticTokensLegend, SemanticTokensOptions,
    SemanticTokensParams, SemanticTokensRangeParams, SemanticTokensRangeResult,
    SemanticTokensResult, SemanticTokensServerCapabilities, TextEdit,
};
use steward_analysis::SEMANTIC_TOKEN_TYPES;

/// Semantic token capabilities advertised at initialization.
pub fn semantic_tokens_capabilities() -> SemanticTokensServerCapabilities {
    SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
        legend: SemanticTokensLegend {
            token_types: SEMANTIC_TOKEN_TYPES.to_vec(),
            token_modifiers: Vec::new(),
        },
        full: Some(SemanticTokensFullOptions::Bool(true)),
        range: Some(true),
        work_done_progress_options: Default::default(),
    })
}

/// Handle textDocument/completion.
pub fn handle_completion(
    ctx: &RequestContext<'_>,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>, RequestError> {
    let pos = params.text_document_position;
    let items = or_absent(
        "completion",
        ctx.provider()
            .completions(ctx.snapshot(), &pos.text_document.uri, pos.position),
    );
    Ok(if items.is_empty() {
        None
    } else {
        Some(CompletionResponse::Array(items))
    })
}

/// Handle textDocument/formatting.
pub fn handle_formatting(
    ctx: &RequestContext<'_>,
    params: DocumentFormattingParams,
) -> Result<Option<Vec<TextEdit>>, RequestError> {
    let edits = or_absent(
        "formatting",
        ctx.provider().formatting(
            ctx.snapshot(),
            &params.text_document.uri,
            None,
            &params.options,
        ),
    );
    Ok(if edits.is_empty() { None } else { Some(edits) })
}

/// Handle textDocument/rangeFormatting.
pub fn handle_range_formatting(
    ctx: &RequestContext<'_>,
    params: DocumentRangeFormattingParams,
) -> Result<Option<Vec<TextEdit>>, RequestError> {
    let edits = or_absent(
        "rangeFormatting",
        ctx.provider().formatting(
            ctx.snapshot(),
            &params.text_document.uri,
            Some(params.range),
            &params.options,
        ),
    );
    Ok(if edits.is_empty() { None } else { Some(edits) })
}

/// Handle textDocument/codeAction.
pub fn handle_code_action(
    ctx: &RequestContext<'_>,
    params: CodeActionParams,
) -> Result<Option<CodeActionResponse>, RequestError> {
    let actions: CodeActionResponse = or_absent(
        "codeAction",
        ctx.provider().code_actions(
            ctx.snapshot(),
            &params.text_document.uri,
            params.range,
            &params.context.diagnostics,
        ),
    )
    .into_iter()
    .map(CodeActionOrCommand::CodeAction)
    .collect();

    Ok(if actions.is_empty() {
        None
    } else {
        Some(actions)
    })
}

/// Handle textDocument/semanticTokens/full.
pub fn handle_semantic_tokens_full(
    ctx: &RequestContext<'_>,
    params: SemanticTokensParams,
) -> Result<Option<SemanticTokensResult>, RequestError> {
    let data = or_absent(
        "semanticTokens/full",
        ctx.provider()
            .semantic_tokens(ctx.snapshot(), &params.text_document.uri, None),
    );
    Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
        result_id: None,
        data,
    })))
}

/// Handle textDocument/semanticTokens/range.
pub fn handle_semantic_tokens_range(
    ctx: &RequestContext<'_>,
    params: SemanticTokensRangeParams,
) -> Result<Option<SemanticTokensRangeResult>, RequestError> {
    let data = or_absent(
        "semanticTokens/range",
        ctx.provider().semantic_tokens(
            ctx.snapshot(),
            &params.text_document.uri,
            Some(params.range),
        ),
    );
    Ok(Some(SemanticTokensRangeResult::Tokens(SemanticTokens {
        result_id: None,
        data,
    })))
}

/// Handle textDocument/codeLens.
pub fn handle_code_lens(
    ctx: &RequestContext<'_>,
    params: CodeLensParams,
) -> Result<Option<Vec<CodeLens>>, RequestError> {
    let lenses = or_absent(
        "codeLens",
        ctx.provider()
            .code_lenses(ctx.snapshot(), &params.text_document.uri),
    );
    Ok(if lenses.is_empty() {
        None
    } else {
        Some(lenses)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{uri, Harness};
    use crate::request::RequestMode;
    use lsp_types::{
        CodeActionContext, FormattingOptions, Position, Range, TextDocumentIdentifier,
        TextDocumentPositionParams,
    };
    use steward_analysis::{AnalysisProvider, TextAnalysis};

    fn options() -> FormattingOptions {
        FormattingOptions {
            tab_size: 4,
            insert_spaces: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_completion_by_prefix() {
        let h = Harness::new();
        let a = uri("file:///a.rs");
        h.put(&a, "fn render() {}\nfn main() { ren }\n");

        let params = CompletionParams {
            text_document_position: TextDocumentPositionParams::new(
                TextDocumentIdentifier::new(a),
                Position::new(1, 15),
            ),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: None,
        };
        let response = h
            .run(RequestMode::Shared, |ctx| handle_completion(ctx, params))
            .unwrap();

        match response {
            Some(CompletionResponse::Array(items)) => {
                let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
                assert_eq!(labels, vec!["render"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_formatting_and_clean_documents() {
        let h = Harness::new();
        let dirty = uri("file:///dirty.rs");
        let clean = uri("file:///clean.rs");
        h.put(&dirty, "fn a() {}   \n\tbody\n");
        h.put(&clean, "fn a() {}\n");

        let params = DocumentFormattingParams {
            text_document: TextDocumentIdentifier::new(dirty),
            options: options(),
            work_done_progress_params: Default::default(),
        };
        let edits = h
            .run(RequestMode::Shared, |ctx| handle_formatting(ctx, params))
            .unwrap()
            .unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "fn a() {}\n    body\n");

        let params = DocumentRangeFormattingParams {
            text_document: TextDocumentIdentifier::new(clean),
            range: Range::new(Position::new(0, 0), Position::new(1, 0)),
            options: options(),
            work_done_progress_params: Default::default(),
        };
        let edits = h
            .run(RequestMode::Shared, |ctx| handle_range_formatting(ctx, params))
            .unwrap();
        assert!(edits.is_none());
    }

    #[test]
    fn test_code_action_fixes_trailing_whitespace() {
        let h = Harness::new();
        let a = uri("file:///a.rs");
        h.put(&a, "fn a() {}  \n");
        let diagnostics = TextAnalysis::new()
            .diagnostics(&h.services.store.snapshot().unwrap(), &a)
            .unwrap();

        let params = CodeActionParams {
            text_document: TextDocumentIdentifier::new(a),
            range: Range::new(Position::new(0, 0), Position::new(0, 11)),
            context: CodeActionContext {
                diagnostics,
                only: None,
                trigger_kind: None,
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let actions = h
            .run(RequestMode::Shared, |ctx| handle_code_action(ctx, params))
            .unwrap()
            .unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_semantic_tokens_and_code_lens() {
        let h = Harness::new();
        let a = uri("file:///a.rs");
        h.put(&a, "// answer\nfn answer() { 42 }\nfn main() { answer() }\n");

        let params = SemanticTokensParams {
            text_document: TextDocumentIdentifier::new(a.clone()),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let tokens = h
            .run(RequestMode::Shared, |ctx| {
                handle_semantic_tokens_full(ctx, params)
            })
            .unwrap();
        match tokens {
            Some(SemanticTokensResult::Tokens(tokens)) => assert!(!tokens.data.is_empty()),
            other => panic!("unexpected {other:?}"),
        }

        let params = CodeLensParams {
            text_document: TextDocumentIdentifier::new(a),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let lenses = h
            .run(RequestMode::Shared, |ctx| handle_code_lens(ctx, params))
            .unwrap()
            .unwrap();
        assert_eq!(lenses.len(), 2);
    }
}
