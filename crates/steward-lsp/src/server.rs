//! Server startup, initialization and teardown.

use crate::client::ClientHandle;
use crate::diagnostics::{DiagnosticsHandle, DiagnosticsPipeline};
use crate::dispatch::{self, Services};
use crate::error::{RequestError, ServerError};
use crate::handlers::editing::semantic_tokens_capabilities;
use crate::main_loop::MainLoop;
use crate::reload::WorkspaceReloader;
use crate::request::{CancelToken, RequestMode, PRIORITY_DEFAULT};
use crate::settings::{ServerTuning, Settings};
use crate::state::{spawn_store, ServerState, StoreHandle};
use crate::ticker::{TickTarget, Ticker};
use lsp_server::Connection;
use lsp_types::request::{Initialize, Request};
use lsp_types::{
    CodeLensOptions, CodeActionProviderCapability, CompletionOptions, HoverProviderCapability,
    ImplementationProviderCapability, InitializeParams, InitializeResult, OneOf,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions, TextDocumentSyncSaveOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use steward_analysis::uri::uri_to_path;
use steward_analysis::{AnalysisProvider, TextAnalysis};

/// Capabilities advertised in the initialize response.
pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
            open_close: Some(true),
            change: Some(TextDocumentSyncKind::INCREMENTAL),
            save: Some(TextDocumentSyncSaveOptions::Supported(true)),
            ..Default::default()
        })),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions::default()),
        definition_provider: Some(OneOf::Left(true)),
        implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
        references_provider: Some(OneOf::Left(true)),
        document_highlight_provider: Some(OneOf::Left(true)),
        document_formatting_provider: Some(OneOf::Left(true)),
        document_range_formatting_provider: Some(OneOf::Left(true)),
        code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
        code_lens_provider: Some(CodeLensOptions {
            resolve_provider: Some(false),
        }),
        rename_provider: Some(OneOf::Left(true)),
        semantic_tokens_provider: Some(semantic_tokens_capabilities()),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        ..Default::default()
    }
}

/// The client's workspace root, from the first workspace folder.
fn client_root(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(folder) = params.workspace_folders.as_ref().and_then(|f| f.first()) {
        return uri_to_path(&folder.uri);
    }
    #[allow(deprecated)]
    params.root_uri.as_ref().and_then(uri_to_path)
}

/// Background threads, shut down and joined on drop.
struct Workers {
    store: StoreHandle,
    diagnostics: DiagnosticsHandle,
    ticker: Option<Ticker>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Drop for Workers {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        let _ = self.store.shutdown();
        self.diagnostics.shutdown();
        for (name, thread) in self.threads.drain(..) {
            if thread.join().is_err() {
                tracing::error!("{} thread panicked", name);
            }
        }
    }
}

/// Apply the client's initialize parameters as an exclusive request.
fn initialize(services: &Services, params: InitializeParams) -> Result<(), RequestError> {
    let pending = services
        .store
        .start_request(Initialize::METHOD, RequestMode::Exclusive, PRIORITY_DEFAULT)?;

    dispatch::run(services, pending, &CancelToken::new(), Initialize::METHOD, |ctx| {
        ctx.store().set_client_capabilities(params.capabilities)?;
        ctx.store()
            .set_settings(Settings::from_value(params.initialization_options))?;
        // The first tick loads the workspace.
        ctx.store().request_solution_reload(Duration::ZERO)?;
        Ok(())
    })
}

/// Run a server over an established connection until the client exits.
pub fn run_server(
    connection: Connection,
    provider: Arc<dyn AnalysisProvider>,
    tuning: ServerTuning,
) -> Result<(), ServerError> {
    let (id, params) = connection.initialize_start()?;
    let init_params: InitializeParams = serde_json::from_value(params)?;
    let fallback_root = client_root(&init_params);
    if let Some(root) = &fallback_root {
        tracing::info!("Workspace root: {}", root.display());
    }

    let (store, store_events) = StoreHandle::channel();
    let (diagnostics, diagnostics_events) = DiagnosticsHandle::channel();
    let client = ClientHandle::new(connection.sender.clone());
    let services = Services {
        client: client.clone(),
        store: store.clone(),
        diagnostics: diagnostics.clone(),
        provider: Arc::clone(&provider),
    };

    let mut workers = Workers {
        store: store.clone(),
        diagnostics: diagnostics.clone(),
        ticker: None,
        threads: Vec::new(),
    };
    let reloader = WorkspaceReloader::new(services.clone(), fallback_root);
    workers.threads.push((
        "state store",
        spawn_store(
            ServerState::new(Box::new(reloader), tuning.long_running_threshold),
            store_events,
        )?,
    ));
    workers.threads.push((
        "diagnostics",
        DiagnosticsPipeline::new(
            diagnostics_events,
            Box::new(store.clone()),
            provider,
            Box::new(client.clone()),
            &tuning,
        )
        .spawn()?,
    ));

    initialize(&services, init_params)?;

    let result = InitializeResult {
        capabilities: server_capabilities(),
        server_info: Some(ServerInfo {
            name: "steward-lsp".to_string(),
            version: Some(crate::VERSION.to_string()),
        }),
    };
    connection.initialize_finish(id, serde_json::to_value(result)?)?;
    tracing::info!("LSP initialized successfully");

    let view = store.state_view().map_err(RequestError::from)?;
    client.register_file_watchers(&view.capabilities, &view.settings);

    workers.ticker = Some(Ticker::spawn(
        vec![Box::new(store) as Box<dyn TickTarget>, Box::new(diagnostics)],
        tuning.initial_tick_delay,
        tuning.tick_interval,
    )?);

    let clean = MainLoop::new(services, connection.sender.clone())?.run(&connection.receiver);
    drop(workers);

    tracing::info!("Server shutdown complete (clean: {})", clean);
    Ok(())
}

/// Start the LSP server using stdio transport.
pub fn start_stdio() -> Result<(), ServerError> {
    tracing::info!("Starting LSP server on stdio");

    let (connection, io_threads) = Connection::stdio();
    run_server(connection, Arc::new(TextAnalysis::new()), ServerTuning::default())?;

    // Wait for IO threads to finish
    io_threads.join()?;
    Ok(())
}
