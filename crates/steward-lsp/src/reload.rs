//! Solution reloads fired by the store's debounce deadline.

use crate::dispatch::{self, Services};
use crate::error::RequestError;
use crate::request::{CancelToken, RequestMode, PRIORITY_DEFAULT};
use crate::settings::Settings;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use steward_analysis::uri::path_to_uri;
use steward_analysis::Document;

/// Method name the reload is scheduled under.
pub const RELOAD_METHOD: &str = "steward/reloadSolution";

/// Called by the store when the reload deadline expires.
///
/// Runs on the store thread, so implementations must hand the work off
/// rather than wait for admission themselves.
pub trait SolutionReloader: Send {
    /// Start a reload with the settings current at expiry.
    fn reload(&mut self, settings: Arc<Settings>);
}

/// A reloader that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReload;

impl SolutionReloader for NoReload {
    fn reload(&mut self, _settings: Arc<Settings>) {}
}

/// Reloads workspace files through the analysis provider.
pub struct WorkspaceReloader {
    services: Services,
    fallback_root: Option<PathBuf>,
}

impl WorkspaceReloader {
    /// `fallback_root` is used when the settings name no solution.
    pub fn new(services: Services, fallback_root: Option<PathBuf>) -> Self {
        Self {
            services,
            fallback_root,
        }
    }
}

impl SolutionReloader for WorkspaceReloader {
    fn reload(&mut self, settings: Arc<Settings>) {
        let services = self.services.clone();
        let fallback_root = self.fallback_root.clone();
        let spawned = thread::Builder::new()
            .name("solution-reload".to_string())
            .spawn(move || {
                if let Err(e) = reload_solution(&services, &settings, fallback_root) {
                    tracing::warn!("Solution reload failed: {}", e);
                }
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to start solution reload: {}", e);
        }
    }
}

/// Replace the snapshot's source documents with the workspace on disk.
///
/// Runs as an exclusive request. Open documents keep their editor content.
pub fn reload_solution(
    services: &Services,
    settings: &Settings,
    fallback_root: Option<PathBuf>,
) -> Result<usize, RequestError> {
    let pending = services
        .store
        .start_request(RELOAD_METHOD, RequestMode::Exclusive, PRIORITY_DEFAULT)?;

    dispatch::run(services, pending, &CancelToken::new(), RELOAD_METHOD, |ctx| {
        let Some(root) = settings.workspace_root(fallback_root.as_deref()) else {
            tracing::info!("No workspace root; nothing to load");
            return Ok(0);
        };

        let files = ctx
            .provider()
            .load_workspace(&root, &settings.source_extensions)
            .map_err(|e| RequestError::Internal(e.to_string()))?;

        let view = ctx.view();
        let loaded_at = Instant::now();
        #[allow(clippy::mutable_key_type)]
        let mut documents: HashMap<_, _> = files
            .into_iter()
            .filter_map(|(path, text)| {
                path_to_uri(&path).map(|uri| (uri, Document::new(&text, None, loaded_at)))
            })
            .collect();
        for uri in view.open_docs.keys() {
            if let Some(open) = view.snapshot.document(uri) {
                documents.insert(uri.clone(), Document::clone(open));
            }
        }

        let count = documents.len();
        ctx.store()
            .apply_snapshot_change(view.snapshot.with_workspace(Some(root.clone()), documents))?;
        ctx.diagnostics().backlog_update();
        tracing::info!("Loaded {} documents from {}", count, root.display());
        Ok(count)
    })
}
