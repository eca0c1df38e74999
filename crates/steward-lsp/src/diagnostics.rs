//! Debounced diagnostics pipeline.
//!
//! A single thread consumes [`DiagnosticsEvent`]s. Changes only mark a
//! document pending; the periodic tick recomputes documents that have been
//! stable for the settle window, oldest change first. Results computed from
//! content that changed again in the meantime are thrown away.

use crate::client::ClientHandle;
use crate::error::StoreError;
use crate::settings::ServerTuning;
use crate::state::StoreHandle;
use crossbeam_channel::{unbounded, Receiver, Sender};
use lsp_types::notification::PublishDiagnostics;
use lsp_types::{Diagnostic, PublishDiagnosticsParams, Uri};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use steward_analysis::{AnalysisProvider, Snapshot};

/// Messages consumed by the pipeline.
#[derive(Debug, Clone)]
pub enum DiagnosticsEvent {
    /// A document was opened or its content changed.
    DocumentChanged {
        /// The document.
        uri: Uri,
        /// When the new content was applied.
        changed_at: Instant,
    },
    /// The client closed the document.
    DocumentClosed(Uri),
    /// The document left the workspace.
    DocumentRemoved(Uri),
    /// Something outside the documents changed; recompute everything tracked.
    BacklogUpdate,
    /// Clock tick: recompute documents that have settled.
    ProcessPending(Instant),
    /// Stop the pipeline thread.
    Shutdown,
}

/// Where the pipeline reads snapshots from.
pub trait SnapshotSource: Send {
    /// The current snapshot.
    fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError>;
}

impl SnapshotSource for StoreHandle {
    fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        StoreHandle::snapshot(self)
    }
}

/// Where computed diagnostics go.
pub trait DiagnosticsSink: Send {
    /// Publish diagnostics for a document, replacing any previous set.
    fn publish(&self, uri: Uri, diagnostics: Vec<Diagnostic>, version: Option<i32>);
}

/// Publishes as `textDocument/publishDiagnostics` notifications.
impl DiagnosticsSink for ClientHandle {
    fn publish(&self, uri: Uri, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.send_notification::<PublishDiagnostics>(PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        });
    }
}

/// Cloneable handle for posting to the pipeline.
#[derive(Debug, Clone)]
pub struct DiagnosticsHandle {
    sender: Sender<DiagnosticsEvent>,
}

impl DiagnosticsHandle {
    /// Create a handle and the receiver the pipeline will drain.
    pub fn channel() -> (Self, Receiver<DiagnosticsEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn post(&self, event: DiagnosticsEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// A document was opened or changed at `changed_at`.
    pub fn document_changed(&self, uri: Uri, changed_at: Instant) {
        if !self.post(DiagnosticsEvent::DocumentChanged { uri, changed_at }) {
            tracing::debug!("Diagnostics pipeline gone, dropping change");
        }
    }

    /// The client closed a document.
    pub fn document_closed(&self, uri: Uri) {
        if !self.post(DiagnosticsEvent::DocumentClosed(uri)) {
            tracing::debug!("Diagnostics pipeline gone, dropping close");
        }
    }

    /// A document left the workspace.
    pub fn document_removed(&self, uri: Uri) {
        if !self.post(DiagnosticsEvent::DocumentRemoved(uri)) {
            tracing::debug!("Diagnostics pipeline gone, dropping removal");
        }
    }

    /// Recompute every tracked document.
    pub fn backlog_update(&self) {
        if !self.post(DiagnosticsEvent::BacklogUpdate) {
            tracing::debug!("Diagnostics pipeline gone, dropping backlog update");
        }
    }

    /// Deliver a clock tick. Returns `false` once the pipeline is gone.
    pub fn process_pending(&self, now: Instant) -> bool {
        self.post(DiagnosticsEvent::ProcessPending(now))
    }

    /// Stop the pipeline after already-posted events.
    pub fn shutdown(&self) {
        let _ = self.post(DiagnosticsEvent::Shutdown);
    }
}

#[derive(Debug, Clone, Copy)]
struct DocumentState {
    last_change: Instant,
    last_processed: Option<Instant>,
}

impl DocumentState {
    fn is_pending(&self) -> bool {
        self.last_processed
            .map_or(true, |processed| self.last_change > processed)
    }
}

/// The pipeline worker.
pub struct DiagnosticsPipeline {
    receiver: Receiver<DiagnosticsEvent>,
    #[allow(clippy::mutable_key_type)]
    documents: HashMap<Uri, DocumentState>,
    snapshots: Box<dyn SnapshotSource>,
    provider: Arc<dyn AnalysisProvider>,
    sink: Box<dyn DiagnosticsSink>,
    settle: Duration,
    backlog: usize,
    stopped: bool,
}

impl DiagnosticsPipeline {
    /// Create a pipeline draining `receiver`.
    pub fn new(
        receiver: Receiver<DiagnosticsEvent>,
        snapshots: Box<dyn SnapshotSource>,
        provider: Arc<dyn AnalysisProvider>,
        sink: Box<dyn DiagnosticsSink>,
        tuning: &ServerTuning,
    ) -> Self {
        Self {
            receiver,
            documents: HashMap::new(),
            snapshots,
            provider,
            sink,
            settle: tuning.diagnostics_settle,
            backlog: tuning.diagnostics_backlog,
            stopped: false,
        }
    }

    /// Run the pipeline on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("diagnostics".to_string())
            .spawn(move || self.run())
    }

    /// Process events until shutdown or until every handle is dropped.
    pub fn run(mut self) {
        tracing::debug!("Diagnostics pipeline started");
        while !self.stopped {
            match self.receiver.recv() {
                Ok(event) => self.handle(event),
                Err(_) => break,
            }
        }
        tracing::debug!("Diagnostics pipeline stopped");
    }

    fn handle(&mut self, event: DiagnosticsEvent) {
        match event {
            DiagnosticsEvent::ProcessPending(now) => self.process_pending(now),
            other => self.apply(other),
        }
    }

    /// Apply an event that only touches bookkeeping.
    fn apply(&mut self, event: DiagnosticsEvent) {
        match event {
            DiagnosticsEvent::DocumentChanged { uri, changed_at } => {
                let state = self.documents.entry(uri).or_insert(DocumentState {
                    last_change: changed_at,
                    last_processed: None,
                });
                state.last_change = state.last_change.max(changed_at);
            }
            DiagnosticsEvent::DocumentClosed(uri) | DiagnosticsEvent::DocumentRemoved(uri) => {
                self.documents.remove(&uri);
                self.sink.publish(uri, Vec::new(), None);
            }
            DiagnosticsEvent::BacklogUpdate => {
                for state in self.documents.values_mut() {
                    state.last_processed = None;
                }
            }
            // Coalesced into the pass that is already running.
            DiagnosticsEvent::ProcessPending(_) => {}
            DiagnosticsEvent::Shutdown => self.stopped = true,
        }
    }

    /// Fold events that arrived while computing into the bookkeeping.
    fn absorb_queued(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.apply(event);
        }
    }

    fn process_pending(&mut self, now: Instant) {
        let queued = self.receiver.len();
        if queued > self.backlog {
            tracing::debug!("Diagnostics behind by {} events, draining first", queued);
            return;
        }

        let mut due: Vec<(Uri, Instant)> = self
            .documents
            .iter()
            .filter(|(_, state)| {
                state.is_pending() && now.saturating_duration_since(state.last_change) >= self.settle
            })
            .map(|(uri, state)| (uri.clone(), state.last_change))
            .collect();
        if due.is_empty() {
            return;
        }
        due.sort_by_key(|(_, changed)| *changed);

        let snapshot = match self.snapshots.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Skipping diagnostics: {}", e);
                return;
            }
        };

        for (uri, last_change) in due {
            if self.stopped {
                break;
            }
            self.recompute(&snapshot, uri, last_change);
        }
    }

    fn recompute(&mut self, snapshot: &Snapshot, uri: Uri, last_change: Instant) {
        let Some(document) = snapshot.document(&uri) else {
            tracing::debug!("{} not in snapshot yet", uri.as_str());
            return;
        };
        let computed_from = document.changed_at();
        if computed_from < last_change {
            tracing::debug!("Snapshot predates latest change to {}", uri.as_str());
            return;
        }

        let result = self.provider.diagnostics(snapshot, &uri);
        self.absorb_queued();

        let Some(state) = self.documents.get_mut(&uri) else {
            tracing::debug!("{} closed while computing diagnostics", uri.as_str());
            return;
        };
        if state.last_change > computed_from {
            tracing::debug!("Discarding stale diagnostics for {}", uri.as_str());
            return;
        }
        state.last_processed = Some(computed_from);

        match result {
            Ok(diagnostics) => {
                tracing::debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri.as_str());
                self.sink.publish(uri, diagnostics, document.version());
            }
            Err(e) => tracing::warn!("Diagnostics failed for {}: {}", uri.as_str(), e),
        }
    }
}
