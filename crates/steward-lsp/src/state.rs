//! The state store: a single thread that owns all mutable server state.
//!
//! Every mutation is a [`StoreEvent`] posted to the store's channel and
//! applied in post order. Readers get `Arc` views, never references into
//! the store itself.

use crate::error::StoreError;
use crate::reload::SolutionReloader;
use crate::request::{PendingRequest, QueuedRequest, RequestGuard, RequestId, RequestMode};
use crate::scheduler::Scheduler;
use crate::settings::Settings;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use lsp_types::{ClientCapabilities, Uri};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use steward_analysis::Snapshot;

/// Client document versions by URI.
#[allow(clippy::mutable_key_type)]
pub type OpenDocVersions = HashMap<Uri, i32>;

/// Messages consumed by the store, one at a time.
#[derive(Debug)]
pub enum StoreEvent {
    /// Replace the current snapshot.
    ApplySnapshotChange(Arc<Snapshot>),
    /// Replace the client capabilities.
    SetClientCapabilities(ClientCapabilities),
    /// Replace the settings.
    SetSettings(Settings),
    /// Record the client version of an open document.
    AddOpenDocVersion {
        /// The document.
        uri: Uri,
        /// Its client version.
        version: i32,
    },
    /// Forget an open document.
    RemoveOpenDocVersion(Uri),
    /// Register a request with the scheduler.
    StartRequest {
        /// Server-side id.
        id: RequestId,
        /// Method name, for logging.
        name: String,
        /// Shared or exclusive.
        mode: RequestMode,
        /// Larger runs earlier.
        priority: i32,
        /// Receives the id on admission.
        gate: Sender<RequestId>,
        /// When the request arrived.
        started_at: Instant,
    },
    /// Release or withdraw a request.
    FinishRequest(RequestId),
    /// Reply with the current snapshot.
    GetSnapshotView(Sender<Arc<Snapshot>>),
    /// Reply with the snapshot and bookkeeping.
    GetStateView(Sender<StateView>),
    /// Arm or reset the solution reload deadline.
    RequestSolutionReload {
        /// Debounce window.
        window: Duration,
        /// When the reload was requested.
        requested_at: Instant,
    },
    /// Clock tick from the ticker.
    PeriodicTick(Instant),
    /// Stop the store thread.
    Shutdown,
}

/// A consistent read of the store's state.
#[derive(Debug, Clone)]
pub struct StateView {
    /// The current snapshot.
    pub snapshot: Arc<Snapshot>,
    /// The current settings.
    pub settings: Arc<Settings>,
    /// Capabilities captured at initialization.
    pub capabilities: Arc<ClientCapabilities>,
    /// Documents the client has open.
    pub open_docs: Arc<OpenDocVersions>,
}

/// Everything the store owns.
pub struct ServerState {
    snapshot: Arc<Snapshot>,
    settings: Arc<Settings>,
    capabilities: Arc<ClientCapabilities>,
    open_docs: Arc<OpenDocVersions>,
    scheduler: Scheduler,
    reload_deadline: Option<Instant>,
    reloader: Box<dyn SolutionReloader>,
    long_running_threshold: Duration,
}

impl ServerState {
    /// Create the initial state.
    pub fn new(reloader: Box<dyn SolutionReloader>, long_running_threshold: Duration) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty()),
            settings: Arc::new(Settings::default()),
            capabilities: Arc::new(ClientCapabilities::default()),
            open_docs: Arc::new(OpenDocVersions::new()),
            scheduler: Scheduler::new(),
            reload_deadline: None,
            reloader,
            long_running_threshold,
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The pending reload deadline.
    pub fn reload_deadline(&self) -> Option<Instant> {
        self.reload_deadline
    }

    /// Documents the client has open.
    pub fn open_docs(&self) -> &OpenDocVersions {
        &self.open_docs
    }

    fn view(&self) -> StateView {
        StateView {
            snapshot: Arc::clone(&self.snapshot),
            settings: Arc::clone(&self.settings),
            capabilities: Arc::clone(&self.capabilities),
            open_docs: Arc::clone(&self.open_docs),
        }
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: StoreEvent) -> ControlFlow<()> {
        match event {
            StoreEvent::ApplySnapshotChange(snapshot) => {
                tracing::debug!(
                    "Snapshot revision {} -> {}",
                    self.snapshot.revision(),
                    snapshot.revision()
                );
                self.snapshot = snapshot;
            }
            StoreEvent::SetClientCapabilities(capabilities) => {
                self.capabilities = Arc::new(capabilities);
            }
            StoreEvent::SetSettings(settings) => {
                tracing::debug!("Settings replaced: {:?}", settings);
                self.settings = Arc::new(settings);
            }
            StoreEvent::AddOpenDocVersion { uri, version } => {
                Arc::make_mut(&mut self.open_docs).insert(uri, version);
            }
            StoreEvent::RemoveOpenDocVersion(uri) => {
                Arc::make_mut(&mut self.open_docs).remove(&uri);
            }
            StoreEvent::StartRequest {
                id,
                name,
                mode,
                priority,
                gate,
                started_at,
            } => {
                tracing::debug!("Start {} {} ({:?}, priority {})", id, name, mode, priority);
                match self.scheduler.start(id, name, mode, priority, gate, started_at) {
                    Ok(admitted) => self.log_admitted(&admitted),
                    Err(e) => tracing::error!("Scheduler invariant violated: {}", e),
                }
            }
            StoreEvent::FinishRequest(id) => match self.scheduler.finish(id) {
                Ok(admitted) => {
                    tracing::debug!("Finish {}", id);
                    self.log_admitted(&admitted);
                }
                Err(e) => tracing::error!("Scheduler invariant violated: {}", e),
            },
            StoreEvent::GetSnapshotView(reply) => {
                let _ = reply.send(Arc::clone(&self.snapshot));
            }
            StoreEvent::GetStateView(reply) => {
                let _ = reply.send(self.view());
            }
            StoreEvent::RequestSolutionReload {
                window,
                requested_at,
            } => {
                let deadline = requested_at + window;
                if self.reload_deadline.is_some() {
                    tracing::debug!("Solution reload deferred by {:?}", window);
                } else {
                    tracing::debug!("Solution reload scheduled in {:?}", window);
                }
                self.reload_deadline = Some(deadline);
            }
            StoreEvent::PeriodicTick(now) => self.on_tick(now),
            StoreEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn log_admitted(&self, admitted: &[RequestId]) {
        for id in admitted {
            tracing::debug!(
                "Admit {} (shared: {}, exclusive: {:?})",
                id,
                self.scheduler.shared_count(),
                self.scheduler.exclusive_holder()
            );
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.reload_deadline.is_some_and(|deadline| now >= deadline) {
            self.reload_deadline = None;
            tracing::info!("Reloading solution");
            self.reloader.reload(Arc::clone(&self.settings));
        }

        for request in self
            .scheduler
            .long_running(now, self.long_running_threshold)
        {
            let status = if self.scheduler.is_admitted(request.id) {
                "running"
            } else {
                "queued"
            };
            tracing::warn!(
                "Request {} ({}) has been {} for {:?}",
                request.id,
                request.name,
                status,
                request.elapsed
            );
        }
    }
}

/// Cloneable handle for posting to the store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    sender: Sender<StoreEvent>,
    next_id: Arc<AtomicU64>,
}

impl StoreHandle {
    /// Create a handle and the receiver the store thread will drain.
    pub fn channel() -> (Self, Receiver<StoreEvent>) {
        let (sender, receiver) = unbounded();
        let handle = Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (handle, receiver)
    }

    fn post(&self, event: StoreEvent) -> Result<(), StoreError> {
        self.sender.send(event).map_err(|_| StoreError)
    }

    /// Replace the snapshot.
    pub fn apply_snapshot_change(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.post(StoreEvent::ApplySnapshotChange(Arc::new(snapshot)))
    }

    /// Replace the client capabilities.
    pub fn set_client_capabilities(&self, capabilities: ClientCapabilities) -> Result<(), StoreError> {
        self.post(StoreEvent::SetClientCapabilities(capabilities))
    }

    /// Replace the settings.
    pub fn set_settings(&self, settings: Settings) -> Result<(), StoreError> {
        self.post(StoreEvent::SetSettings(settings))
    }

    /// Record an open document's client version.
    pub fn add_open_doc_version(&self, uri: Uri, version: i32) -> Result<(), StoreError> {
        self.post(StoreEvent::AddOpenDocVersion { uri, version })
    }

    /// Forget an open document.
    pub fn remove_open_doc_version(&self, uri: Uri) -> Result<(), StoreError> {
        self.post(StoreEvent::RemoveOpenDocVersion(uri))
    }

    /// Register a request. Admission is awaited with [`PendingRequest::wait`].
    ///
    /// Registration is posted immediately, so requests started from one
    /// thread are queued in call order.
    pub fn start_request(
        &self,
        name: &str,
        mode: RequestMode,
        priority: i32,
    ) -> Result<PendingRequest, StoreError> {
        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (gate, admitted) = bounded(1);
        self.post(StoreEvent::StartRequest {
            id,
            name: name.to_string(),
            mode,
            priority,
            gate,
            started_at: Instant::now(),
        })?;
        let guard = RequestGuard::new(id, self.sender.clone());
        Ok(PendingRequest::new(id, mode, admitted, guard))
    }

    /// Register a request whose admission is announced on `admissions`.
    ///
    /// Unlike [`start_request`](Self::start_request) nothing blocks while the
    /// request is queued; the caller matches ids arriving on `admissions`
    /// and calls [`QueuedRequest::admit`].
    pub fn start_queued(
        &self,
        name: &str,
        mode: RequestMode,
        priority: i32,
        admissions: &Sender<RequestId>,
    ) -> Result<QueuedRequest, StoreError> {
        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.post(StoreEvent::StartRequest {
            id,
            name: name.to_string(),
            mode,
            priority,
            gate: admissions.clone(),
            started_at: Instant::now(),
        })?;
        Ok(QueuedRequest::new(id, mode, RequestGuard::new(id, self.sender.clone())))
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        let (reply, response) = bounded(1);
        self.post(StoreEvent::GetSnapshotView(reply))?;
        response.recv().map_err(|_| StoreError)
    }

    /// The current snapshot together with settings and open documents.
    pub fn state_view(&self) -> Result<StateView, StoreError> {
        let (reply, response) = bounded(1);
        self.post(StoreEvent::GetStateView(reply))?;
        response.recv().map_err(|_| StoreError)
    }

    /// Arm or reset the solution reload deadline.
    pub fn request_solution_reload(&self, window: Duration) -> Result<(), StoreError> {
        self.post(StoreEvent::RequestSolutionReload {
            window,
            requested_at: Instant::now(),
        })
    }

    /// Deliver a clock tick.
    pub fn periodic_tick(&self, now: Instant) -> Result<(), StoreError> {
        self.post(StoreEvent::PeriodicTick(now))
    }

    /// Stop the store thread after already-posted events.
    pub fn shutdown(&self) -> Result<(), StoreError> {
        self.post(StoreEvent::Shutdown)
    }
}

/// Run the store on its own thread.
pub fn spawn_store(
    mut state: ServerState,
    receiver: Receiver<StoreEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("state-store".to_string())
        .spawn(move || {
            tracing::debug!("State store started");
            for event in receiver {
                if state.handle_event(event).is_break() {
                    break;
                }
            }
            tracing::debug!("State store stopped");
        })
}
