//! LSP request and notification handlers.
//!
//! Every handler runs while admitted by the scheduler and reads the
//! snapshot captured at admission. Handlers for exclusive methods derive a
//! new snapshot from it and post the change back to the store.

pub mod documents;
pub mod editing;
pub mod navigation;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::ClientHandle;
    use crate::diagnostics::{DiagnosticsEvent, DiagnosticsHandle};
    use crate::dispatch::{self, RequestContext, Services};
    use crate::error::RequestError;
    use crate::reload::SolutionReloader;
    use crate::request::{CancelToken, RequestMode};
    use crate::settings::Settings;
    use crate::state::{spawn_store, ServerState, StoreHandle};
    use crossbeam_channel::Receiver;
    use lsp_server::Message;
    use lsp_types::Uri;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use steward_analysis::{Document, TextAnalysis};

    /// Records the settings of every reload the store starts.
    #[derive(Clone, Default)]
    pub struct RecordingReloader(Arc<Mutex<Vec<Arc<Settings>>>>);

    impl SolutionReloader for RecordingReloader {
        fn reload(&mut self, settings: Arc<Settings>) {
            self.0.lock().push(settings);
        }
    }

    pub struct Harness {
        pub services: Services,
        pub events: Receiver<DiagnosticsEvent>,
        pub sent: Receiver<Message>,
        reloads: RecordingReloader,
    }

    impl Harness {
        pub fn new() -> Self {
            let reloads = RecordingReloader::default();
            let (store, receiver) = StoreHandle::channel();
            spawn_store(
                ServerState::new(Box::new(reloads.clone()), Duration::from_secs(30)),
                receiver,
            )
            .unwrap();
            let (diagnostics, events) = DiagnosticsHandle::channel();
            let (client, sent) = ClientHandle::channel();
            Self {
                services: Services {
                    client,
                    store,
                    diagnostics,
                    provider: Arc::new(TextAnalysis::new()),
                },
                events,
                sent,
                reloads,
            }
        }

        /// Let any armed reload expire and return how many reloads ran.
        pub fn reloads_after_debounce(&self) -> usize {
            let store = &self.services.store;
            store.periodic_tick(Instant::now() + Duration::from_secs(3600)).unwrap();
            // Round-trip so the tick has been handled.
            store.state_view().unwrap();
            self.reloads.0.lock().len()
        }

        pub fn run<T>(
            &self,
            mode: RequestMode,
            handler: impl FnOnce(&RequestContext<'_>) -> Result<T, RequestError>,
        ) -> Result<T, RequestError> {
            let pending = self.services.store.start_request("test", mode, 0).unwrap();
            dispatch::run(&self.services, pending, &CancelToken::new(), "test", handler)
        }

        pub fn put(&self, uri: &Uri, text: &str) {
            let snapshot = self.services.store.snapshot().unwrap();
            let next = snapshot.with_document(uri.clone(), Document::new(text, Some(1), Instant::now()));
            self.services.store.apply_snapshot_change(next).unwrap();
        }

        pub fn text(&self, uri: &Uri) -> Option<String> {
            self.services
                .store
                .snapshot()
                .unwrap()
                .document(uri)
                .map(|doc| doc.text())
        }
    }

    pub fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }
}
