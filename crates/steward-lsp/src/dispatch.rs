//! Running a handler under an admission token.

use crate::client::ClientHandle;
use crate::diagnostics::DiagnosticsHandle;
use crate::error::RequestError;
use crate::request::{Admission, CancelToken, PendingRequest};
use crate::state::{StateView, StoreHandle};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use steward_analysis::{AnalysisProvider, AnalysisResult, Snapshot};

/// Handles shared by every request.
#[derive(Clone)]
pub struct Services {
    /// Server-initiated messages to the client.
    pub client: ClientHandle,
    /// The state store.
    pub store: StoreHandle,
    /// The diagnostics pipeline.
    pub diagnostics: DiagnosticsHandle,
    /// Language analysis.
    pub provider: Arc<dyn AnalysisProvider>,
}

/// What a handler sees while admitted.
pub struct RequestContext<'a> {
    services: &'a Services,
    view: StateView,
    cancel: &'a CancelToken,
}

impl RequestContext<'_> {
    /// The snapshot current at admission. Stable for the whole request.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.view.snapshot
    }

    /// Snapshot, settings and open documents at admission.
    pub fn view(&self) -> &StateView {
        &self.view
    }

    /// The analysis provider.
    pub fn provider(&self) -> &dyn AnalysisProvider {
        self.services.provider.as_ref()
    }

    /// The state store.
    pub fn store(&self) -> &StoreHandle {
        &self.services.store
    }

    /// Server-initiated messages to the client.
    pub fn client(&self) -> &ClientHandle {
        &self.services.client
    }

    /// The diagnostics pipeline.
    pub fn diagnostics(&self) -> &DiagnosticsHandle {
        &self.services.diagnostics
    }

    /// Fail early if the client cancelled.
    pub fn check_cancelled(&self) -> Result<(), RequestError> {
        self.cancel.check()
    }
}

/// Treat a provider failure as "no result".
pub fn or_absent<T: Default>(method: &str, result: AnalysisResult<T>) -> T {
    result.unwrap_or_else(|e| {
        tracing::debug!("{}: {}", method, e);
        T::default()
    })
}

/// Wait for admission, then run `handler` against the state current at
/// admission.
///
/// The admission slot is released on every path out, including a panic in
/// the handler, which is reported as an internal error.
pub fn run<T>(
    services: &Services,
    pending: PendingRequest,
    cancel: &CancelToken,
    method: &str,
    handler: impl FnOnce(&RequestContext<'_>) -> Result<T, RequestError>,
) -> Result<T, RequestError> {
    let admission = pending.wait(cancel)?;
    run_admitted(services, admission, cancel, method, handler)
}

/// Run `handler` for a request the store has already admitted.
pub fn run_admitted<T>(
    services: &Services,
    admission: Admission,
    cancel: &CancelToken,
    method: &str,
    handler: impl FnOnce(&RequestContext<'_>) -> Result<T, RequestError>,
) -> Result<T, RequestError> {
    cancel.check()?;
    let view = services.store.state_view()?;
    let ctx = RequestContext {
        services,
        view,
        cancel,
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(&ctx))).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!("{} panicked: {}", method, message);
        Err(RequestError::Internal(format!("{method} panicked: {message}")))
    });
    drop(admission);

    match result {
        Ok(_) if cancel.is_cancelled() => Err(RequestError::Cancelled),
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
