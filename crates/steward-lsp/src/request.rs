//! Request identity, classification, cancellation and admission guards.

use crate::error::RequestError;
use crate::state::StoreEvent;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Priority for ordinary requests.
pub const PRIORITY_DEFAULT: i32 = 0;

/// Priority for polling requests that should not trail behind a queue of
/// ordinary reads.
pub const PRIORITY_ELEVATED: i32 = 1;

/// Server-side identity of a scheduled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a request touches shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMode {
    /// Read-only; runs alongside other shared requests.
    Shared,
    /// Mutates state; runs alone.
    Exclusive,
}

/// Cooperative cancellation flag shared between the main loop and a handler.
///
/// Cancelling drops the trigger side of a channel, so a handler blocked in
/// [`PendingRequest::wait`] wakes up immediately.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Cancel; idempotent.
    pub fn cancel(&self) {
        self.inner.trigger.lock().take();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.trigger.lock().is_none()
    }

    /// Fail with [`RequestError::Cancelled`] if cancelled.
    pub fn check(&self) -> Result<(), RequestError> {
        if self.is_cancelled() {
            Err(RequestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Posts `FinishRequest` exactly once, when dropped.
///
/// Every path out of a request (success, error, cancellation, panic
/// unwinding) drops the guard, so the admission slot cannot leak.
#[derive(Debug)]
pub(crate) struct RequestGuard {
    id: RequestId,
    store: Sender<StoreEvent>,
}

impl RequestGuard {
    pub(crate) fn new(id: RequestId, store: Sender<StoreEvent>) -> Self {
        Self { id, store }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.store.send(StoreEvent::FinishRequest(self.id)).is_err() {
            tracing::debug!("Store gone, dropping finish for request {}", self.id);
        }
    }
}

/// A registered request waiting for admission.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    mode: RequestMode,
    gate: Receiver<RequestId>,
    guard: RequestGuard,
}

impl PendingRequest {
    pub(crate) fn new(
        id: RequestId,
        mode: RequestMode,
        gate: Receiver<RequestId>,
        guard: RequestGuard,
    ) -> Self {
        Self {
            id,
            mode,
            gate,
            guard,
        }
    }

    /// The request id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The request classification.
    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    /// Block until the store admits this request or `cancel` fires.
    ///
    /// On cancellation the pending request is dropped, which withdraws it
    /// from the store's queue.
    pub fn wait(self, cancel: &CancelToken) -> Result<Admission, RequestError> {
        cancel.check()?;

        let Self {
            id,
            mode,
            gate,
            guard,
        } = self;

        select! {
            recv(gate) -> msg => match msg {
                Ok(_) => Ok(Admission { id, mode, _guard: guard }),
                Err(_) => Err(RequestError::Internal(format!("admission gate for {id} closed"))),
            },
            recv(cancel.inner.signal) -> _ => Err(RequestError::Cancelled),
        }
    }
}

/// A registered request whose admission is announced on a shared channel
/// instead of being waited for.
///
/// Dropping it before [`admit`](Self::admit) withdraws the request.
#[derive(Debug)]
pub struct QueuedRequest {
    id: RequestId,
    mode: RequestMode,
    guard: RequestGuard,
}

impl QueuedRequest {
    pub(crate) fn new(id: RequestId, mode: RequestMode, guard: RequestGuard) -> Self {
        Self { id, mode, guard }
    }

    /// The request id, as it will arrive on the admissions channel.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The request classification.
    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    /// Turn into an admission once the store has announced this id.
    pub fn admit(self) -> Admission {
        Admission {
            id: self.id,
            mode: self.mode,
            _guard: self.guard,
        }
    }
}

/// Proof of admission; releases the slot when dropped.
#[derive(Debug)]
pub struct Admission {
    id: RequestId,
    mode: RequestMode,
    _guard: RequestGuard,
}

impl Admission {
    /// The admitted request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The request classification.
    pub fn mode(&self) -> RequestMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn pending(mode: RequestMode) -> (PendingRequest, Sender<RequestId>, Receiver<StoreEvent>) {
        let (store_tx, store_rx) = unbounded();
        let (gate_tx, gate_rx) = bounded(1);
        let id = RequestId::new(7);
        let pending = PendingRequest::new(id, mode, gate_rx, RequestGuard::new(id, store_tx));
        (pending, gate_tx, store_rx)
    }

    fn finishes(rx: &Receiver<StoreEvent>) -> usize {
        rx.try_iter()
            .filter(|e| matches!(e, StoreEvent::FinishRequest(_)))
            .count()
    }

    #[test]
    fn test_admission_releases_once_on_drop() {
        let (pending, gate, store) = pending(RequestMode::Shared);
        gate.send(RequestId::new(7)).unwrap();

        let admission = pending.wait(&CancelToken::new()).unwrap();
        assert_eq!(finishes(&store), 0);
        drop(admission);
        assert_eq!(finishes(&store), 1);
    }

    #[test]
    fn test_cancel_while_waiting_releases() {
        let (pending, _gate, store) = pending(RequestMode::Exclusive);
        let cancel = CancelToken::new();

        let waiter = {
            let cancel = cancel.clone();
            std::thread::spawn(move || pending.wait(&cancel))
        };
        cancel.cancel();

        assert_eq!(waiter.join().unwrap().unwrap_err(), RequestError::Cancelled);
        assert_eq!(finishes(&store), 1);
    }

    #[test]
    fn test_already_cancelled_token() {
        let (pending, gate, store) = pending(RequestMode::Shared);
        gate.send(RequestId::new(7)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        cancel.cancel();

        assert!(cancel.is_cancelled());
        assert_eq!(pending.wait(&cancel).unwrap_err(), RequestError::Cancelled);
        assert_eq!(finishes(&store), 1);
    }

    #[test]
    fn test_queued_request_releases_once() {
        let (store_tx, store_rx) = unbounded();
        let id = RequestId::new(3);

        let withdrawn = QueuedRequest::new(id, RequestMode::Shared, RequestGuard::new(id, store_tx.clone()));
        drop(withdrawn);
        assert_eq!(finishes(&store_rx), 1);

        let queued = QueuedRequest::new(id, RequestMode::Exclusive, RequestGuard::new(id, store_tx));
        let admission = queued.admit();
        assert_eq!(admission.mode(), RequestMode::Exclusive);
        assert_eq!(finishes(&store_rx), 0);
        drop(admission);
        assert_eq!(finishes(&store_rx), 1);
    }
}
