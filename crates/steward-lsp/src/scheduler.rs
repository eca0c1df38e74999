//! Admission bookkeeping for in-flight requests.
//!
//! The scheduler is plain data owned by the state store thread. It decides
//! which registered requests may run and opens their admission gates; it
//! never blocks.
//!
//! Ordering rules:
//!
//! - Any number of shared requests run together while no exclusive request
//!   holds the server.
//! - An exclusive request runs alone.
//! - Among eligible requests, higher priority goes first, then arrival order.
//! - A request never overtakes an exclusive request that arrived before it,
//!   so a stream of shared reads cannot starve a waiting writer.

use crate::request::{RequestId, RequestMode};
use crossbeam_channel::Sender;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Bookkeeping failures. Both indicate a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// `finish` for an id that was never started or already finished.
    #[error("request {0} is not known to the scheduler")]
    UnknownRequest(RequestId),
    /// `start` for an id that is already registered.
    #[error("request {0} was started twice")]
    DuplicateRequest(RequestId),
}

/// (exclusive requests queued before, higher priority first, arrival)
type QueueKey = (u64, Reverse<i32>, u64);

#[derive(Debug)]
struct Entry {
    name: String,
    mode: RequestMode,
    admitted: bool,
    gate: Option<Sender<RequestId>>,
    key: QueueKey,
    started_at: Instant,
    reported: bool,
}

/// A request that has been running longer than the warning threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRunning {
    /// The request.
    pub id: RequestId,
    /// Its method name.
    pub name: String,
    /// How long it has been in flight.
    pub elapsed: Duration,
}

/// Shared/exclusive admission queue.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: HashMap<RequestId, Entry>,
    queue: BTreeMap<QueueKey, RequestId>,
    epoch: u64,
    seq: u64,
    shared: HashSet<RequestId>,
    exclusive: Option<RequestId>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and admit whatever has become eligible.
    ///
    /// `gate` receives the request's id once, when it is admitted. Several
    /// requests may share one gate. Returns the
    /// ids admitted by this call.
    pub fn start(
        &mut self,
        id: RequestId,
        name: impl Into<String>,
        mode: RequestMode,
        priority: i32,
        gate: Sender<RequestId>,
        now: Instant,
    ) -> Result<Vec<RequestId>, SchedulerError> {
        if self.entries.contains_key(&id) {
            return Err(SchedulerError::DuplicateRequest(id));
        }

        let key = (self.epoch, Reverse(priority), self.seq);
        self.seq += 1;
        if mode == RequestMode::Exclusive {
            self.epoch += 1;
        }

        self.entries.insert(
            id,
            Entry {
                name: name.into(),
                mode,
                admitted: false,
                gate: Some(gate),
                key,
                started_at: now,
                reported: false,
            },
        );
        self.queue.insert(key, id);

        Ok(self.pump())
    }

    /// Release a request's slot, or withdraw it if it was still queued.
    ///
    /// Returns the ids admitted as a consequence.
    pub fn finish(&mut self, id: RequestId) -> Result<Vec<RequestId>, SchedulerError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(SchedulerError::UnknownRequest(id))?;

        if entry.admitted {
            match entry.mode {
                RequestMode::Shared => {
                    self.shared.remove(&id);
                }
                RequestMode::Exclusive => {
                    debug_assert_eq!(self.exclusive, Some(id));
                    self.exclusive = None;
                }
            }
        } else {
            self.queue.remove(&entry.key);
        }

        Ok(self.pump())
    }

    fn pump(&mut self) -> Vec<RequestId> {
        let mut admitted = Vec::new();

        while let Some((&key, &id)) = self.queue.first_key_value() {
            let Some(entry) = self.entries.get_mut(&id) else {
                debug_assert!(false, "queued request {id} has no entry");
                self.queue.remove(&key);
                continue;
            };

            let eligible = match entry.mode {
                RequestMode::Shared => self.exclusive.is_none(),
                RequestMode::Exclusive => self.exclusive.is_none() && self.shared.is_empty(),
            };
            if !eligible {
                break;
            }

            self.queue.remove(&key);
            entry.admitted = true;
            match entry.mode {
                RequestMode::Shared => {
                    self.shared.insert(id);
                }
                RequestMode::Exclusive => self.exclusive = Some(id),
            }
            // The waiter may already be gone (cancelled); its finish follows.
            if let Some(gate) = entry.gate.take() {
                let _ = gate.try_send(id);
            }
            admitted.push(id);
        }

        debug_assert!(self.exclusive.is_none() || self.shared.is_empty());
        admitted
    }

    /// Whether the request has been admitted and not yet finished.
    pub fn is_admitted(&self, id: RequestId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.admitted)
    }

    /// Whether the request is registered but still waiting.
    pub fn is_queued(&self, id: RequestId) -> bool {
        self.entries.get(&id).is_some_and(|e| !e.admitted)
    }

    /// Number of shared requests currently running.
    pub fn shared_count(&self) -> usize {
        self.shared.len()
    }

    /// The exclusive request currently running, if any.
    pub fn exclusive_holder(&self) -> Option<RequestId> {
        self.exclusive
    }

    /// Number of requests waiting for admission.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of registered requests, running or waiting.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Requests in flight for at least `threshold`, each reported once.
    pub fn long_running(&mut self, now: Instant, threshold: Duration) -> Vec<LongRunning> {
        let mut found: Vec<_> = self
            .entries
            .iter_mut()
            .filter(|(_, e)| !e.reported && now.saturating_duration_since(e.started_at) >= threshold)
            .map(|(&id, e)| {
                e.reported = true;
                LongRunning {
                    id,
                    name: e.name.clone(),
                    elapsed: now.saturating_duration_since(e.started_at),
                }
            })
            .collect();
        found.sort_by_key(|r| r.id);
        found
    }
}
