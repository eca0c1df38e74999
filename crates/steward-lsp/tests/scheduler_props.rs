//! Property-based tests for the request scheduler.
//!
//! Arbitrary start/finish sequences must keep readers and writers apart,
//! admit every request exactly once, and never let a request overtake an
//! exclusive request that arrived before it.
//!
//! Run with: cargo test -p steward-lsp --test `scheduler_props`

use crossbeam_channel::{bounded, Receiver};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use steward_lsp::scheduler::Scheduler;
use steward_lsp::{RequestId, RequestMode};

#[derive(Debug, Clone)]
enum Op {
    Start(RequestMode, i32),
    /// Finish (or withdraw) the n-th live request, modulo the live count.
    Finish(usize),
}

fn arb_mode() -> impl Strategy<Value = RequestMode> {
    prop_oneof![
        3 => Just(RequestMode::Shared),
        1 => Just(RequestMode::Exclusive),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_mode(), 0i32..3).prop_map(|(mode, priority)| Op::Start(mode, priority)),
        (0usize..64).prop_map(Op::Finish),
    ]
}

struct Model {
    scheduler: Scheduler,
    gates: HashMap<RequestId, Receiver<RequestId>>,
    modes: HashMap<RequestId, RequestMode>,
    order: Vec<RequestId>,
    live: Vec<RequestId>,
    admitted: HashSet<RequestId>,
    withdrawn: HashSet<RequestId>,
    next: u64,
}

impl Model {
    fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            gates: HashMap::new(),
            modes: HashMap::new(),
            order: Vec::new(),
            live: Vec::new(),
            admitted: HashSet::new(),
            withdrawn: HashSet::new(),
            next: 0,
        }
    }

    fn start(&mut self, mode: RequestMode, priority: i32) -> Vec<RequestId> {
        self.next += 1;
        let id = RequestId::new(self.next);
        let (gate, admitted) = bounded(1);
        self.gates.insert(id, admitted);
        self.modes.insert(id, mode);
        self.order.push(id);
        self.live.push(id);
        self.scheduler
            .start(id, "op", mode, priority, gate, Instant::now())
            .unwrap()
    }

    fn finish(&mut self, n: usize) -> Vec<RequestId> {
        let id = self.live.remove(n % self.live.len());
        if !self.admitted.contains(&id) {
            self.withdrawn.insert(id);
        }
        self.scheduler.finish(id).unwrap()
    }

    fn record(&mut self, newly: &[RequestId]) -> Result<(), TestCaseError> {
        for id in newly {
            prop_assert!(self.admitted.insert(*id), "{} admitted twice", id);
            prop_assert_eq!(self.gates[id].try_recv().ok(), Some(*id), "{} gate not opened", id);

            // Every exclusive request that arrived earlier went first or was withdrawn.
            for earlier in self.order.iter().take_while(|e| *e != id) {
                if self.modes[earlier] == RequestMode::Exclusive {
                    prop_assert!(
                        self.admitted.contains(earlier) || self.withdrawn.contains(earlier),
                        "{} overtook exclusive {}",
                        id,
                        earlier
                    );
                }
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), TestCaseError> {
        if self.scheduler.exclusive_holder().is_some() {
            prop_assert_eq!(self.scheduler.shared_count(), 0);
        }
        prop_assert_eq!(self.scheduler.in_flight(), self.live.len());
        for id in &self.live {
            prop_assert_eq!(self.scheduler.is_admitted(*id), self.admitted.contains(id));
            prop_assert!(self.gates[id].is_empty());
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_readers_and_writers_never_overlap(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut model = Model::new();

        for op in ops {
            let newly = match op {
                Op::Start(mode, priority) => model.start(mode, priority),
                Op::Finish(_) if model.live.is_empty() => continue,
                Op::Finish(n) => model.finish(n),
            };
            model.record(&newly)?;
            model.check()?;
        }

        // Draining admitted requests eventually admits everyone.
        while !model.live.is_empty() {
            let running = model
                .live
                .iter()
                .position(|id| model.scheduler.is_admitted(*id));
            prop_assert!(running.is_some(), "queue stalled with nothing running");
            let newly = model.finish(running.unwrap_or_default());
            model.record(&newly)?;
            model.check()?;
        }
        prop_assert_eq!(model.scheduler.queued_len(), 0);
        prop_assert_eq!(model.admitted.len() + model.withdrawn.len(), model.order.len());
        let finished = model.order.last().copied().unwrap_or(RequestId::new(0));
        prop_assert!(model.scheduler.finish(finished).is_err());
    }

    #[test]
    fn prop_withdrawn_requests_are_never_admitted(
        modes in prop::collection::vec(arb_mode(), 2..20)
    ) {
        let mut model = Model::new();
        // A running exclusive blocks everything behind it.
        let newly = model.start(RequestMode::Exclusive, 0);
        model.record(&newly)?;
        for mode in &modes {
            let newly = model.start(*mode, 0);
            prop_assert!(newly.is_empty());
        }

        // Withdraw all queued requests, then release the writer.
        while model.live.len() > 1 {
            let newly = model.finish(1);
            prop_assert!(newly.is_empty());
        }
        let newly = model.finish(0);
        prop_assert!(newly.is_empty());
        prop_assert_eq!(model.scheduler.in_flight(), 0);
        prop_assert_eq!(model.admitted.len(), 1);
    }
}
