//! Fixed-interval clock driving the store and the diagnostics pipeline.

use crate::diagnostics::DiagnosticsHandle;
use crate::state::StoreHandle;
use crossbeam_channel::{after, bounded, select, tick, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Something that receives ticks.
pub trait TickTarget: Send {
    /// Deliver a tick. Returns `false` once the target is gone.
    fn on_tick(&self, now: Instant) -> bool;
}

impl TickTarget for StoreHandle {
    fn on_tick(&self, now: Instant) -> bool {
        self.periodic_tick(now).is_ok()
    }
}

impl TickTarget for DiagnosticsHandle {
    fn on_tick(&self, now: Instant) -> bool {
        self.process_pending(now)
    }
}

/// The ticker thread. Stops when dropped.
#[derive(Debug)]
pub struct Ticker {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start ticking `targets` every `interval`, beginning after `initial_delay`.
    ///
    /// The ticker exits on its own once every target is gone.
    pub fn spawn(
        mut targets: Vec<Box<dyn TickTarget>>,
        initial_delay: Duration,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("ticker".to_string())
            .spawn(move || {
                let stop_requested = select! {
                    recv(after(initial_delay)) -> _ => false,
                    recv(stopped) -> _ => true,
                };
                if stop_requested {
                    return;
                }

                let clock = tick(interval);
                loop {
                    let now = Instant::now();
                    targets.retain(|target| target.on_tick(now));
                    if targets.is_empty() {
                        tracing::debug!("Ticker has no targets left");
                        return;
                    }

                    let stop_requested = select! {
                        recv(clock) -> _ => false,
                        recv(stopped) -> _ => true,
                    };
                    if stop_requested {
                        return;
                    }
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stop and wait for the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
