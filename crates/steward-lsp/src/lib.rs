//! Request-scheduling core of a language server.
//!
//! Many editor requests read or mutate one shared workspace model. This
//! crate decides which of them may run, and when:
//! - **State store**: one thread owns the snapshot, settings, open document
//!   versions and the request registry; everything else posts events to it
//! - **Scheduler**: shared (read-only) requests run together, exclusive ones
//!   run alone, ordered by priority without starving writers
//! - **Diagnostics pipeline**: a second thread debounces document changes
//!   and publishes diagnostics, discarding results that went stale
//! - **Ticker**: a clock that drives both
//!
//! Language analysis itself comes from an
//! [`AnalysisProvider`](steward_analysis::AnalysisProvider).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use steward_analysis::TextAnalysis;
//! use steward_lsp::{run_server, ServerTuning};
//!
//! let (connection, io_threads) = lsp_server::Connection::stdio();
//! run_server(connection, Arc::new(TextAnalysis::new()), ServerTuning::default())?;
//! io_threads.join()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod main_loop;
pub mod reload;
pub mod request;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod ticker;

mod server;

pub use client::ClientHandle;
pub use error::{RequestError, ServerError, StoreError};
pub use request::{CancelToken, RequestId, RequestMode};
pub use server::{run_server, server_capabilities, start_stdio};
pub use settings::{ServerTuning, Settings};
pub use state::StoreHandle;

/// LSP server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
