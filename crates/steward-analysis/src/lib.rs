//! Workspace model and analysis capability for the steward language server.
//!
//! This crate holds everything request handlers read while they are admitted:
//!
//! - [`Snapshot`]: an immutable, versioned view of every tracked document,
//!   including synthetic documents produced by metadata decompilation
//! - [`Document`]: rope-backed document content with its client version
//! - [`AnalysisProvider`]: the capability interface handlers call into
//! - [`TextAnalysis`]: a word-based provider used by the `steward-lsp` binary
//!
//! # Example
//!
//! ```ignore
//! use std::time::Instant;
//! use steward_analysis::{AnalysisProvider, Document, Snapshot, TextAnalysis};
//!
//! let uri: lsp_types::Uri = "file:///src/main.rs".parse()?;
//! let snapshot = Snapshot::empty()
//!     .with_document(uri.clone(), Document::new("fn main() {}\n", Some(1), Instant::now()));
//! let diagnostics = TextAnalysis::new().diagnostics(&snapshot, &uri)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
pub mod line_index;
mod provider;
mod snapshot;
pub mod text;
pub mod uri;

pub use document::{ContentChange, Document};
pub use error::{AnalysisError, AnalysisResult};
pub use line_index::LineIndex;
pub use provider::{AnalysisProvider, Symbol, SEMANTIC_TOKEN_TYPES};
pub use snapshot::Snapshot;
pub use text::TextAnalysis;
