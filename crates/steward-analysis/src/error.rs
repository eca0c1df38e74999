//! Analysis error types.

use lsp_types::Uri;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for provider operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors reported by an [`AnalysisProvider`](crate::AnalysisProvider).
///
/// Callers treat these as the absence of a result wherever the protocol
/// allows an empty response.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// IO error while reading workspace files.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not part of the snapshot.
    #[error("unknown document: {}", .0.as_str())]
    UnknownDocument(Uri),

    /// The position does not exist in the document.
    #[error("position {line}:{character} is outside the document")]
    InvalidPosition {
        /// Zero-based line.
        line: u32,
        /// Zero-based UTF-16 column.
        character: u32,
    },

    /// The provider does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}
