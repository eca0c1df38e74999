//! Error types for the server.

use lsp_server::ErrorCode;
use thiserror::Error;

/// Failure of a single request.
///
/// Every variant is local to the request that produced it: the Store and
/// the diagnostics pipeline keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The client cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// The request parameters could not be decoded.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// No handler is registered for the method.
    #[error("unhandled request: {0}")]
    MethodNotFound(String),
    /// Anything else that went wrong while handling.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// The protocol error code for this failure.
    pub fn code(&self) -> i32 {
        let code = match self {
            Self::Cancelled => ErrorCode::RequestCanceled,
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Self::Internal(_) => ErrorCode::InternalError,
        };
        code as i32
    }
}

impl From<StoreError> for RequestError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// The state store thread is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("state store is not running")]
pub struct StoreError;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The protocol handshake or transport failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] lsp_server::ProtocolError),
    /// A message could not be (de)serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// An IO error from the transport threads or thread spawning.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The request worker pool could not be started.
    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// A request failed during initialization.
    #[error("initialization failed: {0}")]
    Initialize(#[from] RequestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RequestError::Cancelled.code(), -32800);
        assert_eq!(RequestError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(RequestError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(RequestError::Internal("x".into()).code(), -32603);
    }
}
