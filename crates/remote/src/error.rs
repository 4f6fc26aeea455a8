//! Remote Error Types
//!
//! Errors raised by [`AuthProvider`](crate::AuthProvider) and
//! [`RemoteCatalog`](crate::RemoteCatalog) implementations. The kinds are
//! shared by every implementation so the orchestrator can decide what is
//! fatal (authentication) and what only fails a single item.

use derive_more::{Display, Error};

/// A remote error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No credential could be obtained, or the service rejected it.
    #[display("authentication failed: {_0}")]
    Auth(#[error(not(source))] String),
    /// Connection-level failure (DNS, TLS, reset connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The per-request deadline elapsed.
    #[display("request timed out: {_0}")]
    Timeout(#[error(not(source))] String),
    /// The service answered with an unexpected status code.
    #[display("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL (without credentials).
        url: String,
    },
    /// The requested node or item does not exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The service answered, but the body could not be understood.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(_) | Self::NotFound(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Authentication failures abort a whole run instead of a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
