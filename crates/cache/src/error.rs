//! Cache Error Types
//!
//! Only writes can fail: a cache read that runs into a missing, unreadable or
//! corrupt record is reported as a miss instead of an error.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The partition directory could not be created.
    #[display("could not create cache directory: {}", _0.display())]
    CreateDir(#[error(not(source))] PathBuf),
    /// A cache record could not be written or moved into place.
    #[display("could not write cache record: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// A cache record could not be removed.
    #[display("could not remove cache record: {}", _0.display())]
    Remove(#[error(not(source))] PathBuf),
    /// The metadata record could not be encoded.
    #[display("could not encode cache metadata for item {_0}")]
    Encode(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Filesystem failures (full disk, permissions) don't go away by
        // themselves.
        false
    }
}
