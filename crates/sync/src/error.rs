//! Sync Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a sync failure.
///
/// ### Fatal Errors
/// - [`ErrorKind::Auth`]: no credential, or the service rejected it. Every
///   following request would fail the same way, so the whole run stops.
///
/// ### Isolated Errors
/// Recorded in the [`SyncReport`](crate::SyncReport) while siblings carry on.
/// - [`ErrorKind::Listing`]
/// - [`ErrorKind::Fetch`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Write`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("authentication failed")]
    Auth,
    /// The children of a node could not be listed.
    #[display("could not list {_0}")]
    Listing(#[error(not(source))] String),
    /// The raw payload of an item could not be downloaded.
    #[display("could not fetch item {_0}")]
    Fetch(#[error(not(source))] String),
    /// The freshly fetched payload could not be cached.
    #[display("could not cache item {_0}")]
    Cache(#[error(not(source))] String),
    /// The rendered Markdown could not be written.
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Listing(_) | Self::Fetch(_))
    }

    /// Returns `true` if the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth)
    }
}
