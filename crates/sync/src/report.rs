use quire_remote::{ItemRef, NodeRef};
use std::path::PathBuf;

use crate::error::Error;

/// An item that could not be synced, and why.
#[derive(Debug)]
pub struct SyncFailure {
    pub item: ItemRef,
    pub error: Error,
}

/// A collection or sub-collection whose children could not be listed.
/// Everything below it was skipped.
#[derive(Debug)]
pub struct ListingFailure {
    pub node: NodeRef,
    pub error: Error,
}

/// Aggregated outcome of a sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Written files, in traversal order.
    pub succeeded: Vec<PathBuf>,
    /// How many of the written files were rendered from a fresh cache entry.
    pub from_cache: usize,
    pub failed: Vec<SyncFailure>,
    pub failed_listings: Vec<ListingFailure>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.succeeded.extend(other.succeeded);
        self.from_cache += other.from_cache;
        self.failed.extend(other.failed);
        self.failed_listings.extend(other.failed_listings);
    }

    /// Items attempted (written or failed).
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// `true` when nothing failed, listings included.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.failed_listings.is_empty()
    }
}
