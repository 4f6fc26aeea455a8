use quire_remote::{ItemRef, NodeRef};
use std::path::Path;

use crate::error::Error;

/// Progress notifications emitted while syncing, in traversal order.
///
/// For every collection: [`Collection`](Self::Collection), then for each of
/// its sub-collections [`SubCollection`](Self::SubCollection) followed by an
/// [`ItemStarted`](Self::ItemStarted) and exactly one of
/// [`ItemSynced`](Self::ItemSynced) or [`ItemFailed`](Self::ItemFailed) per
/// item. A node whose children cannot be listed yields
/// [`ListingFailed`](Self::ListingFailed) instead of its children.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    Collection(&'a NodeRef),
    SubCollection(&'a NodeRef),
    ItemStarted {
        item: &'a ItemRef,
        /// Zero-based position within the sub-collection.
        index: usize,
        total: usize,
    },
    ItemSynced {
        item: &'a ItemRef,
        path: &'a Path,
        from_cache: bool,
    },
    ItemFailed {
        item: &'a ItemRef,
        error: &'a Error,
    },
    ListingFailed {
        node: &'a NodeRef,
        error: &'a Error,
    },
}
