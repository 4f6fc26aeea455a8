//! Sync orchestration for OneNote-style catalogs.
//!
//! Ties together a [`RemoteCatalog`](quire_remote::RemoteCatalog), the
//! [`ContentStore`](quire_cache::ContentStore) cache, the
//! [`MarkupNormalizer`](quire_normalize::MarkupNormalizer) and the
//! [`TextRenderer`](quire_render::TextRenderer). See [`Syncer`].

pub mod error;
mod event;
mod hierarchy;
mod report;
mod syncer;

pub use crate::event::SyncEvent;
pub use crate::hierarchy::{HierarchyNode, display_name};
pub use crate::report::{ListingFailure, SyncFailure, SyncReport};
pub use crate::syncer::Syncer;
