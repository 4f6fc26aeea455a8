//! Remote catalog and credential abstractions.
//!
//! The sync pipeline only ever talks to a remote content service through the
//! two traits in this crate:
//!
//! - [`AuthProvider`] hands out a bearer [`Credential`], refreshing it as
//!   needed. Failing to produce one is fatal for a run.
//! - [`RemoteCatalog`] lists the hierarchy (root → collection →
//!   sub-collection → item) and fetches raw item payloads. Listings are
//!   always fully paginated and keep the server's order.
//!
//! Concrete transports live in other crates. With the `mock` feature an
//! in-memory [`MockCatalog`] and [`MockAuth`] are available for tests.

pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod models;

use async_trait::async_trait;

use crate::error::Result;
#[cfg(feature = "mock")]
pub use crate::mock::{MockAuth, MockCatalog};
pub use crate::models::{Credential, FetchedItem, ItemRef, NodeRef};

/// Source of bearer credentials.
///
/// Implementations own any refresh state. Callers ask for a credential
/// before each listing or fetch and should not cache it themselves.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn credential(&self) -> Result<Credential>;
}

#[async_trait]
impl<T: AuthProvider + ?Sized> AuthProvider for Box<T> {
    async fn credential(&self) -> Result<Credential> {
        (**self).credential().await
    }
}

/// Read-only view of a hierarchical content service.
///
/// Every listing returns the complete collection (all pages followed) in the
/// order the service reports it.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Name of the catalog, used for logging only.
    fn name(&self) -> &str;

    /// List the collections (notebooks) directly under a root (site).
    async fn list_collections(&self, credential: &Credential, root: &NodeRef) -> Result<Vec<NodeRef>>;

    /// List the sub-collections (sections) of a collection.
    async fn list_sub_collections(&self, credential: &Credential, collection: &NodeRef) -> Result<Vec<NodeRef>>;

    /// List the items (pages) of a sub-collection.
    async fn list_items(&self, credential: &Credential, sub_collection: &NodeRef) -> Result<Vec<ItemRef>>;

    /// Download the raw payload of one item.
    async fn fetch_item(&self, credential: &Credential, item: &ItemRef) -> Result<FetchedItem>;

    /// Look up a single item by id, including its title and modification
    /// marker.
    async fn get_item(&self, credential: &Credential, item_id: &str) -> Result<ItemRef>;
}
