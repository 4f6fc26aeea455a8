//! In-memory catalog and credential provider for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::{ErrorKind, Result};
use crate::{AuthProvider, Credential, FetchedItem, ItemRef, NodeRef, RemoteCatalog};

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<NodeRef>>,
    sub_collections: HashMap<String, Vec<NodeRef>>,
    items: HashMap<String, Vec<String>>,
    entries: HashMap<String, (ItemRef, String)>,
    failing: HashSet<String>,
    fetches: HashMap<String, usize>,
}

/// In-memory [`RemoteCatalog`] for testing.
///
/// The hierarchy is declared up front with the `with_*` builders. Any node or
/// item id registered through [`with_failure`](Self::with_failure) makes the
/// corresponding listing or fetch fail with a network error, which is enough
/// to exercise per-item failure isolation without a real transport.
///
/// # Examples
///
/// ```
/// use quire_remote::{Credential, ItemRef, MockCatalog, NodeRef, RemoteCatalog};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = MockCatalog::default()
///     .with_sub_collection("nb", NodeRef::new("sec", "Section"))
///     .with_item("sec", ItemRef::new("nb", "p1").with_title("Page"), "<p>hi</p>");
/// let credential = Credential::bearer("token");
/// let items = catalog.list_items(&credential, &NodeRef::new("sec", "Section")).await?;
/// assert_eq!(items.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockCatalog {
    name: String,
    state: RwLock<State>,
}

impl MockCatalog {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a collection under a root.
    pub fn with_collection(mut self, root_id: impl Into<String>, collection: NodeRef) -> Self {
        self.state.get_mut().collections.entry(root_id.into()).or_default().push(collection);
        self
    }

    /// Register a sub-collection under a collection.
    pub fn with_sub_collection(mut self, collection_id: impl Into<String>, sub_collection: NodeRef) -> Self {
        self.state.get_mut().sub_collections.entry(collection_id.into()).or_default().push(sub_collection);
        self
    }

    /// Register an item (and its payload) under a sub-collection.
    pub fn with_item(mut self, sub_collection_id: impl Into<String>, item: ItemRef, payload: impl Into<String>) -> Self {
        let state = self.state.get_mut();
        state.items.entry(sub_collection_id.into()).or_default().push(item.item_id.clone());
        state.entries.insert(item.item_id.clone(), (item, payload.into()));
        self
    }

    /// Make listings of this node, or fetches of this item, fail.
    pub fn with_failure(mut self, id: impl Into<String>) -> Self {
        self.state.get_mut().failing.insert(id.into());
        self
    }

    /// Replace an item's payload and modification marker, as if it had been
    /// edited remotely.
    pub async fn update_item(&self, item_id: &str, payload: impl Into<String>, last_modified: Option<&str>) {
        let mut state = self.state.write().await;
        if let Some((item, stored)) = state.entries.get_mut(item_id) {
            item.last_modified = last_modified.map(str::to_string);
            *stored = payload.into();
        }
    }

    /// Number of times [`fetch_item`](RemoteCatalog::fetch_item) was called
    /// for this item.
    pub async fn fetch_count(&self, item_id: &str) -> usize {
        self.state.read().await.fetches.get(item_id).copied().unwrap_or_default()
    }

    fn fail_if_registered(state: &State, id: &str) -> Result<()> {
        if state.failing.contains(id) {
            exn::bail!(ErrorKind::Network(format!("mock failure for {id}")));
        }
        Ok(())
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl RemoteCatalog for MockCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self, _credential: &Credential, root: &NodeRef) -> Result<Vec<NodeRef>> {
        let state = self.state.read().await;
        Self::fail_if_registered(&state, &root.id)?;
        Ok(state.collections.get(&root.id).cloned().unwrap_or_default())
    }

    async fn list_sub_collections(&self, _credential: &Credential, collection: &NodeRef) -> Result<Vec<NodeRef>> {
        let state = self.state.read().await;
        Self::fail_if_registered(&state, &collection.id)?;
        Ok(state.sub_collections.get(&collection.id).cloned().unwrap_or_default())
    }

    async fn list_items(&self, _credential: &Credential, sub_collection: &NodeRef) -> Result<Vec<ItemRef>> {
        let state = self.state.read().await;
        Self::fail_if_registered(&state, &sub_collection.id)?;
        let ids = state.items.get(&sub_collection.id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids.iter().filter_map(|id| state.entries.get(id)).map(|(item, _)| item.clone()).collect())
    }

    async fn fetch_item(&self, _credential: &Credential, item: &ItemRef) -> Result<FetchedItem> {
        let mut state = self.state.write().await;
        *state.fetches.entry(item.item_id.clone()).or_default() += 1;
        Self::fail_if_registered(&state, &item.item_id)?;
        let (stored, payload) =
            state.entries.get(&item.item_id).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(item.item_id.clone())))?;
        Ok(FetchedItem {
            raw_payload: payload.clone(),
            last_modified: stored.last_modified.clone(),
        })
    }

    async fn get_item(&self, _credential: &Credential, item_id: &str) -> Result<ItemRef> {
        let state = self.state.read().await;
        state
            .entries
            .get(item_id)
            .map(|(item, _)| item.clone())
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(item_id.to_string())))
    }
}

/// [`AuthProvider`] that hands out a fixed token, or always fails.
pub struct MockAuth {
    token: Option<String>,
    calls: AtomicUsize,
}

impl MockAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails with [`ErrorKind::Auth`].
    pub fn failing() -> Self {
        Self {
            token: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthProvider for MockAuth {
    async fn credential(&self) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.token {
            Some(token) => Ok(Credential::bearer(token.clone())),
            None => exn::bail!(ErrorKind::Auth("mock provider has no token".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::bearer("token")
    }

    #[tokio::test]
    async fn test_listing_preserves_order() {
        let catalog = MockCatalog::default()
            .with_item("sec", ItemRef::new("nb", "b"), "B")
            .with_item("sec", ItemRef::new("nb", "a"), "A")
            .with_item("sec", ItemRef::new("nb", "c"), "C");
        let items = catalog.list_items(&credential(), &NodeRef::new("sec", "Section")).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_counts_and_failures() {
        let catalog = MockCatalog::default()
            .with_item("sec", ItemRef::new("nb", "ok"), "fine")
            .with_item("sec", ItemRef::new("nb", "bad"), "never")
            .with_failure("bad");
        let ok = catalog.fetch_item(&credential(), &ItemRef::new("nb", "ok")).await.unwrap();
        assert_eq!(ok.raw_payload, "fine");
        let err = catalog.fetch_item(&credential(), &ItemRef::new("nb", "bad")).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Network(_)));
        assert_eq!(catalog.fetch_count("ok").await, 1);
        assert_eq!(catalog.fetch_count("bad").await, 1);
        assert_eq!(catalog.fetch_count("missing").await, 0);
    }

    #[tokio::test]
    async fn test_update_item_changes_listing() {
        let catalog = MockCatalog::default().with_item("sec", ItemRef::new("nb", "p").with_last_modified("v1"), "old");
        catalog.update_item("p", "new", Some("v2")).await;
        let items = catalog.list_items(&credential(), &NodeRef::new("sec", "Section")).await.unwrap();
        assert_eq!(items[0].last_modified.as_deref(), Some("v2"));
        let fetched = catalog.fetch_item(&credential(), &items[0]).await.unwrap();
        assert_eq!(fetched.raw_payload, "new");
    }

    #[tokio::test]
    async fn test_failing_auth() {
        let auth = MockAuth::failing();
        let err = auth.credential().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(auth.calls(), 1);
    }
}
