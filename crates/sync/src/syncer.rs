use exn::ResultExt;
use quire_cache::ContentStore;
use quire_normalize::MarkupNormalizer;
use quire_remote::{AuthProvider, Credential, ItemRef, NodeRef, RemoteCatalog};
use quire_render::TextRenderer;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{ErrorKind, Result};
use crate::event::SyncEvent;
use crate::hierarchy::{HierarchyNode, display_name};
use crate::report::{ListingFailure, SyncFailure, SyncReport};

type Observer = Box<dyn Fn(&SyncEvent<'_>) + Send + Sync>;

/// Lift a catalog error into a sync error. A rejected credential stays
/// fatal no matter which call it came from.
fn raise_remote<T>(result: quire_remote::error::Result<T>, kind: impl FnOnce() -> ErrorKind) -> Result<T> {
    let fatal = result.as_ref().is_err_and(|e| e.is_fatal());
    result.or_raise(|| if fatal { ErrorKind::Auth } else { kind() })
}

/// Drives the whole pipeline: list, fetch (or reuse the cache), normalize,
/// render and write one Markdown file per item.
///
/// Items are processed one at a time in listing order. A failing item or
/// listing is recorded in the returned [`SyncReport`] and its siblings carry
/// on; only an authentication failure ends the run early.
///
/// Output layout, relative to the output directory:
///
/// | entry point                                    | files                        |
/// |------------------------------------------------|------------------------------|
/// | [`sync_root`](Self::sync_root)                 | `<collection>/<sub>/<item>.md` |
/// | [`sync_collection`](Self::sync_collection)     | `<collection>/<sub>/<item>.md` |
/// | [`sync_sub_collection`](Self::sync_sub_collection) | `<item>.md`              |
/// | [`sync_item`](Self::sync_item)                 | `<item>.md`                  |
pub struct Syncer<C, A> {
    catalog: C,
    auth: A,
    store: ContentStore,
    normalizer: MarkupNormalizer,
    renderer: TextRenderer,
    output_dir: PathBuf,
    force_refresh: bool,
    observer: Option<Observer>,
}

impl<C: RemoteCatalog, A: AuthProvider> Syncer<C, A> {
    pub fn new(catalog: C, auth: A, store: ContentStore, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            auth,
            store,
            normalizer: MarkupNormalizer::default(),
            renderer: TextRenderer::default(),
            output_dir: output_dir.into(),
            force_refresh: false,
            observer: None,
        }
    }

    /// Ignore cached payloads and fetch every item again. Fresh payloads
    /// still replace the cached ones.
    pub fn with_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_normalizer(mut self, normalizer: MarkupNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_renderer(mut self, renderer: TextRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Receive a [`SyncEvent`] for every step of a run.
    pub fn with_observer(mut self, observer: impl Fn(&SyncEvent<'_>) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn emit(&self, event: SyncEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    async fn credential(&self) -> Result<Credential> {
        self.auth.credential().await.or_raise(|| ErrorKind::Auth)
    }

    /// Raw payload of an item, and whether it came from the cache.
    async fn load_payload(&self, item: &ItemRef) -> Result<(String, bool)> {
        if !self.force_refresh
            && let Some(entry) = self.store.get(&item.collection_id, &item.item_id).await
        {
            if self.store.is_fresh(&entry, item.last_modified.as_deref()) {
                debug!("cache hit");
                return Ok((entry.raw_payload, true));
            }
            debug!(cached = ?entry.last_modified, current = ?item.last_modified, "cache entry is stale");
        }

        let credential = self.credential().await?;
        let fetched = raise_remote(self.catalog.fetch_item(&credential, item).await, || {
            ErrorKind::Fetch(item.item_id.clone())
        })?;
        let last_modified = fetched.last_modified.as_deref().or(item.last_modified.as_deref());
        self.store
            .put(&item.collection_id, &item.item_id, item.title.as_deref(), &fetched.raw_payload, last_modified)
            .await
            .or_raise(|| ErrorKind::Cache(item.item_id.clone()))?;
        Ok((fetched.raw_payload, false))
    }

    async fn render_document(&self, item: &ItemRef, title: &str) -> Result<(String, bool)> {
        let (payload, from_cache) = self.load_payload(item).await?;
        let html = self.normalizer.normalize(&payload);
        let markdown = self.renderer.render(&html);
        Ok((format!("# {title}\n\n{markdown}"), from_cache))
    }

    /// The Markdown document for one item, exactly as
    /// [`sync_item`](Self::sync_item) would write it. The cache is consulted
    /// and updated the same way, but nothing is written to the output
    /// directory.
    #[instrument(skip_all, fields(item_id = %item.item_id))]
    pub async fn fetch_rendered(&self, item: &ItemRef) -> Result<String> {
        let title = display_name(item.title.as_deref(), &item.item_id);
        let (document, _) = self.render_document(item, &title).await?;
        Ok(document)
    }

    /// Sync one item into the top of the output directory.
    pub async fn sync_item(&self, item: &ItemRef) -> Result<PathBuf> {
        let root = HierarchyNode::Root {
            name: self.catalog.name(),
        };
        let (path, _) = self.item_under(item, &root, &mut HashSet::new()).await?;
        Ok(path)
    }

    /// Sync every item of a sub-collection, flat into the output directory.
    ///
    /// Fails only when the items cannot be listed or authentication fails.
    pub async fn sync_sub_collection(&self, sub_collection: &NodeRef) -> Result<SyncReport> {
        self.emit(SyncEvent::SubCollection(sub_collection));
        let name = display_name(Some(&sub_collection.display_name), &sub_collection.id);
        let root = HierarchyNode::Root { name: &name };
        self.items_under(sub_collection, &root, &mut HashSet::new()).await
    }

    /// Sync every sub-collection of a collection into
    /// `<collection>/<sub-collection>/`.
    pub async fn sync_collection(&self, collection: &NodeRef) -> Result<SyncReport> {
        let root = HierarchyNode::Root {
            name: self.catalog.name(),
        };
        self.collection_under(collection, &root, &mut HashSet::new()).await
    }

    /// Sync every collection under a root. The root itself gets no directory.
    #[instrument(skip_all, fields(root = %root.display_name))]
    pub async fn sync_root(&self, root: &NodeRef) -> Result<SyncReport> {
        let credential = self.credential().await?;
        let collections = raise_remote(self.catalog.list_collections(&credential, root).await, || {
            ErrorKind::Listing(root.display_name.clone())
        })?;
        info!(collections = collections.len(), "listed collections");

        let name = display_name(Some(&root.display_name), &root.id);
        let node = HierarchyNode::Root { name: &name };
        let mut written = HashSet::new();
        let mut report = SyncReport::default();
        for collection in &collections {
            let result = self.collection_under(collection, &node, &mut written).await;
            self.absorb(&mut report, collection, result)?;
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(collection = %collection.display_name))]
    async fn collection_under(
        &self,
        collection: &NodeRef,
        parent: &HierarchyNode<'_>,
        written: &mut HashSet<PathBuf>,
    ) -> Result<SyncReport> {
        self.emit(SyncEvent::Collection(collection));
        let name = display_name(Some(&collection.display_name), &collection.id);
        let node = HierarchyNode::Collection { name: &name, parent };

        let credential = self.credential().await?;
        let sub_collections = raise_remote(self.catalog.list_sub_collections(&credential, collection).await, || {
            ErrorKind::Listing(node.breadcrumb())
        })?;
        info!(sub_collections = sub_collections.len(), "listed sub-collections");

        let mut report = SyncReport::default();
        for sub_collection in &sub_collections {
            self.emit(SyncEvent::SubCollection(sub_collection));
            let name = display_name(Some(&sub_collection.display_name), &sub_collection.id);
            let sub_node = HierarchyNode::SubCollection {
                name: &name,
                parent: &node,
            };
            let result = self.items_under(sub_collection, &sub_node, written).await;
            self.absorb(&mut report, sub_collection, result)?;
        }
        Ok(report)
    }

    /// Folds the outcome of a nested listing into `report`. Anything but an
    /// authentication failure is recorded and swallowed.
    fn absorb(&self, report: &mut SyncReport, node: &NodeRef, result: Result<SyncReport>) -> Result<()> {
        match result {
            Ok(nested) => report.merge(nested),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(node = %node.display_name, error = ?e, "listing failed, skipping its children");
                self.emit(SyncEvent::ListingFailed { node, error: &e });
                report.failed_listings.push(ListingFailure {
                    node: node.clone(),
                    error: e,
                });
            },
        }
        Ok(())
    }

    #[instrument(skip_all, fields(sub_collection = %sub_collection.display_name))]
    async fn items_under(
        &self,
        sub_collection: &NodeRef,
        parent: &HierarchyNode<'_>,
        written: &mut HashSet<PathBuf>,
    ) -> Result<SyncReport> {
        let credential = self.credential().await?;
        let items = raise_remote(self.catalog.list_items(&credential, sub_collection).await, || {
            ErrorKind::Listing(parent.breadcrumb())
        })?;
        let total = items.len();
        info!(items = total, "listed items");

        let mut report = SyncReport::default();
        for (index, item) in items.iter().enumerate() {
            self.emit(SyncEvent::ItemStarted { item, index, total });
            match self.item_under(item, parent, written).await {
                Ok((path, from_cache)) => {
                    self.emit(SyncEvent::ItemSynced {
                        item,
                        path: &path,
                        from_cache,
                    });
                    report.from_cache += usize::from(from_cache);
                    report.succeeded.push(path);
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(item_id = %item.item_id, error = ?e, "item failed");
                    self.emit(SyncEvent::ItemFailed { item, error: &e });
                    report.failed.push(SyncFailure {
                        item: item.clone(),
                        error: e,
                    });
                },
            }
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(item_id = %item.item_id))]
    async fn item_under(
        &self,
        item: &ItemRef,
        parent: &HierarchyNode<'_>,
        written: &mut HashSet<PathBuf>,
    ) -> Result<(PathBuf, bool)> {
        let title = display_name(item.title.as_deref(), &item.item_id);
        let node = HierarchyNode::Item { name: &title, parent };
        let path = self.output_dir.join(node.relative_path());

        let (document, from_cache) = self.render_document(item, &title).await?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.or_raise(|| ErrorKind::Write(dir.to_path_buf()))?;
        }
        if !written.insert(path.clone()) {
            warn!(path = %path.display(), location = %node.breadcrumb(), "output path already written in this run, overwriting");
        }
        fs::write(&path, document).await.or_raise(|| ErrorKind::Write(path.clone()))?;
        info!(path = %path.display(), from_cache, "wrote item");
        Ok((path, from_cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_remote::{MockAuth, MockCatalog};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const JAN: &str = "2024-01-01T00:00:00Z";
    const FEB: &str = "2024-02-01T00:00:00Z";

    fn runbooks() -> NodeRef {
        NodeRef::new("sec1", "Runbooks")
    }

    fn catalog() -> MockCatalog {
        MockCatalog::default()
            .with_name("Team Site")
            .with_collection("site", NodeRef::new("nb1", "Engineering"))
            .with_sub_collection("nb1", runbooks())
            .with_item("sec1", ItemRef::new("nb1", "p1").with_title("Alpha").with_last_modified(JAN), "<p>one</p>")
            .with_item("sec1", ItemRef::new("nb1", "p2").with_title("Beta").with_last_modified(JAN), "<p>two</p>")
            .with_item("sec1", ItemRef::new("nb1", "p3").with_title("Gamma").with_last_modified(JAN), "<p>three</p>")
    }

    fn syncer(catalog: MockCatalog, dir: &TempDir) -> Syncer<MockCatalog, MockAuth> {
        Syncer::new(catalog, MockAuth::new("token"), ContentStore::new(dir.path().join("cache")), dir.path().join("out"))
    }

    #[tokio::test]
    async fn test_failing_item_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog().with_failure("p2"), &dir);

        let report = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item.item_id, "p2");
        assert_eq!(*report.failed[0].error, ErrorKind::Fetch("p2".to_string()));
        let out = dir.path().join("out");
        assert!(out.join("Alpha.md").is_file());
        assert!(!out.join("Beta.md").exists());
        assert!(out.join("Gamma.md").is_file());
    }

    #[tokio::test]
    async fn test_written_document_has_heading() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog(), &dir);

        let path = syncer.sync_item(&ItemRef::new("nb1", "p1").with_title("Alpha").with_last_modified(JAN)).await.unwrap();

        assert_eq!(path, dir.path().join("out").join("Alpha.md"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Alpha\n\n"));
        assert!(written.contains("one"));
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog(), &dir);

        let first = syncer.sync_sub_collection(&runbooks()).await.unwrap();
        let second = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(first.from_cache, 0);
        assert_eq!(second.from_cache, 3);
        assert_eq!(syncer.catalog().fetch_count("p1").await, 1);
        assert_eq!(first.succeeded, second.succeeded);
    }

    #[tokio::test]
    async fn test_remote_edit_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog(), &dir);
        syncer.sync_sub_collection(&runbooks()).await.unwrap();

        syncer.catalog().update_item("p1", "<p>edited</p>", Some(FEB)).await;
        let report = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(report.from_cache, 2);
        assert_eq!(syncer.catalog().fetch_count("p1").await, 2);
        assert_eq!(syncer.catalog().fetch_count("p2").await, 1);
        let written = std::fs::read_to_string(dir.path().join("out").join("Alpha.md")).unwrap();
        assert!(written.contains("edited"));

        let cache = ContentStore::new(dir.path().join("cache"));
        let stored = cache.get("nb1", "p1").await.unwrap();
        assert_eq!(stored.last_modified.as_deref(), Some(FEB));
        assert_eq!(stored.raw_payload, "<p>edited</p>");
        let untouched = cache.get("nb1", "p2").await.unwrap();
        assert_eq!(untouched.last_modified.as_deref(), Some(JAN));
    }

    #[tokio::test]
    async fn test_forced_refresh_fetches_everything() {
        let dir = tempfile::tempdir().unwrap();
        syncer(catalog(), &dir).sync_sub_collection(&runbooks()).await.unwrap();

        let syncer = syncer(catalog(), &dir).with_refresh(true);
        let report = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(report.from_cache, 0);
        assert_eq!(syncer.catalog().fetch_count("p3").await, 1);
    }

    #[tokio::test]
    async fn test_missing_modification_marker_is_never_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MockCatalog::default().with_item("sec1", ItemRef::new("nb1", "p1").with_title("Alpha"), "<p>x</p>");
        let syncer = syncer(catalog, &dir);

        syncer.sync_sub_collection(&runbooks()).await.unwrap();
        syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(syncer.catalog().fetch_count("p1").await, 2);
    }

    #[tokio::test]
    async fn test_root_and_collection_nest_output() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog(), &dir);
        let expected = dir.path().join("out").join("Engineering").join("Runbooks").join("Alpha.md");

        let report = syncer.sync_root(&NodeRef::new("site", "Team Site")).await.unwrap();
        assert_eq!(report.succeeded.len(), 3);
        assert!(report.is_clean());
        assert_eq!(report.succeeded[0], expected);

        std::fs::remove_file(&expected).unwrap();
        let report = syncer.sync_collection(&NodeRef::new("nb1", "Engineering")).await.unwrap();
        assert_eq!(report.succeeded[0], expected);
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn test_nested_listing_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog().with_sub_collection("nb1", NodeRef::new("sec2", "Archive")).with_failure("sec2");
        let syncer = syncer(catalog, &dir);

        let report = syncer.sync_collection(&NodeRef::new("nb1", "Engineering")).await.unwrap();

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failed_listings.len(), 1);
        assert_eq!(report.failed_listings[0].node.id, "sec2");
        assert!(matches!(*report.failed_listings[0].error, ErrorKind::Listing(_)));
    }

    #[tokio::test]
    async fn test_entry_point_listing_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog().with_failure("sec1"), &dir);

        let err = syncer.sync_sub_collection(&runbooks()).await.unwrap_err();

        assert!(matches!(*err, ErrorKind::Listing(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = Syncer::new(
            catalog(),
            MockAuth::failing(),
            ContentStore::new(dir.path().join("cache")),
            dir.path().join("out"),
        );

        let err = syncer.sync_root(&NodeRef::new("site", "Team Site")).await.unwrap_err();

        assert!(err.is_fatal());
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_untitled_item_uses_id_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let catalog =
            MockCatalog::default().with_item("sec1", ItemRef::new("nb1", "0-abcdef0123456789"), "<p>body</p>");
        let syncer = syncer(catalog, &dir);

        let report = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        let path = dir.path().join("out").join("0-abcdef0123.md");
        assert_eq!(report.succeeded, [path.clone()]);
        assert!(std::fs::read_to_string(path).unwrap().starts_with("# 0-abcdef0123\n\n"));
    }

    #[tokio::test]
    async fn test_duplicate_titles_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MockCatalog::default()
            .with_item("sec1", ItemRef::new("nb1", "p1").with_title("Same"), "<p>first</p>")
            .with_item("sec1", ItemRef::new("nb1", "p2").with_title("Same"), "<p>second</p>");
        let syncer = syncer(catalog, &dir);

        let report = syncer.sync_sub_collection(&runbooks()).await.unwrap();

        assert_eq!(report.succeeded.len(), 2);
        let written = std::fs::read_to_string(dir.path().join("out").join("Same.md")).unwrap();
        assert!(written.contains("second"));
    }

    #[tokio::test]
    async fn test_fetch_rendered_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let syncer = syncer(catalog(), &dir);

        let document = syncer.fetch_rendered(&ItemRef::new("nb1", "p3").with_title("Gamma")).await.unwrap();

        assert!(document.starts_with("# Gamma\n\n"));
        assert!(document.contains("three"));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_observer_sees_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let syncer = syncer(catalog().with_failure("p3"), &dir).with_observer(move |event| {
            let label = match event {
                SyncEvent::Collection(node) => format!("collection {}", node.id),
                SyncEvent::SubCollection(node) => format!("sub {}", node.id),
                SyncEvent::ItemStarted { item, index, total } => format!("start {} {index}/{total}", item.item_id),
                SyncEvent::ItemSynced { item, .. } => format!("ok {}", item.item_id),
                SyncEvent::ItemFailed { item, .. } => format!("fail {}", item.item_id),
                SyncEvent::ListingFailed { node, .. } => format!("listing {}", node.id),
            };
            sink.lock().unwrap().push(label);
        });

        syncer.sync_collection(&NodeRef::new("nb1", "Engineering")).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                "collection nb1",
                "sub sec1",
                "start p1 0/3",
                "ok p1",
                "start p2 1/3",
                "ok p2",
                "start p3 2/3",
                "fail p3",
            ]
        );
    }
}
