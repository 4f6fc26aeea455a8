use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::{OffsetDateTime, UtcDateTime};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::entry::{CacheEntry, MetaRecord};
use crate::error::{ErrorKind, Result};

const PARTITION_HASH_LEN: usize = 12;
const PAYLOAD_EXT: &str = "html";
const META_EXT: &str = "meta.json";

/// File-backed cache of raw item payloads, partitioned per collection.
///
/// Layout under the injected root:
///
/// ```text
/// {root}/{blake3(collection_id)[..12]}/{item}.html
/// {root}/{blake3(collection_id)[..12]}/{item}.meta.json
/// ```
///
/// Both files are replaced by persisting a sibling temp file, payload first. A
/// crash between the two renames leaves a new payload next to old metadata,
/// which only means one extra re-fetch on the next run.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every cached item of one collection.
    pub fn partition_dir(&self, collection_id: &str) -> PathBuf {
        let hash = blake3::hash(collection_id.as_bytes()).to_hex();
        self.root.join(&hash.as_str()[..PARTITION_HASH_LEN])
    }

    fn record_paths(&self, collection_id: &str, item_id: &str) -> (PathBuf, PathBuf) {
        let dir = self.partition_dir(collection_id);
        let stem = file_stem(item_id);
        (dir.join(format!("{stem}.{PAYLOAD_EXT}")), dir.join(format!("{stem}.{META_EXT}")))
    }

    /// Look up a cached item.
    ///
    /// Returns `None` when either record is missing, the metadata can't be
    /// decoded, or the metadata belongs to a different item (two ids that
    /// sanitize to the same file stem). Never fails.
    #[instrument(skip(self))]
    pub async fn get(&self, collection_id: &str, item_id: &str) -> Option<CacheEntry> {
        let (payload_path, meta_path) = self.record_paths(collection_id, item_id);
        let meta = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cache miss");
                return None;
            },
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "unreadable cache metadata, treating as miss");
                return None;
            },
        };
        let record: MetaRecord = match serde_json::from_slice(&meta) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "corrupt cache metadata, treating as miss");
                return None;
            },
        };
        if record.item_id != item_id {
            warn!(path = %meta_path.display(), cached = %record.item_id, "cache metadata belongs to another item");
            return None;
        }
        match fs::read_to_string(&payload_path).await {
            Ok(payload) => {
                debug!("cache hit");
                Some(record.into_entry(payload))
            },
            Err(e) => {
                warn!(path = %payload_path.display(), error = %e, "cache payload missing or unreadable");
                None
            },
        }
    }

    /// See [`CacheEntry::is_fresh`].
    pub fn is_fresh(&self, entry: &CacheEntry, current_last_modified: Option<&str>) -> bool {
        entry.is_fresh(current_last_modified)
    }

    /// Store (or overwrite) an item's payload and metadata.
    #[instrument(skip(self, title, raw_payload), fields(payload_size = raw_payload.len()))]
    pub async fn put(
        &self,
        collection_id: &str,
        item_id: &str,
        title: Option<&str>,
        raw_payload: &str,
        last_modified: Option<&str>,
    ) -> Result<CacheEntry> {
        let dir = self.partition_dir(collection_id);
        fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::CreateDir(dir.clone()))?;

        let cached_at = UtcDateTime::now();
        let record = MetaRecord {
            item_id: item_id.to_string(),
            title: title.map(str::to_string),
            last_modified: last_modified.map(str::to_string),
            cached_at: OffsetDateTime::from(cached_at),
        };
        let meta = serde_json::to_vec_pretty(&record).or_raise(|| ErrorKind::Encode(item_id.to_string()))?;

        let (payload_path, meta_path) = self.record_paths(collection_id, item_id);
        write_atomic(&payload_path, raw_payload.as_bytes()).await?;
        write_atomic(&meta_path, &meta).await?;
        debug!(path = %payload_path.display(), "cached item");

        Ok(record.into_entry(raw_payload.to_string()))
    }

    /// Remove both records of an item. Missing records are not an error.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, collection_id: &str, item_id: &str) -> Result<()> {
        let (payload_path, meta_path) = self.record_paths(collection_id, item_id);
        // Metadata first: without it the payload is already a miss.
        for path in [meta_path, payload_path] {
            match fs::remove_file(&path).await {
                Ok(()) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(e).or_raise(|| ErrorKind::Remove(path)),
            }
        }
        Ok(())
    }
}

/// Item ids are opaque server strings; keep them readable but filesystem-safe.
fn file_stem(item_id: &str) -> String {
    let stem: String = item_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '!' | '-') { c } else { '_' })
        .collect();
    if stem.is_empty() { "_".to_string() } else { stem }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let target = path.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let failed = || ErrorKind::Write(target.clone());
        let parent = target.parent().unwrap_or(Path::new("."));
        let mut temp = NamedTempFile::new_in(parent).or_raise(failed)?;
        temp.write_all(&data).or_raise(failed)?;
        // A failed persist drops the temp file, which deletes it.
        temp.persist(&target).or_raise(failed)?;
        Ok(())
    })
    .await
    .or_raise(|| ErrorKind::Write(path.to_path_buf()))?
}
