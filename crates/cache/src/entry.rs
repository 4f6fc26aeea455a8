use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcDateTime};

/// A cached raw payload together with the modification marker it was
/// fetched under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub item_id: String,
    pub title: Option<String>,
    pub raw_payload: String,
    pub last_modified: Option<String>,
    pub cached_at: UtcDateTime,
}

impl CacheEntry {
    /// An entry is fresh only when both sides carry a marker and the markers
    /// are identical. Ordering is never considered: a rollback on the server
    /// is just as stale as an edit.
    pub fn is_fresh(&self, current_last_modified: Option<&str>) -> bool {
        match (self.last_modified.as_deref(), current_last_modified) {
            (Some(stored), Some(current)) => stored == current,
            _ => false,
        }
    }
}

/// On-disk shape of the `.meta.json` sidecar.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetaRecord {
    pub(crate) item_id: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) last_modified: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) cached_at: OffsetDateTime,
}

impl MetaRecord {
    pub(crate) fn into_entry(self, raw_payload: String) -> CacheEntry {
        CacheEntry {
            item_id: self.item_id,
            title: self.title,
            raw_payload,
            last_modified: self.last_modified,
            cached_at: self.cached_at.to_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(last_modified: Option<&str>) -> CacheEntry {
        CacheEntry {
            item_id: "p1".to_string(),
            title: None,
            raw_payload: String::new(),
            last_modified: last_modified.map(str::to_string),
            cached_at: UtcDateTime::now(),
        }
    }

    #[rstest]
    #[case(Some("2024-01-01T00:00:00Z"), Some("2024-01-01T00:00:00Z"), true)]
    #[case(Some("2024-01-01T00:00:00Z"), Some("2024-02-01T00:00:00Z"), false)]
    // Rollbacks count as a change.
    #[case(Some("2024-02-01T00:00:00Z"), Some("2024-01-01T00:00:00Z"), false)]
    #[case(None, Some("2024-01-01T00:00:00Z"), false)]
    #[case(Some("2024-01-01T00:00:00Z"), None, false)]
    #[case(None, None, false)]
    fn test_is_fresh(#[case] stored: Option<&str>, #[case] current: Option<&str>, #[case] expected: bool) {
        assert_eq!(entry(stored).is_fresh(current), expected);
    }

    #[test]
    fn test_meta_record_field_names() {
        let json = r#"{"itemId":"p1","title":"Intro","lastModified":"v1","cachedAt":"2024-03-04T05:06:07Z"}"#;
        let record: MetaRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.item_id, "p1");
        assert_eq!(record.last_modified.as_deref(), Some("v1"));
        let entry = record.into_entry("<p/>".to_string());
        assert_eq!(entry.cached_at.year(), 2024);
        assert_eq!(entry.raw_payload, "<p/>");
    }
}
