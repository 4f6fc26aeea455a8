use serde::{Deserialize, Serialize};
use std::fmt;

/// One fetchable document, as reported by a catalog listing.
///
/// `collection_id` is the partition key used by the content cache; items
/// from different collections never share a cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub collection_id: String,
    pub item_id: String,
    pub title: Option<String>,
    /// Server-reported modification marker, compared verbatim.
    pub last_modified: Option<String>,
}

impl ItemRef {
    pub fn new(collection_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            item_id: item_id.into(),
            title: None,
            last_modified: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }
}

/// A root, collection or sub-collection returned by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    pub display_name: String,
}

impl NodeRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// The raw payload of an item plus the modification marker the server
/// reported alongside it (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub raw_payload: String,
    pub last_modified: Option<String>,
}

/// Opaque bearer credential.
///
/// The token never appears in `Debug` output so it cannot leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
