//! Wire shapes of the Graph responses we care about. Unknown fields are
//! ignored.

use quire_remote::{ItemRef, NodeRef};
use serde::Deserialize;

/// One page of an OData collection.
#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub(crate) value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub(crate) next_link: Option<String>,
}

/// A SharePoint site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl Site {
    /// Best human-readable name the service returned.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().or(self.name.as_deref()).unwrap_or(&self.id)
    }

    pub fn to_node(&self) -> NodeRef {
        NodeRef::new(&self.id, self.label())
    }
}

/// Notebook or section.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphNode {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
}

impl From<GraphNode> for NodeRef {
    fn from(node: GraphNode) -> Self {
        let display_name = node.display_name.unwrap_or_default();
        NodeRef::new(node.id, display_name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdOnly {
    pub(crate) id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphPage {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) last_modified_date_time: Option<String>,
    #[serde(default)]
    pub(crate) parent_notebook: Option<IdOnly>,
}

impl GraphPage {
    /// Pages are partitioned by notebook; when the service didn't expand the
    /// parent, everything falls back to one partition per site.
    pub(crate) fn into_item(self, fallback_collection: &str) -> ItemRef {
        let collection_id = self.parent_notebook.map(|nb| nb.id).unwrap_or_else(|| fallback_collection.to_string());
        ItemRef {
            collection_id,
            item_id: self.id,
            title: self.title.filter(|title| !title.trim().is_empty()),
            last_modified: self.last_modified_date_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenError {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

impl TokenError {
    pub(crate) fn describe(&self, status: u16) -> String {
        match (&self.error, &self.error_description) {
            (_, Some(description)) => description.lines().next().unwrap_or(description.as_str()).to_string(),
            (Some(error), None) => error.clone(),
            (None, None) => format!("token endpoint returned status {status}"),
        }
    }
}
