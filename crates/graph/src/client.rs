use async_trait::async_trait;
use exn::ResultExt;
use quire_remote::error::{ErrorKind, Result};
use quire_remote::{Credential, FetchedItem, ItemRef, NodeRef, RemoteCatalog};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::models::{Collection, GraphNode, GraphPage, Site};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
/// Upper bound on followed `@odata.nextLink`s for one listing.
const MAX_PAGES: usize = 10_000;
const PAGE_EXPAND: &str = "$expand=parentNotebook";

/// Authenticated-per-call HTTP access to Microsoft Graph.
///
/// Holds no credential itself: every call takes the [`Credential`] to use,
/// so token refresh stays the [`AuthProvider`](quire_remote::AuthProvider)'s
/// business.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    list_timeout: Duration,
    content_timeout: Duration,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>, list_timeout: Duration, content_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network("could not initialise HTTP client".to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            list_timeout,
            content_timeout,
        })
    }

    /// Bind to one SharePoint site.
    pub fn site(&self, site_id: impl Into<String>) -> GraphCatalog {
        GraphCatalog {
            client: self.clone(),
            site_id: site_id.into(),
        }
    }

    /// Free-text site search.
    #[instrument(skip(self, credential))]
    pub async fn search_sites(&self, credential: &Credential, query: &str) -> Result<Vec<Site>> {
        let url = Url::parse_with_params(&format!("{}/sites", self.base_url), &[("search", query)])
            .or_raise(|| ErrorKind::InvalidResponse(format!("invalid base URL: {}", self.base_url)))?;
        self.get_all(credential, url.as_str()).await
    }

    async fn get_all<T: DeserializeOwned>(&self, credential: &Credential, url: &str) -> Result<Vec<T>> {
        let mut items = vec![];
        let mut next = Some(url.to_string());
        let mut pages = 0;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                exn::bail!(ErrorKind::InvalidResponse(format!("pagination did not terminate after {MAX_PAGES} pages")));
            }
            let page: Collection<T> = self.get_json(credential, &url).await?;
            items.extend(page.value);
            // A link pointing back at the page we just read would loop forever.
            next = page.next_link.filter(|link| *link != url);
        }
        debug!(count = items.len(), pages, "listing complete");
        Ok(items)
    }

    async fn get_json<T: DeserializeOwned>(&self, credential: &Credential, url: &str) -> Result<T> {
        let request = self.http.get(url).timeout(self.list_timeout);
        let response = send(request, credential, url).await?;
        response.json().await.or_raise(|| ErrorKind::InvalidResponse(format!("malformed JSON from {url}")))
    }

    async fn get_text(&self, credential: &Credential, url: &str) -> Result<String> {
        let request = self.http.get(url).timeout(self.content_timeout);
        let response = send(request, credential, url).await?;
        match response.text().await {
            Ok(text) => Ok(text),
            Err(e) => {
                let kind = transport_error(&e, url);
                Err(e).or_raise(|| kind)
            },
        }
    }
}

async fn send(request: RequestBuilder, credential: &Credential, url: &str) -> Result<Response> {
    let response = match request.bearer_auth(credential.token()).send().await {
        Ok(response) => response,
        Err(e) => {
            let kind = transport_error(&e, url);
            return Err(e).or_raise(|| kind);
        },
    };
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    exn::bail!(status_error(status, url))
}

fn transport_error(e: &reqwest::Error, url: &str) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout(url.to_string())
    } else {
        ErrorKind::Network(url.to_string())
    }
}

fn status_error(status: StatusCode, url: &str) -> ErrorKind {
    match status {
        // The bearer token itself is bad; every following request would
        // fail the same way.
        StatusCode::UNAUTHORIZED => ErrorKind::Auth(format!("token rejected by {url}")),
        StatusCode::NOT_FOUND => ErrorKind::NotFound(url.to_string()),
        _ => ErrorKind::Status {
            status: status.as_u16(),
            url: url.to_string(),
        },
    }
}

/// [`RemoteCatalog`] over the OneNote notebooks of one SharePoint site.
///
/// Roots are sites, collections are notebooks, sub-collections are sections
/// and items are pages. Pages are partitioned in the cache by their parent
/// notebook.
#[derive(Debug, Clone)]
pub struct GraphCatalog {
    client: GraphClient,
    site_id: String,
}

impl GraphCatalog {
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    fn onenote_url(&self, path: &str) -> String {
        format!("{}/sites/{}/onenote/{path}", self.client.base_url, self.site_id)
    }

    fn notebooks_url(&self) -> String {
        self.onenote_url("notebooks")
    }

    fn sections_url(&self, notebook_id: &str) -> String {
        self.onenote_url(&format!("notebooks/{notebook_id}/sections"))
    }

    fn pages_url(&self, section_id: Option<&str>) -> String {
        match section_id {
            Some(section_id) => self.onenote_url(&format!("sections/{section_id}/pages?{PAGE_EXPAND}")),
            None => self.onenote_url(&format!("pages?{PAGE_EXPAND}")),
        }
    }

    fn page_url(&self, page_id: &str) -> String {
        self.onenote_url(&format!("pages/{page_id}?{PAGE_EXPAND}"))
    }

    fn content_url(&self, page_id: &str) -> String {
        self.onenote_url(&format!("pages/{page_id}/content"))
    }

    /// Every page of the site, regardless of section.
    #[instrument(skip(self, credential), fields(site_id = %self.site_id))]
    pub async fn list_all_items(&self, credential: &Credential) -> Result<Vec<ItemRef>> {
        let pages: Vec<GraphPage> = self.client.get_all(credential, &self.pages_url(None)).await?;
        Ok(pages.into_iter().map(|page| page.into_item(&self.site_id)).collect())
    }
}

#[async_trait]
impl RemoteCatalog for GraphCatalog {
    fn name(&self) -> &str {
        "graph"
    }

    /// Only the bound site can be listed; any other root is reported as not
    /// found rather than silently listing the bound site.
    #[instrument(skip(self, credential), fields(site_id = %root.id))]
    async fn list_collections(&self, credential: &Credential, root: &NodeRef) -> Result<Vec<NodeRef>> {
        if root.id != self.site_id {
            exn::bail!(ErrorKind::NotFound(format!("site {} (catalog is bound to {})", root.id, self.site_id)));
        }
        let notebooks: Vec<GraphNode> = self.client.get_all(credential, &self.notebooks_url()).await?;
        Ok(notebooks.into_iter().map(NodeRef::from).collect())
    }

    #[instrument(skip(self, credential), fields(notebook_id = %collection.id))]
    async fn list_sub_collections(&self, credential: &Credential, collection: &NodeRef) -> Result<Vec<NodeRef>> {
        let sections: Vec<GraphNode> = self.client.get_all(credential, &self.sections_url(&collection.id)).await?;
        Ok(sections.into_iter().map(NodeRef::from).collect())
    }

    #[instrument(skip(self, credential), fields(section_id = %sub_collection.id))]
    async fn list_items(&self, credential: &Credential, sub_collection: &NodeRef) -> Result<Vec<ItemRef>> {
        let pages: Vec<GraphPage> =
            self.client.get_all(credential, &self.pages_url(Some(&sub_collection.id))).await?;
        Ok(pages.into_iter().map(|page| page.into_item(&self.site_id)).collect())
    }

    #[instrument(skip(self, credential), fields(page_id = %item.item_id))]
    async fn fetch_item(&self, credential: &Credential, item: &ItemRef) -> Result<FetchedItem> {
        let raw_payload = self.client.get_text(credential, &self.content_url(&item.item_id)).await?;
        // The content endpoint carries no modification marker; the listing's
        // value is the one the page was fetched under.
        Ok(FetchedItem {
            raw_payload,
            last_modified: item.last_modified.clone(),
        })
    }

    #[instrument(skip(self, credential))]
    async fn get_item(&self, credential: &Credential, item_id: &str) -> Result<ItemRef> {
        let page: GraphPage = self.client.get_json(credential, &self.page_url(item_id)).await?;
        Ok(page.into_item(&self.site_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn catalog() -> GraphCatalog {
        GraphClient::new("https://graph.example.com/v1.0/", Duration::from_secs(30), Duration::from_secs(60))
            .unwrap()
            .site("site-1")
    }

    #[test]
    fn test_urls() {
        let catalog = catalog();
        assert_eq!(catalog.notebooks_url(), "https://graph.example.com/v1.0/sites/site-1/onenote/notebooks");
        assert_eq!(
            catalog.sections_url("nb-1"),
            "https://graph.example.com/v1.0/sites/site-1/onenote/notebooks/nb-1/sections"
        );
        assert_eq!(
            catalog.pages_url(Some("sec-1")),
            "https://graph.example.com/v1.0/sites/site-1/onenote/sections/sec-1/pages?$expand=parentNotebook"
        );
        assert_eq!(
            catalog.content_url("1-abc!2"),
            "https://graph.example.com/v1.0/sites/site-1/onenote/pages/1-abc!2/content"
        );
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, true)]
    #[case(StatusCode::FORBIDDEN, false)]
    #[case(StatusCode::NOT_FOUND, false)]
    #[case(StatusCode::TOO_MANY_REQUESTS, false)]
    fn test_only_unauthorized_is_fatal(#[case] status: StatusCode, #[case] fatal: bool) {
        assert_eq!(status_error(status, "https://x").is_fatal(), fatal);
    }

    #[test]
    fn test_throttling_is_retryable() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "https://x").is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, "https://x").is_retryable());
        assert!(!status_error(StatusCode::NOT_FOUND, "https://x").is_retryable());
    }

    #[tokio::test]
    async fn test_foreign_root_is_rejected() {
        let err = catalog()
            .list_collections(&Credential::bearer("t"), &NodeRef::new("other-site", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(*err, ErrorKind::NotFound(_)));
    }
}
