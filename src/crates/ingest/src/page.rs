//! Page aggregate persistence
//!
//! Reconstructs and persists `Page` aggregates over the typed graph
//! operations, and keeps the owning `Site` node and its `CONTAINS` edge
//! up to date.

use crate::error::{Result, ServiceError};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use weaver_domain::{Page, PageStatus, Site};
use weaver_store::{GraphOperations, Node, Transaction};

/// Service for page and site aggregates
pub struct PageService {
    ops: Arc<GraphOperations>,
}

impl PageService {
    pub fn new(ops: Arc<GraphOperations>) -> Self {
        Self { ops }
    }

    pub fn graph_ops(&self) -> &Arc<GraphOperations> {
        &self.ops
    }

    fn node_to_page(node: &Node) -> Result<Page> {
        Page::from_store_properties(&node.properties)
            .map_err(|e| ServiceError::StatusQuery(format!("malformed page node: {e}")))
    }

    /// Fetch a page by URL; `None` when absent
    pub async fn get_page_by_url(
        &self,
        url: &str,
        tx: Option<&mut Transaction>,
    ) -> Result<Option<Page>> {
        let node = self
            .ops
            .get_node_by_property("Page", "url", &json!(url), tx)
            .await?;
        node.as_ref().map(Self::node_to_page).transpose()
    }

    /// Fetch an existing page or persist the given one
    pub async fn get_or_create_page(
        &self,
        page: &Page,
        mut tx: Option<&mut Transaction>,
    ) -> Result<Page> {
        if let Some(existing) = self.get_page_by_url(&page.url, tx.as_deref_mut()).await? {
            debug!(url = %page.url, "page already stored");
            return Ok(existing);
        }
        self.persist_page(page, tx).await?;
        Ok(page.clone())
    }

    /// Upsert the page node by URL with its full flat property projection
    pub async fn persist_page(&self, page: &Page, tx: Option<&mut Transaction>) -> Result<Node> {
        let properties = page.to_store_properties();
        let node = self
            .ops
            .create_or_update_node(&["Page"], properties, &["url"], tx)
            .await?;
        debug!(url = %page.url, "persisted page");
        Ok(node)
    }

    /// Update just the status of a stored page
    pub async fn update_page_status(
        &self,
        url: &str,
        status: PageStatus,
        tx: Option<&mut Transaction>,
    ) -> Result<()> {
        let query = "MATCH (p:Page {url: $url})\n\
                     SET p.status = $status, p.updated_at = $updated_at\n\
                     RETURN p.url AS url";
        let mut params = Map::new();
        params.insert("url".into(), json!(url));
        params.insert("status".into(), json!(status.as_str()));
        params.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));

        let rows = self
            .ops
            .connection()
            .execute_query(query, &params, tx)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::StatusQuery(format!("page not found: {url}")));
        }
        Ok(())
    }

    /// Pages with the given status
    pub async fn query_pages_by_status(
        &self,
        status: PageStatus,
        tx: Option<&mut Transaction>,
    ) -> Result<Vec<Page>> {
        let mut conditions = Map::new();
        conditions.insert("status".into(), json!(status.as_str()));
        let nodes = self.ops.query_nodes("Page", &conditions, tx).await?;
        nodes.iter().map(Self::node_to_page).collect()
    }

    /// Pages under a domain
    pub async fn query_pages_by_domain(
        &self,
        domain: &str,
        tx: Option<&mut Transaction>,
    ) -> Result<Vec<Page>> {
        let mut conditions = Map::new();
        conditions.insert("domain".into(), json!(domain));
        let nodes = self.ops.query_nodes("Page", &conditions, tx).await?;
        nodes.iter().map(Self::node_to_page).collect()
    }

    /// Upsert the site node for a page and connect the page with a
    /// `CONTAINS` edge. Site counters are maintained store-side.
    pub async fn ensure_site_for_page(
        &self,
        page: &Page,
        site_url: &str,
        mut tx: Option<&mut Transaction>,
    ) -> Result<()> {
        let site = Site::new(site_url, page.domain.clone())
            .map_err(|e| ServiceError::Enqueue(e.to_string()))?;

        // MERGE by url keeps one Site per domain root; page_count only
        // moves when the containment edge is first created, so re-ingesting
        // a page does not drift the counter
        let query = "MERGE (s:Site {url: $url})\n\
                     ON CREATE SET s = $properties\n\
                     SET s.last_updated = $now\n\
                     WITH s\n\
                     MATCH (p:Page {url: $page_url})\n\
                     MERGE (s)-[c:CONTAINS]->(p)\n\
                     ON CREATE SET s.page_count = coalesce(s.page_count, 0) + 1\n\
                     RETURN s.url AS url";
        let mut params = Map::new();
        params.insert("url".into(), json!(site_url));
        params.insert("properties".into(), Value::Object(site.to_store_properties()));
        params.insert("now".into(), json!(Utc::now().to_rfc3339()));
        params.insert("page_url".into(), json!(page.url));

        self.ops
            .connection()
            .execute_query(query, &params, tx.as_deref_mut())
            .await?;
        debug!(site = site_url, page = %page.url, "ensured site containment");
        Ok(())
    }

    /// Record a visit on a stored page, bumping the visit counter
    pub async fn record_visit(&self, url: &str, tx: Option<&mut Transaction>) -> Result<()> {
        let query = "MATCH (p:Page {url: $url})\n\
                     SET p.metric_visit_count = coalesce(p.metric_visit_count, 0) + 1,\n\
                         p.metric_last_visited = $now,\n\
                         p.last_accessed = $now\n\
                     RETURN p.url AS url";
        let mut params = Map::new();
        params.insert("url".into(), json!(url));
        params.insert("now".into(), json!(Utc::now().to_rfc3339()));
        self.ops.connection().execute_query(query, &params, tx).await?;
        Ok(())
    }

    /// Count of active pages for observability endpoints
    pub async fn count_pages_by_status(&self, status: PageStatus) -> Result<usize> {
        let pages = self.query_pages_by_status(status, None).await?;
        Ok(pages.len())
    }
}

impl std::fmt::Debug for PageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageService").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_store::testing::MockBackend;
    use weaver_store::{ConnectionConfig, GraphConnection};

    fn service(backend: Arc<MockBackend>) -> PageService {
        let connection = Arc::new(GraphConnection::with_backend(
            backend,
            ConnectionConfig::default(),
        ));
        PageService::new(Arc::new(GraphOperations::new(connection)))
    }

    fn page_node_row(page: &Page) -> weaver_store::Row {
        let mut row = weaver_store::Row::new();
        row.insert("node".into(), Value::Object(page.to_store_properties()));
        row.insert("node_id".into(), json!(page.id.to_string()));
        row.insert("node_labels".into(), json!(["Page"]));
        row
    }

    #[tokio::test]
    async fn test_get_page_by_url_roundtrip() {
        let backend = Arc::new(MockBackend::new());
        let mut page = Page::new("https://example.com/a", "example.com").unwrap();
        page.title = Some("Example".into());
        backend.respond_with_rows("MATCH (n:Page)", vec![page_node_row(&page)]);

        let service = service(backend);
        let found = service
            .get_page_by_url("https://example.com/a", None)
            .await
            .unwrap()
            .expect("page");
        assert_eq!(found.url, page.url);
        assert_eq!(found.title.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn test_persist_page_merges_by_url() {
        let backend = Arc::new(MockBackend::new());
        let page = Page::new("https://example.com/a", "example.com").unwrap();
        backend.respond_with_rows("MERGE (n:Page", vec![page_node_row(&page)]);

        let service = service(backend.clone());
        service.persist_page(&page, None).await.unwrap();

        let merges = backend.queries_matching("MERGE (n:Page {url: $url})");
        assert_eq!(merges.len(), 1);
    }

    #[tokio::test]
    async fn test_update_status_missing_page_errors() {
        let backend = Arc::new(MockBackend::new());
        let service = service(backend);
        let result = service
            .update_page_status("https://nowhere.example", PageStatus::Active, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_site_creates_contains_edge() {
        let backend = Arc::new(MockBackend::new());
        let page = Page::new("https://example.com/a", "example.com").unwrap();
        let service = service(backend.clone());

        service
            .ensure_site_for_page(&page, "https://example.com", None)
            .await
            .unwrap();

        let queries = backend.queries_matching("MERGE (s)-[c:CONTAINS]->(p)");
        assert_eq!(queries.len(), 1);
        // the page counter only moves when the containment edge is new
        assert!(queries[0]
            .query
            .contains("ON CREATE SET s.page_count = coalesce(s.page_count, 0) + 1"));
    }
}
