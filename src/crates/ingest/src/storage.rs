//! Transactional storage component
//!
//! The last pipeline stage: persists the page, its site containment, its
//! keywords, and the detected keyword relationships in one transaction.
//! Any failure rolls the whole write back, so a failed run never leaves a
//! page with a partial keyword set.

use crate::page::PageService;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use weaver_domain::{KeywordIdentifier, StoredRelationship};
use weaver_pipeline::{ComponentType, PipelineComponent, PipelineError, SharedPage};
use weaver_store::{GraphOperations, RelationshipSpec, Transaction};

pub struct StorageComponent {
    pages: Arc<PageService>,
}

impl StorageComponent {
    pub fn new(pages: Arc<PageService>) -> Self {
        Self { pages }
    }

    fn ops(&self) -> &Arc<GraphOperations> {
        self.pages.graph_ops()
    }

    fn keyword_properties(keyword: &KeywordIdentifier) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("id".into(), json!(keyword.id));
        props.insert("text".into(), json!(keyword.canonical_text));
        props.insert("canonical_text".into(), json!(keyword.canonical_text));
        props.insert("normalized_text".into(), json!(keyword.normalized_text));
        props.insert("keyword_type".into(), json!(keyword.keyword_type.as_str()));
        props.insert("score".into(), json!(keyword.score));
        props.insert(
            "variants".into(),
            json!(keyword.variants.iter().collect::<Vec<_>>()),
        );
        props.insert("updated_at".into(), json!(keyword.updated_at.to_rfc3339()));
        props
    }

    async fn store_keywords(
        &self,
        tx: &mut Transaction,
        page_url: &str,
        language: &str,
        keywords: &[KeywordIdentifier],
    ) -> weaver_pipeline::Result<()> {
        for keyword in keywords {
            // keyword nodes are shared across pages; upsert by identity
            self.ops()
                .create_or_update_node(
                    &["Keyword"],
                    Self::keyword_properties(keyword),
                    &["id"],
                    Some(&mut *tx),
                )
                .await
                .map_err(|e| PipelineError::Processing(format!("keyword upsert failed: {e}")))?;

            let query = "MATCH (p:Page {url: $page_url})\n\
                         MATCH (k:Keyword {id: $keyword_id})\n\
                         MERGE (p)-[r:HAS_KEYWORD]->(k)\n\
                         SET r.score = $score, r.weight = $score, r.language = $language\n\
                         RETURN type(r) AS rel_type";
            let mut params = Map::new();
            params.insert("page_url".into(), json!(page_url));
            params.insert("keyword_id".into(), json!(keyword.id));
            params.insert("score".into(), json!(keyword.score));
            params.insert("language".into(), json!(language));

            self.ops()
                .connection()
                .execute_query(query, &params, Some(&mut *tx))
                .await
                .map_err(|e| PipelineError::Processing(format!("keyword edge failed: {e}")))?;
        }
        Ok(())
    }

    async fn store_relationships(
        &self,
        tx: &mut Transaction,
        relationships: &[StoredRelationship],
    ) -> weaver_pipeline::Result<usize> {
        if relationships.is_empty() {
            return Ok(0);
        }

        let specs: Vec<RelationshipSpec> = relationships
            .iter()
            .map(|rel| {
                let mut props = Map::new();
                props.insert("confidence".into(), json!(rel.confidence));
                props.insert("score".into(), json!(rel.confidence));
                props.insert("evidence_count".into(), json!(rel.evidence_count));
                // evidence sentences kept as an encoded list; the store
                // holds primitives only
                props.insert(
                    "evidence".into(),
                    json!(serde_json::to_string(&rel.evidence).unwrap_or_default()),
                );
                RelationshipSpec {
                    start_id: rel.source_id.clone(),
                    end_id: rel.target_id.clone(),
                    relationship_type: rel.relation_type.edge_type(),
                    properties: props,
                }
            })
            .collect();

        self.ops()
            .batch_create_relationships(&specs, None, Some(tx))
            .await
            .map_err(|e| PipelineError::Processing(format!("relationship batch failed: {e}")))
    }
}

#[async_trait]
impl PipelineComponent for StorageComponent {
    fn kind(&self) -> ComponentType {
        ComponentType::Storage
    }

    fn name(&self) -> &'static str {
        "StorageComponent"
    }

    async fn validate(&self, page: &SharedPage) -> weaver_pipeline::Result<bool> {
        let page = page.lock().await;
        if page.url.is_empty() || page.domain.is_empty() {
            return Err(PipelineError::Validation(
                "storage validation failed: page has no url or domain".into(),
            ));
        }
        Ok(true)
    }

    async fn process(&self, page: &SharedPage) -> weaver_pipeline::Result<()> {
        let snapshot = page.lock().await.clone();
        let language = snapshot
            .metadata
            .language
            .clone()
            .unwrap_or_else(|| "en".to_string());

        let keywords: Vec<KeywordIdentifier> = snapshot
            .metadata
            .custom
            .get("keyword_details")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let relationships: Vec<StoredRelationship> = snapshot
            .metadata
            .custom
            .get("relationships")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let site_url = snapshot
            .metadata
            .custom
            .get("site_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let scheme = snapshot.url.split("://").next().unwrap_or("https");
                format!("{scheme}://{}", snapshot.domain)
            });

        let mut tx = self
            .ops()
            .connection()
            .begin()
            .await
            .map_err(|e| PipelineError::Processing(format!("failed to open transaction: {e}")))?;

        let result = async {
            self.pages
                .persist_page(&snapshot, Some(&mut tx))
                .await
                .map_err(|e| PipelineError::Processing(e.to_string()))?;
            self.pages
                .ensure_site_for_page(&snapshot, &site_url, Some(&mut tx))
                .await
                .map_err(|e| PipelineError::Processing(e.to_string()))?;
            self.store_keywords(&mut tx, &snapshot.url, &language, &keywords)
                .await?;
            let edge_count = self.store_relationships(&mut tx, &relationships).await?;
            Ok::<usize, PipelineError>(edge_count)
        }
        .await;

        match result {
            Ok(edge_count) => {
                tx.commit().await.map_err(|e| {
                    PipelineError::Processing(format!("storage commit failed: {e}"))
                })?;
                info!(
                    url = %snapshot.url,
                    keywords = keywords.len(),
                    relationships = edge_count,
                    "page stored"
                );
                Ok(())
            }
            Err(e) => {
                warn!(url = %snapshot.url, error = %e, "storage failed, rolling back");
                if let Err(rollback_error) = tx.rollback().await {
                    debug!(error = %rollback_error, "rollback reported failure");
                }
                Err(e)
            }
        }
    }
}
