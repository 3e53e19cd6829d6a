//! Typed node and edge operations over the transaction layer
//!
//! Nodes are addressed by their application-assigned `id` property, which
//! the schema constrains unique. Queries project nodes to plain property
//! maps so rows stay primitive-valued.

use crate::backend::{Params, Row};
use crate::connection::GraphConnection;
use crate::error::{Result, StoreError};
use crate::transaction::Transaction;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// A stored node
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

impl Node {
    fn from_row(row: &Row) -> Option<Self> {
        let properties = row.get("node")?.as_object()?.clone();
        let id = row
            .get("node_id")
            .and_then(Value::as_str)
            .or_else(|| properties.get("id").and_then(Value::as_str))?
            .to_string();
        let labels = row
            .get("node_labels")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            id,
            labels,
            properties,
        })
    }
}

/// A node related to some start node, with the connecting edge's details
#[derive(Debug, Clone)]
pub struct RelatedNode {
    pub node: Node,
    pub relationship_type: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

/// Input for batched relationship creation
#[derive(Debug, Clone)]
pub struct RelationshipSpec {
    pub start_id: String,
    pub end_id: String,
    pub relationship_type: String,
    pub properties: Map<String, Value>,
}

/// Default chunk size for batched writes
const DEFAULT_BATCH_SIZE: usize = 100;

/// Typed CRUD over the graph
pub struct GraphOperations {
    connection: Arc<GraphConnection>,
}

impl GraphOperations {
    pub fn new(connection: Arc<GraphConnection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<GraphConnection> {
        &self.connection
    }

    fn validate_label(label: &str, operation: &str) -> Result<()> {
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::operation(
                operation,
                format!("invalid label: {label:?}"),
                None,
            ));
        }
        Ok(())
    }

    /// Create a node, or upsert it by the given match properties.
    ///
    /// With non-empty `match_properties` the node is MERGEd on those
    /// properties within the labels and its full property set replaced;
    /// otherwise a fresh node is created.
    pub async fn create_or_update_node(
        &self,
        labels: &[&str],
        properties: Map<String, Value>,
        match_properties: &[&str],
        tx: Option<&mut Transaction>,
    ) -> Result<Node> {
        for label in labels {
            Self::validate_label(label, "create_or_update_node")?;
        }
        let labels_str = labels.join(":");

        let match_entries: Vec<&str> = match_properties
            .iter()
            .filter(|name| properties.contains_key(**name))
            .copied()
            .collect();

        let (query, params) = if match_entries.is_empty() {
            let query = format!(
                "CREATE (n:{labels_str})\n\
                 SET n = $properties\n\
                 RETURN properties(n) AS node, n.id AS node_id, labels(n) AS node_labels"
            );
            let mut params = Params::new();
            params.insert("properties".into(), Value::Object(properties));
            (query, params)
        } else {
            let pattern = match_entries
                .iter()
                .map(|name| format!("{name}: ${name}"))
                .collect::<Vec<_>>()
                .join(", ");
            let query = format!(
                "MERGE (n:{labels_str} {{{pattern}}})\n\
                 SET n = $properties\n\
                 RETURN properties(n) AS node, n.id AS node_id, labels(n) AS node_labels"
            );
            let mut params = Params::new();
            for name in &match_entries {
                params.insert((*name).to_string(), properties[*name].clone());
            }
            params.insert("properties".into(), Value::Object(properties));
            (query, params)
        };

        let rows = self.connection.execute_query(&query, &params, tx).await?;
        rows.first().and_then(Node::from_row).ok_or_else(|| {
            StoreError::operation(
                "create_or_update_node",
                "node creation returned no result",
                None,
            )
        })
    }

    /// Fetch a node by its `id` property; `None` when absent
    pub async fn get_node_by_id(
        &self,
        node_id: &str,
        tx: Option<&mut Transaction>,
    ) -> Result<Option<Node>> {
        let query = "MATCH (n {id: $node_id})\n\
                     RETURN properties(n) AS node, n.id AS node_id, labels(n) AS node_labels";
        let mut params = Params::new();
        params.insert("node_id".into(), json!(node_id));

        let rows = self.connection.execute_query(query, &params, tx).await?;
        Ok(rows.first().and_then(Node::from_row))
    }

    /// Fetch the first node with the given label and property value;
    /// `None` when absent
    pub async fn get_node_by_property(
        &self,
        label: &str,
        property_name: &str,
        property_value: &Value,
        tx: Option<&mut Transaction>,
    ) -> Result<Option<Node>> {
        Self::validate_label(label, "get_node_by_property")?;
        Self::validate_label(property_name, "get_node_by_property")?;

        let query = format!(
            "MATCH (n:{label})\n\
             WHERE n.{property_name} = $property_value\n\
             RETURN properties(n) AS node, n.id AS node_id, labels(n) AS node_labels\n\
             LIMIT 1"
        );
        let mut params = Params::new();
        params.insert("property_value".into(), property_value.clone());

        let rows = self.connection.execute_query(&query, &params, tx).await?;
        Ok(rows.first().and_then(Node::from_row))
    }

    /// Nodes matching exact-value conditions on properties
    pub async fn query_nodes(
        &self,
        label: &str,
        conditions: &Map<String, Value>,
        tx: Option<&mut Transaction>,
    ) -> Result<Vec<Node>> {
        Self::validate_label(label, "query_nodes")?;

        let mut clauses = Vec::new();
        let mut params = Params::new();
        for (name, value) in conditions {
            if value.is_null() {
                continue;
            }
            Self::validate_label(name, "query_nodes")?;
            clauses.push(format!("n.{name} = ${name}"));
            params.insert(name.clone(), value.clone());
        }

        let mut query = format!("MATCH (n:{label})");
        if !clauses.is_empty() {
            query.push_str("\nWHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str("\nRETURN properties(n) AS node, n.id AS node_id, labels(n) AS node_labels");

        let rows = self.connection.execute_query(&query, &params, tx).await?;
        Ok(rows.iter().filter_map(Node::from_row).collect())
    }

    /// Create one relationship, validating both endpoints first
    pub async fn create_relationship(
        &self,
        start_id: &str,
        end_id: &str,
        relationship_type: &str,
        properties: Map<String, Value>,
        mut tx: Option<&mut Transaction>,
    ) -> Result<()> {
        if relationship_type.is_empty() {
            return Err(StoreError::operation(
                "create_relationship",
                "relationship type must not be empty",
                None,
            ));
        }
        Self::validate_label(relationship_type, "create_relationship")?;

        for (endpoint, node_id) in [("start", start_id), ("end", end_id)] {
            let found = self.get_node_by_id(node_id, tx.as_deref_mut()).await?;
            if found.is_none() {
                let mut details = Map::new();
                details.insert("endpoint".into(), json!(endpoint));
                details.insert("node_id".into(), json!(node_id));
                return Err(StoreError::operation_with_details(
                    "create_relationship",
                    format!("{endpoint} node not found: {node_id}"),
                    details,
                    None,
                ));
            }
        }

        let query = format!(
            "MATCH (start {{id: $start_id}}), (end {{id: $end_id}})\n\
             MERGE (start)-[r:{relationship_type}]->(end)\n\
             SET r += $properties\n\
             RETURN type(r) AS rel_type"
        );
        let mut params = Params::new();
        params.insert("start_id".into(), json!(start_id));
        params.insert("end_id".into(), json!(end_id));
        params.insert("properties".into(), Value::Object(properties));

        let rows = self.connection.execute_query(&query, &params, tx).await?;
        if rows.is_empty() {
            return Err(StoreError::operation(
                "create_relationship",
                "relationship creation returned no result",
                None,
            ));
        }
        debug!(start_id, end_id, relationship_type, "created relationship");
        Ok(())
    }

    /// Outgoing neighbors filtered by edge type and minimum score,
    /// ordered score-descending, capped at `limit`
    pub async fn find_related_nodes(
        &self,
        start_id: &str,
        relationship_types: Option<&[&str]>,
        min_score: f64,
        limit: u32,
        tx: Option<&mut Transaction>,
    ) -> Result<Vec<RelatedNode>> {
        let rel_filter = match relationship_types {
            Some(types) if !types.is_empty() => {
                for t in types {
                    Self::validate_label(t, "find_related_nodes")?;
                }
                format!(":{}", types.join("|"))
            }
            _ => String::new(),
        };

        let query = format!(
            "MATCH (start {{id: $start_id}})-[r{rel_filter}]->(related)\n\
             WHERE r.score >= $min_score\n\
             WITH related, r ORDER BY r.score DESC\n\
             LIMIT $limit\n\
             RETURN properties(related) AS node, related.id AS node_id,\n\
                    labels(related) AS node_labels, type(r) AS relationship_type,\n\
                    r.score AS score, properties(r) AS rel_properties"
        );
        let mut params = Params::new();
        params.insert("start_id".into(), json!(start_id));
        params.insert("min_score".into(), json!(min_score));
        params.insert("limit".into(), json!(limit));

        let rows = self.connection.execute_query(&query, &params, tx).await?;
        let related = rows
            .iter()
            .filter_map(|row| {
                let node = Node::from_row(row)?;
                Some(RelatedNode {
                    node,
                    relationship_type: row
                        .get("relationship_type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: row.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                    metadata: row
                        .get("rel_properties")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .collect();
        Ok(related)
    }

    /// Create relationships in chunks; a chunk failure fails the whole
    /// call so the enclosing transaction can roll back
    pub async fn batch_create_relationships(
        &self,
        specs: &[RelationshipSpec],
        batch_size: Option<usize>,
        mut tx: Option<&mut Transaction>,
    ) -> Result<usize> {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let mut created = 0usize;

        for chunk in specs.chunks(batch_size) {
            // UNWIND needs one statement per edge type
            let mut by_type: Map<String, Value> = Map::new();
            for spec in chunk {
                Self::validate_label(&spec.relationship_type, "batch_create_relationships")?;
                let entry = by_type
                    .entry(spec.relationship_type.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(json!({
                        "start_id": spec.start_id,
                        "end_id": spec.end_id,
                        "properties": Value::Object(spec.properties.clone()),
                    }));
                }
            }

            for (relationship_type, items) in by_type {
                let count = items.as_array().map(Vec::len).unwrap_or(0);
                let query = format!(
                    "UNWIND $relationships AS rel\n\
                     MATCH (start {{id: rel.start_id}}), (end {{id: rel.end_id}})\n\
                     MERGE (start)-[r:{relationship_type}]->(end)\n\
                     SET r += rel.properties\n\
                     RETURN count(r) AS created"
                );
                let mut params = Params::new();
                params.insert("relationships".into(), items);

                self.connection
                    .execute_query(&query, &params, tx.as_deref_mut())
                    .await
                    .map_err(|e| {
                        warn!(relationship_type = %relationship_type, "batch chunk failed");
                        let mut details = Map::new();
                        details.insert("relationship_type".into(), json!(relationship_type));
                        details.insert("chunk_size".into(), json!(count));
                        StoreError::operation_with_details(
                            "batch_create_relationships",
                            "chunk failed",
                            details,
                            Some(e),
                        )
                    })?;
                created += count;
            }
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::testing::MockBackend;

    fn ops(backend: Arc<MockBackend>) -> GraphOperations {
        GraphOperations::new(Arc::new(GraphConnection::with_backend(
            backend,
            ConnectionConfig::default(),
        )))
    }

    fn node_row(id: &str, label: &str) -> Row {
        let mut node = Map::new();
        node.insert("id".into(), json!(id));
        let mut row = Row::new();
        row.insert("node".into(), Value::Object(node));
        row.insert("node_id".into(), json!(id));
        row.insert("node_labels".into(), json!([label]));
        row
    }

    #[tokio::test]
    async fn test_upsert_uses_merge_on_match_properties() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_with_rows("MERGE (n:Page", vec![node_row("p-1", "Page")]);
        let ops = ops(backend.clone());

        let mut props = Map::new();
        props.insert("id".into(), json!("p-1"));
        props.insert("url".into(), json!("https://example.com/a"));
        let node = ops
            .create_or_update_node(&["Page"], props, &["url"], None)
            .await
            .unwrap();

        assert_eq!(node.id, "p-1");
        let merge = backend.queries_matching("MERGE (n:Page {url: $url})");
        assert_eq!(merge.len(), 1);
    }

    #[tokio::test]
    async fn test_create_without_match_properties() {
        let backend = Arc::new(MockBackend::new());
        backend.respond_with_rows("CREATE (n:Keyword", vec![node_row("kw_1", "Keyword")]);
        let ops = ops(backend.clone());

        let mut props = Map::new();
        props.insert("id".into(), json!("kw_1"));
        ops.create_or_update_node(&["Keyword"], props, &[], None)
            .await
            .unwrap();

        assert_eq!(backend.queries_matching("CREATE (n:Keyword)").len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_label_rejected() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend);
        let result = ops
            .create_or_update_node(&["Page) DETACH DELETE n //"], Map::new(), &[], None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_node_by_id_none_on_miss() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend);
        let node = ops.get_node_by_id("missing", None).await.unwrap();
        assert!(node.is_none());
    }

    #[tokio::test]
    async fn test_create_relationship_validates_endpoints() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend);

        let result = ops
            .create_relationship("kw_a", "kw_b", "RELATED", Map::new(), None)
            .await;
        match result.unwrap_err() {
            StoreError::Operation {
                operation, details, ..
            } => {
                assert_eq!(operation, "create_relationship");
                assert_eq!(details.get("endpoint").unwrap(), "start");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_relationship_rejects_empty_type() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend);
        let result = ops
            .create_relationship("kw_a", "kw_b", "", Map::new(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_related_nodes_builds_type_filter() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend.clone());

        ops.find_related_nodes("kw_a", Some(&["RELATED", "SYNONYM"]), 0.5, 10, None)
            .await
            .unwrap();

        let queries = backend.queries_matching("[r:RELATED|SYNONYM]");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].params.get("min_score").unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_batch_creates_in_chunks() {
        let backend = Arc::new(MockBackend::new());
        let ops = ops(backend.clone());

        let specs: Vec<RelationshipSpec> = (0..5)
            .map(|i| RelationshipSpec {
                start_id: format!("kw_{i}"),
                end_id: format!("kw_{}", i + 1),
                relationship_type: "RELATED".to_string(),
                properties: Map::new(),
            })
            .collect();

        let created = ops
            .batch_create_relationships(&specs, Some(2), None)
            .await
            .unwrap();
        assert_eq!(created, 5);
        // 5 specs in chunks of 2 -> 3 UNWIND statements
        assert_eq!(backend.queries_matching("UNWIND").len(), 3);
    }

    #[tokio::test]
    async fn test_batch_chunk_failure_fails_call() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(
            "UNWIND",
            StoreError::QueryExecution {
                message: "boom".into(),
                code: None,
                retryable: false,
            },
        );
        let ops = ops(backend);

        let specs = vec![RelationshipSpec {
            start_id: "kw_a".into(),
            end_id: "kw_b".into(),
            relationship_type: "RELATED".into(),
            properties: Map::new(),
        }];
        let result = ops.batch_create_relationships(&specs, None, None).await;
        assert!(result.is_err());
    }
}
