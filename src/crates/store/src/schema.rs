//! Schema management: constraints, indexes, versioning, migration

use crate::backend::Params;
use crate::connection::GraphConnection;
use crate::error::{Result, StoreError};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: &str = "1.1";

const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT site_url IF NOT EXISTS FOR (s:Site) REQUIRE s.url IS UNIQUE",
    "CREATE CONSTRAINT page_url IF NOT EXISTS FOR (p:Page) REQUIRE p.url IS UNIQUE",
    "CREATE CONSTRAINT keyword_id IF NOT EXISTS FOR (k:Keyword) REQUIRE k.id IS UNIQUE",
    "CREATE CONSTRAINT keyword_text IF NOT EXISTS FOR (k:Keyword) REQUIRE k.text IS UNIQUE",
];

const PROPERTY_INDEXES: &[&str] = &[
    "CREATE INDEX page_metadata_quality IF NOT EXISTS FOR (p:Page) ON (p.metadata_quality_score)",
    "CREATE INDEX page_embedding_status IF NOT EXISTS FOR (p:Page) ON (p.embedding_status)",
    "CREATE INDEX keyword_normalized_text IF NOT EXISTS FOR (k:Keyword) ON (k.normalized_text)",
    "CREATE INDEX keyword_type IF NOT EXISTS FOR (k:Keyword) ON (k.keyword_type)",
];

const EDGE_INDEXES: &[&str] = &[
    "CREATE INDEX has_keyword_weight IF NOT EXISTS FOR ()-[r:HAS_KEYWORD]-() ON (r.weight)",
    "CREATE INDEX has_keyword_score IF NOT EXISTS FOR ()-[r:HAS_KEYWORD]-() ON (r.score)",
];

/// Relationship types every deployment must expose; missing ones are
/// seeded with `_SchemaInit` marker nodes so edge indexes can build
const REQUIRED_RELATIONSHIP_TYPES: &[&str] = &[
    "CONTAINS",
    "HAS_KEYWORD",
    "HAS_CHUNK",
    "LINKS_TO",
    "SIMILAR_TO",
    "SEMANTIC_SIMILAR",
    "PART_OF",
    "SYNONYM",
    "RELATED",
    "HIERARCHICAL",
    "PRECEDES",
    "REFERENCES",
    "PART_OF_KEYWORD",
];

/// Initializes and migrates the graph schema
pub struct SchemaManager {
    connection: Arc<GraphConnection>,
}

impl SchemaManager {
    pub fn new(connection: Arc<GraphConnection>) -> Self {
        Self { connection }
    }

    /// Initialize or upgrade the schema to the current version.
    ///
    /// Failures here are fatal at startup.
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing graph schema");

        self.create_constraints().await?;
        self.create_indexes().await?;

        let current = self.get_version().await?;
        if current != CURRENT_SCHEMA_VERSION {
            self.migrate(&current).await?;
        }

        info!(version = CURRENT_SCHEMA_VERSION, "schema ready");
        Ok(())
    }

    async fn create_constraints(&self) -> Result<()> {
        for statement in CONSTRAINTS {
            self.connection
                .execute_query(statement, &Params::new(), None)
                .await
                .map_err(|e| StoreError::Schema(format!("constraint failed: {e}")))?;
        }
        debug!(count = CONSTRAINTS.len(), "constraints ensured");
        Ok(())
    }

    async fn create_indexes(&self) -> Result<()> {
        for statement in PROPERTY_INDEXES {
            self.connection
                .execute_query(statement, &Params::new(), None)
                .await
                .map_err(|e| StoreError::Schema(format!("index failed: {e}")))?;
        }
        // relationship index syntax varies across server versions; try and
        // log rather than fail startup
        for statement in EDGE_INDEXES {
            if let Err(e) = self
                .connection
                .execute_query(statement, &Params::new(), None)
                .await
            {
                warn!(error = %e, "relationship index creation failed");
            }
        }
        Ok(())
    }

    /// Read the recorded schema version; "0.0" when none is recorded
    pub async fn get_version(&self) -> Result<String> {
        let query = "OPTIONAL MATCH (s:SchemaVersion)\n\
                     WITH s ORDER BY s.timestamp DESC LIMIT 1\n\
                     RETURN coalesce(s.version, \"0.0\") AS version";
        let rows = self
            .connection
            .execute_query(query, &Params::new(), None)
            .await
            .map_err(|e| StoreError::Schema(format!("failed to read schema version: {e}")))?;

        Ok(rows
            .first()
            .and_then(|row| row.get("version"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("0.0")
            .to_string())
    }

    /// Record a new schema version
    pub async fn set_version(&self, version: &str) -> Result<()> {
        let query = "CREATE (s:SchemaVersion {version: $version, timestamp: datetime()})";
        let mut params = Params::new();
        params.insert("version".into(), json!(version));
        self.connection
            .execute_query(query, &params, None)
            .await
            .map_err(|e| StoreError::Schema(format!("failed to set schema version: {e}")))?;
        info!(version, "schema version recorded");
        Ok(())
    }

    /// Migrate from an older schema version to the current one
    pub async fn migrate(&self, from_version: &str) -> Result<()> {
        info!(from_version, to_version = CURRENT_SCHEMA_VERSION, "migrating schema");

        if from_version == "0.0" || from_version == "1.0" {
            self.seed_relationship_types().await?;
        } else if from_version != CURRENT_SCHEMA_VERSION {
            return Err(StoreError::Schema(format!(
                "no migration path from version {from_version}"
            )));
        }

        self.set_version(CURRENT_SCHEMA_VERSION).await
    }

    /// Check that all required relationship types exist in the store
    pub async fn verify_relationship_types(&self) -> Result<Vec<String>> {
        let rows = self
            .connection
            .execute_query(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
                &Params::new(),
                None,
            )
            .await
            .map_err(|e| StoreError::Schema(format!("failed to list relationship types: {e}")))?;

        let existing: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get("relationshipType"))
            .filter_map(serde_json::Value::as_str)
            .map(str::to_string)
            .collect();

        Ok(REQUIRED_RELATIONSHIP_TYPES
            .iter()
            .filter(|t| !existing.iter().any(|e| e == *t))
            .map(|t| t.to_string())
            .collect())
    }

    /// Seed missing relationship types between `_SchemaInit` marker nodes
    async fn seed_relationship_types(&self) -> Result<()> {
        let missing = self.verify_relationship_types().await?;
        if missing.is_empty() {
            return Ok(());
        }

        for rel_type in &missing {
            let query = format!(
                "MERGE (a:_SchemaInit {{role: 'source'}})\n\
                 MERGE (b:_SchemaInit {{role: 'target'}})\n\
                 MERGE (a)-[r:{rel_type} {{schema_init: true}}]->(b)"
            );
            self.connection
                .execute_query(&query, &Params::new(), None)
                .await
                .map_err(|e| StoreError::Schema(format!("failed to seed {rel_type}: {e}")))?;
        }
        info!(count = missing.len(), "seeded relationship types");
        Ok(())
    }
}
