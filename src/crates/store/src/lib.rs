//! Property-graph store access for weaver
//!
//! Layered from the bottom up: a backend abstraction over the Bolt driver,
//! a transaction wrapper with rollback handlers and retry classification,
//! a connection facade with per-query timeouts and pool observability,
//! typed node/edge operations, and schema management.

pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod graph_ops;
pub mod neo4j;
pub mod schema;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{BackendTransaction, GraphBackend, Row};
pub use config::{ConnectionConfig, TransactionConfig};
pub use connection::{GraphConnection, PoolStatus};
pub use error::{Result, StoreError};
pub use graph_ops::{GraphOperations, Node, RelationshipSpec};
pub use neo4j::Neo4jBackend;
pub use schema::{SchemaManager, CURRENT_SCHEMA_VERSION};
pub use transaction::{Transaction, TransactionManager};
