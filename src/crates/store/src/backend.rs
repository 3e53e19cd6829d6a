//! Backend abstraction over the graph driver
//!
//! The rest of the store layer speaks Cypher strings with JSON parameter
//! maps and consumes JSON rows; the backend hides the driver. Queries in
//! this crate project nodes to plain property maps so rows only ever carry
//! primitives, lists, and maps.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row, keyed by the RETURN column names
pub type Row = Map<String, Value>;

/// Query parameters
pub type Params = Map<String, Value>;

/// A live backend transaction
#[async_trait]
pub trait BackendTransaction: Send {
    /// Run a query inside this transaction and collect its rows
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Row>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll the transaction back
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Connection to a property-graph store
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Run a single auto-committed query
    async fn run(&self, query: &str, params: &Params) -> Result<Vec<Row>>;

    /// Begin an explicit transaction
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>>;

    /// Close the connection; called last during shutdown
    async fn close(&self) -> Result<()>;
}
