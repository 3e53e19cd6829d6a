//! The Site aggregate
//!
//! A site is the root of a registrable domain; pages hang off it through
//! `CONTAINS` edges in the store.

use crate::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: Uuid,
    /// Normalized root URL, `scheme://domain`
    pub url: String,
    pub domain: String,

    pub name: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,

    pub discovered_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,

    pub page_count: u64,
    pub active_pages: u64,
    pub total_visits: u64,

    pub metadata: HashMap<String, Value>,
}

impl Site {
    pub fn new(url: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let domain = domain.into();
        if url.is_empty() {
            return Err(DomainError::Validation("url is required".into()));
        }
        if domain.is_empty() {
            return Err(DomainError::Validation("domain is required".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            url,
            domain,
            name: None,
            description: None,
            favicon_url: None,
            discovered_at: Utc::now(),
            last_updated: None,
            page_count: 0,
            active_pages: 0,
            total_visits: 0,
            metadata: HashMap::new(),
        })
    }

    /// Root URL for a page of the given scheme and domain
    pub fn root_url(scheme: &str, domain: &str) -> String {
        format!("{scheme}://{domain}")
    }

    pub fn increment_page_count(&mut self) {
        self.page_count += 1;
        self.last_updated = Some(Utc::now());
    }

    pub fn update_metrics(&mut self, active_pages: u64) {
        self.active_pages = active_pages;
        self.last_updated = Some(Utc::now());
    }

    pub fn record_visit(&mut self) {
        self.total_visits += 1;
        self.last_updated = Some(Utc::now());
    }

    pub fn update_metadata(&mut self, entries: HashMap<String, Value>) {
        self.metadata.extend(entries);
        self.last_updated = Some(Utc::now());
    }

    /// Flat property projection for the graph store
    pub fn to_store_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("id".into(), json!(self.id.to_string()));
        props.insert("url".into(), json!(self.url));
        props.insert("domain".into(), json!(self.domain));
        if let Some(name) = &self.name {
            props.insert("name".into(), json!(name));
        }
        if let Some(description) = &self.description {
            props.insert("description".into(), json!(description));
        }
        if let Some(favicon) = &self.favicon_url {
            props.insert("favicon_url".into(), json!(favicon));
        }
        props.insert("discovered_at".into(), json!(self.discovered_at.to_rfc3339()));
        if let Some(at) = self.last_updated {
            props.insert("last_updated".into(), json!(at.to_rfc3339()));
        }
        props.insert("page_count".into(), json!(self.page_count));
        props.insert("active_pages".into(), json!(self.active_pages));
        props.insert("total_visits".into(), json!(self.total_visits));
        props
    }
}
