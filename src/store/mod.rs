//! Document store adapter
//!
//! `DocumentStore` is the only boundary between the catalog and the backend.
//! It speaks in BSON documents, filter trees and pipelines; typed decoding
//! happens one level up, in the catalog service.
//!
//! Implementations:
//! - `MongoStore`: the official MongoDB driver
//! - `MemoryStore`: in-process evaluation, used by tests and `--in-memory`
//!
//! No implementation retries. Transport failures surface as
//! `StoreUnavailable`, unique-index violations as `Validation`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::{Pipeline, SortDirection};
use crate::query::{Filter, Patch};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Lazy sequence of documents; nothing is buffered beyond the backend's batch.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Outcome of a single-document update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents the filter selected (0 or 1).
    pub matched: u64,

    /// Documents actually changed (0 when the new values equal the old ones).
    pub modified: u64,
}

/// Index to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<(String, SortDirection)>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexSpec {
    /// Single-field ascending index.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), SortDirection::Ascending)],
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Key specification document, e.g. `{ titulo: 1 }`.
    pub fn key_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, direction) in &self.keys {
            keys.insert(field.clone(), direction.as_i32());
        }
        keys
    }

    /// Explicit name, or the store's default `<field>_<dir>[_...]` name.
    pub fn index_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.keys
                .iter()
                .map(|(field, direction)| format!("{field}_{}", direction.as_i32()))
                .collect::<Vec<_>>()
                .join("_")
        })
    }
}

/// Index as reported by `list_indexes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn key_fields(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }
}

/// Generic document-store operations the catalog needs
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert documents in order; returns the `_id` of each.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>>;

    async fn find(&self, collection: &str, filter: &Filter) -> Result<DocumentStream>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateOutcome>;

    /// Returns the number of documents removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Returns the index name. Re-creating an identical index is a no-op.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>>;

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<DocumentStream>;
}
