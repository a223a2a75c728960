//! MongoDB-backed document store
//!
//! Thin translation from `DocumentStore` calls to driver calls on a
//! `Database` handle supplied by the caller. The handle is the session: no
//! global "current database" exists anywhere in the crate.

use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use mongodb::bson::{Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use tracing::{debug, info, warn};

use super::{DocumentStore, DocumentStream, IndexDescriptor, IndexSpec, UpdateOutcome};
use crate::error::{CatalogError, Result, classify, extract_error_info};
use crate::pipeline::Pipeline;
use crate::query::{Filter, Patch};

/// Store over one MongoDB database
#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

/// Classify a driver error, logging its structured details first.
fn store_error(operation: &str, collection: &str, error: mongodb::error::Error) -> CatalogError {
    let info = extract_error_info(&error);
    match info.to_json_compact() {
        Ok(json) => warn!("{} on '{}' failed: {}", operation, collection, json),
        Err(_) => warn!("{} on '{}' failed: {}", operation, collection, error),
    }
    classify(error)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Inserting {} documents into collection '{}'",
            documents.len(),
            collection
        );

        let count = documents.len();
        let result = self
            .collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| store_error("insertMany", collection, e))?;

        // The driver reports ids keyed by input position; return them in order.
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(position, _)| *position);

        info!("Inserted {} documents into '{}'", count, collection);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<DocumentStream> {
        let filter = filter.to_document();
        debug!(
            "Executing find on collection '{}' with filter: {:?}",
            collection, filter
        );

        let cursor = self
            .collection(collection)
            .find(filter)
            .await
            .map_err(|e| store_error("find", collection, e))?;

        Ok(cursor.map_err(CatalogError::from).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateOutcome> {
        let filter = filter.to_document();
        debug!(
            "Executing updateOne on collection '{}' with filter: {:?}",
            collection, filter
        );

        let result = self
            .collection(collection)
            .update_one(filter, patch.to_document())
            .await
            .map_err(|e| store_error("updateOne", collection, e))?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let filter = filter.to_document();
        debug!(
            "Executing deleteMany on collection '{}' with filter: {:?}",
            collection, filter
        );

        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| store_error("deleteMany", collection, e))?;

        info!(
            "Deleted {} documents from '{}'",
            result.deleted_count, collection
        );
        Ok(result.deleted_count)
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String> {
        let keys = spec.key_document();
        debug!(
            "Creating index on collection '{}' with keys: {:?}",
            collection, keys
        );

        let options = IndexOptions::builder()
            .unique(spec.unique.then_some(true))
            .name(spec.name.clone())
            .build();
        let model = IndexModel::builder().keys(keys).options(Some(options)).build();

        let result = self
            .collection(collection)
            .create_index(model)
            .await
            .map_err(|e| store_error("createIndex", collection, e))?;

        debug!("Created index with name: {}", result.index_name);
        Ok(result.index_name)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        debug!("Listing indexes for collection '{}'", collection);

        let models: Vec<IndexModel> = self
            .collection(collection)
            .list_indexes()
            .await
            .map_err(|e| store_error("listIndexes", collection, e))?
            .try_collect::<Vec<IndexModel>>()
            .await
            .map_err(|e| store_error("listIndexes", collection, e))?;

        let indexes = models
            .into_iter()
            .map(|model| {
                let options = model.options.unwrap_or_default();
                IndexDescriptor {
                    name: options.name.unwrap_or_default(),
                    keys: model.keys,
                    unique: options.unique.unwrap_or(false),
                }
            })
            .collect::<Vec<_>>();

        info!("Found {} indexes on '{}'", indexes.len(), collection);
        Ok(indexes)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<DocumentStream> {
        info!(
            "Executing aggregate on collection '{}' with {} pipeline stages",
            collection,
            pipeline.len()
        );

        let cursor = self
            .collection(collection)
            .aggregate(pipeline.to_documents())
            .await
            .map_err(|e| store_error("aggregate", collection, e))?;

        Ok(cursor.map_err(CatalogError::from).boxed())
    }
}
