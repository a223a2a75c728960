//! In-memory document store
//!
//! Keeps each collection as an ordered `Vec<Document>` behind a
//! `tokio::sync::RwLock`; every write runs under the write lock, so it is
//! atomic with respect to other callers. Mirrors the MongoDB behaviour the
//! catalog depends on:
//! - implicit unique `_id_` index and generated `ObjectId`s
//! - unique secondary indexes checked on insert, update and index creation
//! - ordered `insert_many`: documents before the first violation stay inserted
//! - identical `create_index` calls are no-ops
//!
//! `set_available(false)` makes every call fail with `StoreUnavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DocumentStore, DocumentStream, IndexDescriptor, IndexSpec, UpdateOutcome};
use crate::error::{CatalogError, Result};
use crate::pipeline::Pipeline;
use crate::query::{Filter, Patch};

mod eval;

use eval::{apply_set, compile, lookup, run_pipeline, values_equal};

const ID_INDEX_NAME: &str = "_id_";

#[derive(Debug, Clone)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<IndexDescriptor>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexDescriptor {
                name: ID_INDEX_NAME.to_string(),
                keys: doc! { "_id": 1 },
                unique: false,
            }],
        }
    }

    /// Fields that must be unique across the collection, per index.
    fn unique_key_sets(&self) -> Vec<(String, Vec<String>)> {
        self.indexes
            .iter()
            .filter(|index| index.unique || index.name == ID_INDEX_NAME)
            .map(|index| {
                let fields = index.keys.keys().cloned().collect();
                (index.name.clone(), fields)
            })
            .collect()
    }

    /// Check `candidate` against every other document (skipping `skip`).
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> Result<()> {
        for (index_name, fields) in self.unique_key_sets() {
            let candidate_key = key_values(candidate, &fields);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, existing)| keys_equal(&key_values(existing, &fields), &candidate_key));
            if clash {
                return Err(duplicate_key(&index_name, &fields, &candidate_key));
            }
        }
        Ok(())
    }
}

fn key_values(document: &Document, fields: &[String]) -> Vec<Bson> {
    fields
        .iter()
        .map(|field| lookup(document, field).cloned().unwrap_or(Bson::Null))
        .collect()
}

fn keys_equal(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

fn duplicate_key(index_name: &str, fields: &[String], values: &[Bson]) -> CatalogError {
    let mut key = Document::new();
    for (field, value) in fields.iter().zip(values) {
        key.insert(field.clone(), value.clone());
    }
    CatalogError::Validation(format!(
        "Duplicate key error on index '{index_name}': {key}"
    ))
}

/// In-process `DocumentStore`
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CatalogError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    /// Documents of `collection` matching `filter`, in insertion order.
    async fn snapshot(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let matcher = compile(filter)?;
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(coll
            .documents
            .iter()
            .filter(|document| matcher.matches(document))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<Bson>> {
        self.ensure_available()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut collections = self.collections.write().await;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            if !document.contains_key("_id") {
                // `_id` goes first, as the server does it.
                let mut with_id = doc! { "_id": ObjectId::new() };
                with_id.extend(document);
                document = with_id;
            }
            coll.check_unique(&document, None)?;

            let id = document.get("_id").cloned().unwrap_or(Bson::Null);
            coll.documents.push(document);
            ids.push(id);
        }

        info!("Inserted {} documents into '{}'", ids.len(), collection);
        Ok(ids)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<DocumentStream> {
        self.ensure_available()?;
        debug!(
            "Executing find on collection '{}' with filter: {:?}",
            collection,
            filter.to_document()
        );

        let documents = self.snapshot(collection, filter).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateOutcome> {
        self.ensure_available()?;
        let matcher = compile(filter)?;

        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let target = coll
            .documents
            .iter()
            .position(|document| matcher.matches(document));
        let Some(position) = target else {
            return Ok(UpdateOutcome::default());
        };

        let mut updated = coll.documents[position].clone();
        if !apply_set(&mut updated, patch.fields()) {
            return Ok(UpdateOutcome {
                matched: 1,
                modified: 0,
            });
        }
        coll.check_unique(&updated, Some(position))?;
        coll.documents[position] = updated;

        debug!("Updated one document in '{}'", collection);
        Ok(UpdateOutcome {
            matched: 1,
            modified: 1,
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.ensure_available()?;
        // A bad filter fails here, before anything is deleted.
        let matcher = compile(filter)?;

        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = coll.documents.len();
        coll.documents.retain(|document| !matcher.matches(document));
        let deleted = (before - coll.documents.len()) as u64;

        info!("Deleted {} documents from '{}'", deleted, collection);
        Ok(deleted)
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<String> {
        self.ensure_available()?;

        let name = spec.index_name();
        let keys = spec.key_document();

        let mut collections = self.collections.write().await;
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        if let Some(existing) = coll.indexes.iter().find(|index| index.name == name) {
            if existing.keys == keys && existing.unique == spec.unique {
                debug!("Index '{}' already exists on '{}'", name, collection);
                return Ok(name);
            }
            return Err(CatalogError::Validation(format!(
                "index '{name}' already exists on '{collection}' with different options"
            )));
        }
        if let Some(existing) = coll.indexes.iter().find(|index| index.keys == keys) {
            return Err(CatalogError::Validation(format!(
                "index with keys {keys} already exists on '{collection}' as '{}'",
                existing.name
            )));
        }

        let descriptor = IndexDescriptor {
            name: name.clone(),
            keys,
            unique: spec.unique,
        };

        if descriptor.unique {
            let fields: Vec<String> = descriptor.keys.keys().cloned().collect();
            let mut seen: Vec<Vec<Bson>> = Vec::with_capacity(coll.documents.len());
            for document in &coll.documents {
                let key = key_values(document, &fields);
                if seen.iter().any(|other| keys_equal(other, &key)) {
                    return Err(duplicate_key(&name, &fields, &key));
                }
                seen.push(key);
            }
        }

        coll.indexes.push(descriptor);
        debug!("Created index with name: {}", name);
        Ok(name)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        self.ensure_available()?;

        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|coll| coll.indexes.clone())
            .unwrap_or_default())
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<DocumentStream> {
        self.ensure_available()?;
        info!(
            "Executing aggregate on collection '{}' with {} pipeline stages",
            collection,
            pipeline.len()
        );

        let documents = self.snapshot(collection, &Filter::all()).await?;
        let output = run_pipeline(pipeline, documents);
        Ok(stream::iter(output.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{eq, gt, lt, regex};
    use futures::TryStreamExt;
    use tokio_test::{assert_err, assert_ok};

    async fn collect(stream: DocumentStream) -> Vec<Document> {
        stream.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_in_order() {
        let store = MemoryStore::new();
        let ids = store
            .insert_many("c", vec![doc! { "n": 1 }, doc! { "_id": 7, "n": 2 }])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(ids[1], Bson::Int32(7));

        let docs = collect(store.find("c", &Filter::all()).await.unwrap()).await;
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(docs[1].get_i32("n").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_insert_is_noop() {
        let store = MemoryStore::new();
        let ids = assert_ok!(store.insert_many("c", Vec::new()).await);
        assert!(ids.is_empty());
        assert!(assert_ok!(store.list_indexes("c").await).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        store.insert_many("c", vec![doc! { "_id": 1 }]).await.unwrap();
        let err = store
            .insert_many("c", vec![doc! { "_id": 1 }])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ordered_insert_keeps_prefix() {
        let store = MemoryStore::new();
        store
            .create_index("u", &IndexSpec::ascending("email").unique())
            .await
            .unwrap();

        let result = store
            .insert_many(
                "u",
                vec![
                    doc! { "email": "a@x" },
                    doc! { "email": "b@x" },
                    doc! { "email": "a@x" },
                    doc! { "email": "c@x" },
                ],
            )
            .await;

        assert_err!(result);
        assert_eq!(store.count("u").await, 2);
    }

    #[tokio::test]
    async fn test_update_one_touches_first_match_only() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![doc! { "k": 1, "v": 0 }, doc! { "k": 1, "v": 0 }])
            .await
            .unwrap();

        let outcome = store
            .update_one("c", &eq("k", 1), &Patch::set("v", 9))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        let updated = collect(store.find("c", &eq("v", 9)).await.unwrap()).await;
        assert_eq!(updated.len(), 1);
    }

    #[tokio::test]
    async fn test_update_same_value_is_not_modified() {
        let store = MemoryStore::new();
        store.insert_many("c", vec![doc! { "v": 1 }]).await.unwrap();

        let outcome = store
            .update_one("c", &Filter::all(), &Patch::set("v", 1))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 0 });

        let outcome = store
            .update_one("c", &eq("v", 2), &Patch::set("v", 3))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn test_update_respects_unique_index() {
        let store = MemoryStore::new();
        store
            .create_index("u", &IndexSpec::ascending("email").unique())
            .await
            .unwrap();
        store
            .insert_many("u", vec![doc! { "email": "a@x" }, doc! { "email": "b@x" }])
            .await
            .unwrap();

        let result = store
            .update_one("u", &eq("email", "b@x"), &Patch::set("email", "a@x"))
            .await;
        assert_err!(result);
        assert_eq!(
            collect(store.find("u", &eq("email", "b@x")).await.unwrap())
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "c",
                vec![doc! { "y": 2000 }, doc! { "y": 2004 }, doc! { "y": 2010 }],
            )
            .await
            .unwrap();

        assert_eq!(store.delete_many("c", &lt("y", 2005)).await.unwrap(), 2);
        assert_eq!(store.delete_many("c", &lt("y", 2005)).await.unwrap(), 0);
        assert_eq!(store.count("c").await, 1);
        assert_eq!(store.delete_many("missing", &gt("y", 0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_regex_filters_across_operations() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "c",
                vec![
                    doc! { "t": "Inception", "r": 4.8 },
                    doc! { "t": "Interstellar", "r": 4.7 },
                    doc! { "t": "Dark", "r": 4.9 },
                ],
            )
            .await
            .unwrap();

        let found = collect(store.find("c", &regex("t", "^in", true)).await.unwrap()).await;
        assert_eq!(found.len(), 2);

        let patch = Patch::set("r", 5.0);
        let outcome = store
            .update_one("c", &regex("t", "stellar", false), &patch)
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);

        assert_err!(store.delete_many("c", &regex("t", "(", false)).await);
        assert_err!(store.update_one("c", &regex("t", "[", false), &patch).await);
        assert_eq!(store.count("c").await, 3);

        assert_eq!(store.delete_many("c", &regex("t", "K$", true)).await.unwrap(), 1);
        assert_eq!(store.count("c").await, 2);
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let store = MemoryStore::new();
        let spec = IndexSpec::ascending("titulo");

        assert_eq!(store.create_index("c", &spec).await.unwrap(), "titulo_1");
        assert_eq!(store.create_index("c", &spec).await.unwrap(), "titulo_1");

        let names: Vec<String> = store
            .list_indexes("c")
            .await
            .unwrap()
            .into_iter()
            .map(|index| index.name)
            .collect();
        assert_eq!(names, ["_id_", "titulo_1"]);
    }

    #[tokio::test]
    async fn test_conflicting_index_options_rejected() {
        let store = MemoryStore::new();
        store
            .create_index("c", &IndexSpec::ascending("email"))
            .await
            .unwrap();

        let err = store
            .create_index("c", &IndexSpec::ascending("email").unique())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unique_index_over_duplicates_rejected() {
        let store = MemoryStore::new();
        store
            .insert_many("u", vec![doc! { "email": "a@x" }, doc! { "email": "a@x" }])
            .await
            .unwrap();

        assert_err!(
            store
                .create_index("u", &IndexSpec::ascending("email").unique())
                .await
        );
        assert_eq!(store.list_indexes("u").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_store() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = store.find("c", &Filter::all()).await.err().unwrap();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        assert!(matches!(
            store.insert_many("c", vec![doc! {}]).await,
            Err(CatalogError::StoreUnavailable(_))
        ));

        store.set_available(true);
        assert_ok!(store.find("c", &Filter::all()).await);
    }
}
