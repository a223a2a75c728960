//! Catalog service
//!
//! The application-level operations over the `usuarios` and `contenidos`
//! collections. `CatalogService` holds only a store handle and the collection
//! names; it keeps no mutable state, and each call issues one store round
//! trip (seeding issues one per collection).
//!
//! Read operations return a [`ContentQuery`]: nothing is sent until it is
//! consumed, and every consumption queries the store again.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use mongodb::bson::{Bson, Document};
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::model::{Content, ContentType, GenreCount, TypeRating, User, fields, validate_rating};
use crate::pipeline::{self, Pipeline};
use crate::query::{self, Filter, Patch};
use crate::store::{DocumentStore, IndexDescriptor, IndexSpec, UpdateOutcome};

#[cfg(test)]
mod tests;

pub const DEFAULT_USERS_COLLECTION: &str = "usuarios";
pub const DEFAULT_CONTENTS_COLLECTION: &str = "contenidos";

/// Collection names the service works against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub users: String,
    pub contents: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS_COLLECTION.to_string(),
            contents: DEFAULT_CONTENTS_COLLECTION.to_string(),
        }
    }
}

impl From<&CatalogConfig> for Collections {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            users: config.users_collection.clone(),
            contents: config.contents_collection.clone(),
        }
    }
}

/// Ids assigned by `seed_catalog`, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub user_ids: Vec<Bson>,
    pub content_ids: Vec<Bson>,
}

/// Catalog operations over any `DocumentStore`
pub struct CatalogService<S: ?Sized> {
    store: Arc<S>,
    collections: Collections,
}

impl<S: ?Sized> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collections: self.collections.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized + 'static> CatalogService<S> {
    /// Service over the default `usuarios`/`contenidos` collections.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_collections(store, Collections::default())
    }

    pub fn with_collections(store: Arc<S>, collections: Collections) -> Self {
        Self { store, collections }
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Bulk-insert users, then contents.
    ///
    /// An empty slice skips its insert. A failure on the users insert means
    /// the contents insert is never attempted.
    pub async fn seed_catalog(&self, users: &[User], contents: &[Content]) -> Result<SeedReport> {
        let user_docs = users
            .iter()
            .map(|user| {
                user.validate()?;
                user.to_document()
            })
            .collect::<Result<Vec<Document>>>()?;
        let content_docs = contents
            .iter()
            .map(|content| {
                content.validate()?;
                content.to_document()
            })
            .collect::<Result<Vec<Document>>>()?;

        let mut report = SeedReport::default();
        if !user_docs.is_empty() {
            report.user_ids = self
                .store
                .insert_many(&self.collections.users, user_docs)
                .await?;
        }
        if !content_docs.is_empty() {
            report.content_ids = self
                .store
                .insert_many(&self.collections.contents, content_docs)
                .await?;
        }

        info!(
            "Seeded {} users and {} contents",
            report.user_ids.len(),
            report.content_ids.len()
        );
        Ok(report)
    }

    /// Titles with `duracion` strictly greater than `min_duration`.
    ///
    /// Series store per-episode runtime, so a long series episode counts too.
    pub fn find_long_content(&self, min_duration: u32) -> ContentQuery<S> {
        self.content_query(query::gt(fields::DURATION, i64::from(min_duration)))
    }

    /// Series released strictly after `after_year`.
    pub fn find_recent_series(&self, after_year: i32) -> ContentQuery<S> {
        self.content_query(query::and([
            query::eq(fields::TYPE, ContentType::Series.as_str()),
            query::gt(fields::RELEASE_YEAR, after_year),
        ]))
    }

    /// Case-insensitive substring match on the title; `text` is taken literally.
    pub fn search_title_substring(&self, text: &str) -> ContentQuery<S> {
        self.content_query(query::regex(fields::TITLE, regex::escape(text), true))
    }

    /// Titles whose type is any of `types`; an empty set matches nothing.
    pub fn find_by_types(&self, types: &[ContentType]) -> ContentQuery<S> {
        self.content_query(query::one_of(
            fields::TYPE,
            types.iter().map(|t| t.as_str()),
        ))
    }

    /// Set the average rating of the first title named exactly `title`.
    pub async fn rate_content(&self, title: &str, rating: f64) -> Result<UpdateOutcome> {
        validate_rating(rating)?;

        let outcome = self
            .store
            .update_one(
                &self.collections.contents,
                &query::eq(fields::TITLE, title),
                &Patch::set(fields::AVERAGE_RATING, rating),
            )
            .await?;

        if outcome.matched == 0 {
            return Err(CatalogError::NotFound(format!(
                "no content titled '{title}'"
            )));
        }

        debug!(
            "Rated '{}' {} (modified: {})",
            title, rating, outcome.modified
        );
        Ok(outcome)
    }

    /// Delete every title released before `before_year`; returns the count.
    pub async fn prune_old_content(&self, before_year: i32) -> Result<u64> {
        let deleted = self
            .store
            .delete_many(
                &self.collections.contents,
                &query::lt(fields::RELEASE_YEAR, before_year),
            )
            .await?;

        info!("Pruned {} titles released before {}", deleted, before_year);
        Ok(deleted)
    }

    /// Create the catalog's indexes; safe to call repeatedly.
    pub async fn ensure_indexes(&self) -> Result<Vec<String>> {
        let plan = [
            (&self.collections.contents, IndexSpec::ascending(fields::TITLE)),
            (&self.collections.contents, IndexSpec::ascending(fields::GENRES)),
            (
                &self.collections.users,
                IndexSpec::ascending(fields::USER_EMAIL).unique(),
            ),
        ];

        let mut names = Vec::with_capacity(plan.len());
        for (collection, spec) in &plan {
            let name = self.store.create_index(collection, spec).await?;
            names.push(name);
        }

        info!("Ensured indexes: {}", names.join(", "));
        Ok(names)
    }

    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDescriptor>> {
        self.store.list_indexes(collection).await
    }

    /// Average rating per content type, highest first.
    pub async fn rating_by_type(&self) -> Result<Vec<TypeRating>> {
        self.aggregate_rows(&pipeline::rating_by_type()?).await
    }

    /// Titles per genre, most common first.
    pub async fn count_by_genre(&self) -> Result<Vec<GenreCount>> {
        self.aggregate_rows(&pipeline::count_by_genre()?).await
    }

    async fn aggregate_rows<T>(&self, pipeline: &Pipeline) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.store
            .aggregate(&self.collections.contents, pipeline)
            .await?
            .and_then(|document| async move {
                mongodb::bson::from_document::<T>(document).map_err(CatalogError::from)
            })
            .try_collect()
            .await
    }

    fn content_query(&self, filter: Filter) -> ContentQuery<S> {
        ContentQuery {
            store: Arc::clone(&self.store),
            collection: self.collections.contents.clone(),
            filter,
        }
    }
}

/// Lazy, restartable read over the contents collection
pub struct ContentQuery<S: ?Sized> {
    store: Arc<S>,
    collection: String,
    filter: Filter,
}

impl<S: ?Sized> Clone for ContentQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<S: DocumentStore + ?Sized + 'static> ContentQuery<S> {
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run the query; documents are decoded as they arrive.
    pub async fn stream(&self) -> Result<BoxStream<'static, Result<Content>>> {
        let documents = self.store.find(&self.collection, &self.filter).await?;
        Ok(documents
            .and_then(|document| async move { Content::from_document(document) })
            .boxed())
    }

    /// Run the query and gather every result.
    pub async fn collect(&self) -> Result<Vec<Content>> {
        self.stream().await?.try_collect().await
    }
}
