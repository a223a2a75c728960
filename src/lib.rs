//! StreamHub catalog library
//!
//! Typed query and aggregation engine for a movie/series catalog stored in
//! MongoDB. Queries and pipelines are built as plain data, then executed by a
//! `DocumentStore`: the MongoDB driver in production, or an in-memory store
//! that evaluates the same filters and pipelines.
//!
//! # Modules
//!
//! - `catalog`: catalog operations (seed, search, rate, prune, indexes, aggregates)
//! - `cli`: command-line interface and argument parsing
//! - `config`: configuration management
//! - `connection`: MongoDB connection management
//! - `error`: error types and driver error classification
//! - `formatter`: JSON and table output
//! - `model`: users, contents and aggregate rows
//! - `pipeline`: aggregation pipeline builder
//! - `query`: filter and update builders
//! - `store`: document store adapter (MongoDB and in-memory)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamhub::{CatalogService, MemoryStore};
//! use streamhub::model::seed::{sample_contents, sample_users};
//!
//! #[tokio::main]
//! async fn main() -> streamhub::Result<()> {
//!     let catalog = CatalogService::new(Arc::new(MemoryStore::new()));
//!     catalog.seed_catalog(&sample_users()?, &sample_contents()?).await?;
//!
//!     for title in catalog.find_long_content(120).collect().await? {
//!         println!("{} ({} min)", title.title, title.duration_minutes);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod formatter;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use catalog::{CatalogService, Collections, ContentQuery, SeedReport};
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{CatalogError, Result};
pub use formatter::Formatter;
pub use model::{Content, ContentType, GenreCount, TypeRating, User};
pub use pipeline::Pipeline;
pub use query::{Filter, Patch};
pub use store::{DocumentStore, MemoryStore, MongoStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
