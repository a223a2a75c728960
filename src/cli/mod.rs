//! Command-line interface for streamhub
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Opening the catalog against MongoDB or the in-memory store
//! - Dispatching subcommands and printing their output

use clap::{Parser, Subcommand};
use mongodb::bson::{Bson, doc};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{CatalogService, Collections};
use crate::config::{Config, LogLevel, OutputFormat};
use crate::connection::ConnectionManager;
use crate::error::{CatalogError, Result};
use crate::formatter::{Formatter, Output};
use crate::model::ContentType;
use crate::model::seed::{sample_contents, sample_users};
use crate::store::{DocumentStore, MemoryStore, MongoStore};

pub mod completion;

/// Catalog service over whichever store the CLI opened
pub type Catalog = CatalogService<dyn DocumentStore>;

/// Extract database name from MongoDB connection URI
///
/// Format: mongodb://[username:password@]host[:port][/database][?options]
fn extract_database_from_uri(uri: &str) -> Option<String> {
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split('/').nth(1)?;
    let db_name = path_part.split('?').next().unwrap_or("");
    if db_name.is_empty() {
        None
    } else {
        Some(db_name.to_string())
    }
}

fn parse_content_type(value: &str) -> std::result::Result<ContentType, String> {
    value.parse().map_err(|e: CatalogError| e.to_string())
}

/// StreamHub catalog queries and aggregations
#[derive(Parser, Debug)]
#[command(
    name = "streamhub",
    version,
    about = "Query and aggregate the StreamHub movie/series catalog",
    long_about = "Seed, query, rate, prune and aggregate the StreamHub catalog stored in
MongoDB (collections 'usuarios' and 'contenidos'), or in an in-memory store for demos."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(long, value_name = "URI", global = true)]
    pub uri: Option<String>,

    /// Database name to use
    #[arg(long, value_name = "NAME", global = true)]
    pub database: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Output format (json, json-pretty, table)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Run against an in-memory store pre-loaded with the sample catalog
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for streamhub
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Insert the sample users and titles
    Seed,

    /// Titles longer than MIN minutes (per-episode runtime for series)
    Long {
        #[arg(value_name = "MIN")]
        min: u32,
    },

    /// Series released after YEAR
    RecentSeries {
        #[arg(value_name = "YEAR")]
        year: i32,
    },

    /// Titles containing TEXT, ignoring case
    Search {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Titles of the given types (movie, series)
    ByType {
        #[arg(value_name = "TYPE", required = true, value_parser = parse_content_type)]
        types: Vec<ContentType>,
    },

    /// Set the average rating of the title named exactly TITLE
    Rate {
        #[arg(value_name = "TITLE")]
        title: String,

        #[arg(value_name = "RATING")]
        rating: f64,
    },

    /// Delete titles released before YEAR
    Prune {
        #[arg(value_name = "YEAR")]
        year: i32,
    },

    /// Create the catalog indexes (idempotent)
    EnsureIndexes,

    /// List the indexes of a collection
    Indexes {
        #[arg(value_name = "COLLECTION")]
        collection: String,
    },

    /// Average rating per content type
    RatingByType,

    /// Number of titles per genre
    CountByGenre,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// An opened catalog plus the connection backing it, if any
pub struct Session {
    pub catalog: Catalog,
    connection: Option<ConnectionManager>,
}

impl Session {
    /// In-memory catalog holding the sample data
    pub async fn in_memory(collections: Collections) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let catalog = CatalogService::with_collections(store, collections);
        catalog
            .seed_catalog(&sample_users()?, &sample_contents()?)
            .await?;

        Ok(Self {
            catalog,
            connection: None,
        })
    }

    /// Catalog over a live MongoDB deployment
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut manager = ConnectionManager::from_config(config.connection.clone());
        manager.connect().await?;

        let database = manager.get_database(&config.connection.database)?;
        let store: Arc<dyn DocumentStore> = Arc::new(MongoStore::new(database));

        Ok(Self {
            catalog: CatalogService::with_collections(store, Collections::from(&config.catalog)),
            connection: Some(manager),
        })
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(manager) = self.connection.as_mut() {
            manager.disconnect().await?;
        }
        Ok(())
    }
}

/// CLI interface handler
pub struct CliInterface {
    args: CliArgs,
    config: Config,
}

impl CliInterface {
    /// Parse process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// File and environment layers, then CLI overrides
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_display_args(config, args);
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
    }

    fn apply_display_args(config: &mut Config, args: &CliArgs) {
        if let Some(format) = args.format {
            config.display.format = format;
        }
        if args.no_color {
            config.display.color_output = false;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        if args.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if args.verbose {
            config.logging.level = LogLevel::Debug;
        }
    }

    /// `--database` wins over a database named in `--uri`
    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.connection.uri = uri.clone();
            if let Some(db) = extract_database_from_uri(uri) {
                config.connection.database = db;
            }
        }
        if let Some(db) = &args.database {
            config.connection.database = db.clone();
        }
    }

    /// Sanitize URI by hiding credentials
    fn sanitize_uri(uri: &str) -> String {
        if let (Some(proto_end), Some(host_start)) = (uri.find("://"), uri.rfind('@')) {
            if host_start > proto_end {
                let proto = &uri[..proto_end + 3];
                let host = &uri[host_start..];
                return format!("{proto}***{host}");
            }
        }
        uri.to_string()
    }

    /// Run the parsed command and print its output
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(())
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell, &mut io::stdout())
            }
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate),
            command => {
                let session = self.open_session().await?;
                let result = execute(&session.catalog, command).await;
                session.close().await?;

                let formatter = Formatter::from_config(&self.config.display);
                println!("{}", formatter.format(&result?)?);
                Ok(())
            }
        }
    }

    async fn open_session(&self) -> Result<Session> {
        let collections = Collections::from(&self.config.catalog);
        if self.args.in_memory {
            info!("Using in-memory catalog");
            return Session::in_memory(collections).await;
        }

        self.config.validate()?;
        info!(
            "Connecting to: {}",
            Self::sanitize_uri(&self.config.connection.uri)
        );
        Session::connect(&self.config).await
    }

    fn show_version(&self) {
        println!("streamhub version {}", crate::VERSION);
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config();
        }
        if show || !validate {
            self.show_config()?;
        }
        Ok(())
    }

    fn validate_config(&self) {
        println!("Validating configuration file: {}", self.config_path().display());
        match self.config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => println!("❌ Configuration validation failed: {e}"),
        }
    }

    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

fn count(n: usize) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

fn count_u64(n: u64) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Execute a store-backed command against `catalog`
pub async fn execute(catalog: &Catalog, command: &Commands) -> Result<Output> {
    match command {
        Commands::Seed => {
            let report = catalog
                .seed_catalog(&sample_users()?, &sample_contents()?)
                .await?;
            Ok(Output::Document(doc! {
                "insertedUsers": count(report.user_ids.len()),
                "insertedContents": count(report.content_ids.len()),
            }))
        }
        Commands::Long { min } => Output::rows(&catalog.find_long_content(*min).collect().await?),
        Commands::RecentSeries { year } => {
            Output::rows(&catalog.find_recent_series(*year).collect().await?)
        }
        Commands::Search { text } => {
            Output::rows(&catalog.search_title_substring(text).collect().await?)
        }
        Commands::ByType { types } => Output::rows(&catalog.find_by_types(types).collect().await?),
        Commands::Rate { title, rating } => {
            let outcome = catalog.rate_content(title, *rating).await?;
            Ok(Output::Document(doc! {
                "titulo": title.as_str(),
                "calificacionPromedio": *rating,
                "matched": count_u64(outcome.matched),
                "modified": count_u64(outcome.modified),
            }))
        }
        Commands::Prune { year } => {
            let deleted = catalog.prune_old_content(*year).await?;
            Ok(Output::Document(doc! { "deleted": count_u64(deleted) }))
        }
        Commands::EnsureIndexes => {
            let names = catalog.ensure_indexes().await?;
            Ok(Output::Documents(
                names.into_iter().map(|name| doc! { "index": name }).collect(),
            ))
        }
        Commands::Indexes { collection } => Output::rows(&catalog.list_indexes(collection).await?),
        Commands::RatingByType => Output::rows(&catalog.rating_by_type().await?),
        Commands::CountByGenre => Output::rows(&catalog.count_by_genre().await?),
        Commands::Config { .. } | Commands::Completion { .. } | Commands::Version => {
            Err(CatalogError::Validation(format!(
                "{command:?} does not query the catalog"
            )))
        }
    }
}
