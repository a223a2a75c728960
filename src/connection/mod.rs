//! Connection management for MongoDB
//!
//! `ConnectionManager` owns the driver `Client`: it parses the URI, applies
//! pool and timeout settings from the configuration, and verifies the
//! deployment with a `ping`. The initial connection is the only place that
//! retries; store operations issued through the resulting `Database` handle
//! never do.

use mongodb::bson::doc;
use mongodb::{Client, Database, options::ClientOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{CatalogError, ConfigError, Result, classify};

/// Delay before the second connection attempt; doubles on each further one.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// MongoDB connection manager
pub struct ConnectionManager {
    /// Driver client, present once connected
    client: Option<Client>,

    config: ConnectionConfig,

    state: Arc<RwLock<ConnectionState>>,

    uri: String,
}

/// Connection state information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,

    /// Last connection attempt failed
    Failed(String),
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,

    /// Minimum number of connections kept open
    pub min_idle: u32,

    pub connection_timeout: Duration,

    pub server_selection_timeout: Duration,

    pub idle_timeout: Duration,
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub is_healthy: bool,

    /// Round trip of the `ping` command in milliseconds
    pub response_time_ms: u64,

    pub server_version: Option<String>,
}

impl ConnectionManager {
    pub fn new(uri: String, config: ConnectionConfig) -> Self {
        Self {
            client: None,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            uri,
        }
    }

    /// Manager for the URI held in `config`
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self::new(config.uri.clone(), config)
    }

    /// Establish connection to MongoDB
    ///
    /// Tries up to `retry_attempts` times (at least once) and only succeeds
    /// after the server answered a `ping`.
    pub async fn connect(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting).await;

        let options = match Self::parse_uri(&self.uri).await {
            Ok(options) => self.configure_pool(options),
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string())).await;
                return Err(e);
            }
        };

        match self.connect_with_retry(options).await {
            Ok(client) => {
                self.client = Some(client);
                self.set_state(ConnectionState::Connected).await;
                info!("Connected to MongoDB");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Close all pooled connections
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            info!("Disconnected from MongoDB");
        }
        self.set_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect().await?;
        self.connect().await
    }

    /// Ping the server and report its version
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let client = self.get_client()?;
        let admin = client.database("admin");

        let started = Instant::now();
        let ping = admin.run_command(doc! { "ping": 1 }).await;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Err(e) = ping {
            warn!("Health check failed: {}", e);
            return Ok(HealthStatus {
                is_healthy: false,
                response_time_ms,
                server_version: None,
            });
        }

        let server_version = admin
            .run_command(doc! { "buildInfo": 1 })
            .await
            .ok()
            .and_then(|info| info.get_str("version").ok().map(str::to_string));

        Ok(HealthStatus {
            is_healthy: true,
            response_time_ms,
            server_version,
        })
    }

    /// Database handle; fails until `connect` has succeeded
    pub fn get_database(&self, name: &str) -> Result<Database> {
        Ok(self.get_client()?.database(name))
    }

    pub fn get_client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| CatalogError::StoreUnavailable("not connected to MongoDB".to_string()))
    }

    pub async fn get_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    /// Parse connection URI into client options
    async fn parse_uri(uri: &str) -> Result<ClientOptions> {
        ClientOptions::parse(uri).await.map_err(|e| {
            debug!("Rejected connection URI: {}", e);
            ConfigError::InvalidValue {
                field: "connection.uri".to_string(),
                value: uri.to_string(),
            }
            .into()
        })
    }

    /// Apply pool and timeout settings; options given in the URI win for the app name
    fn configure_pool(&self, mut options: ClientOptions) -> ClientOptions {
        let pool = PoolConfig::from(&self.config);

        options.max_pool_size = Some(pool.max_size);
        options.min_pool_size = Some(pool.min_idle);
        options.connect_timeout = Some(pool.connection_timeout);
        options.server_selection_timeout = Some(pool.server_selection_timeout);
        options.max_idle_time = Some(pool.idle_timeout);
        if options.app_name.is_none() {
            options.app_name = Some(self.config.app_name.clone());
        }
        options
    }

    async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    /// Build a client and ping it, retrying with exponential backoff
    async fn connect_with_retry(&self, options: ClientOptions) -> Result<Client> {
        let attempts = self.config.retry_attempts.max(1);
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;

        loop {
            let result = match Client::with_options(options.clone()) {
                Ok(client) => Self::ping(&client).await.map(|_| client),
                Err(e) => Err(classify(e)),
            };

            match result {
                Ok(client) => return Ok(client),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Connection attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn ping(client: &Client) -> Result<()> {
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(classify)?;
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for PoolConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_size: config.max_pool_size,
            min_idle: config.min_pool_size,
            connection_timeout: Duration::from_secs(config.timeout),
            server_selection_timeout: Duration::from_secs(config.server_selection_timeout),
            idle_timeout: Duration::from_secs(config.idle_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.min_idle, 0);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_pool_config_from_connection_config() {
        let conn_config = ConnectionConfig {
            max_pool_size: 25,
            idle_timeout: 60,
            ..ConnectionConfig::default()
        };
        let pool_config = PoolConfig::from(&conn_config);
        assert_eq!(pool_config.max_size, 25);
        assert_eq!(pool_config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_configure_pool() {
        let manager = ConnectionManager::from_config(ConnectionConfig::default());
        let options = manager.configure_pool(ClientOptions::default());

        assert_eq!(options.max_pool_size, Some(10));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.app_name.as_deref(), Some("streamhub"));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let manager = ConnectionManager::from_config(ConnectionConfig::default());
        assert_eq!(manager.get_state().await, ConnectionState::Disconnected);
        assert!(!manager.is_connected().await);

        let err = manager.get_database("streamhub").unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_uri_fails_without_retry() {
        let mut manager =
            ConnectionManager::new("http://nowhere".to_string(), ConnectionConfig::default());

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
        assert!(matches!(
            manager.get_state().await,
            ConnectionState::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle() {
        let mut manager = ConnectionManager::from_config(ConnectionConfig::default());
        manager.disconnect().await.unwrap();
        assert_eq!(manager.get_state().await, ConnectionState::Disconnected);
    }
}
