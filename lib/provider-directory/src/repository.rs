//! Connection lifecycle for database-backed record stores.

use async_trait::async_trait;

use crate::StorageError;

/// Connection configuration for database backends.
///
/// This enum is extensible for future authentication methods.
#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    /// Connect using a database URL string.
    Url(String),
    /// Connect with root credentials (SurrealDB).
    Credentials {
        url: String,
        namespace: String,
        database: String,
        username: String,
        password: String,
    },
}

impl ConnectionConfig {
    pub fn url(&self) -> &str {
        match self {
            ConnectionConfig::Url(url) => url,
            ConnectionConfig::Credentials { url, .. } => url,
        }
    }
}

impl From<&str> for ConnectionConfig {
    fn from(url: &str) -> Self {
        ConnectionConfig::Url(url.to_string())
    }
}

impl From<String> for ConnectionConfig {
    fn from(url: String) -> Self {
        ConnectionConfig::Url(url)
    }
}

impl From<&String> for ConnectionConfig {
    fn from(url: &String) -> Self {
        ConnectionConfig::Url(url.clone())
    }
}

/// Trait for record store connection and schema setup.
///
/// Provisioning is kept apart from reads and writes: a directory only ever
/// needs `RecordStore`, while deployment tooling calls `initialize` once.
#[async_trait]
pub trait StoreConnection: Sized + Send + Sync {
    /// Connect to the database using the provided configuration.
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError>;

    /// Create the provider table if it does not exist.
    async fn initialize(&self) -> Result<(), StorageError>;
}
