//! SurrealDB record store for provider-directory.
//!
//! Each provider record is a row in a schemaless table whose id is
//! `[hex(key), ttl]`, so an announcement that lands on an existing
//! `(key, ttl)` pair replaces it. Byte attributes are stored as hex strings.
//!
//! # Usage
//!
//! ```text
//! use provider_directory::{ConnectionConfig, StoreConnection};
//! use provider_directory_surreal::SurrealRecordStore;
//!
//! let store = SurrealRecordStore::connect(ConnectionConfig::Credentials {
//!     url: "localhost:8000".into(),
//!     namespace: "dht".into(),
//!     database: "providers".into(),
//!     username: "root".into(),
//!     password: "root".into(),
//! }).await?;
//! store.initialize().await?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod executor;

pub use executor::{DEFAULT_TABLE, SurrealPool, SurrealRecordStore};

// Re-export core types for convenience
pub use provider_directory::{
    ConnectionConfig, Item, Order, Page, RecordStore, ScanQuery, StorageError, StoreConnection,
    Value,
};
