//! PostgreSQL record store for provider-directory.
//!
//! Provider records live in a table keyed by `(key, ttl)`:
//!
//! ```text
//! CREATE TABLE providers (
//!     key  BYTEA  NOT NULL,
//!     ttl  BIGINT NOT NULL,
//!     prov BYTEA  NOT NULL,
//!     PRIMARY KEY (key, ttl)
//! );
//! ```
//!
//! Reads use keyset pagination on `ttl`, so each page is a bounded index
//! range scan no matter how deep the caller pages.
//!
//! # Usage
//!
//! ```text
//! use provider_directory::{DirectoryConfig, MemoryAddressCache, ProviderDirectory, StoreConnection};
//! use provider_directory_postgres::PgRecordStore;
//!
//! let store = PgRecordStore::connect("postgres://localhost/dht").await?;
//! store.initialize().await?;
//! let directory = ProviderDirectory::new(config, Arc::new(store), Arc::new(MemoryAddressCache::new()))?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod executor;
mod row;

pub use executor::{DEFAULT_TABLE, MIGRATOR, PgPool, PgRecordStore};
pub use row::row_to_item;

// Re-export sqlx migration types
pub use sqlx::migrate;
pub use sqlx::migrate::Migrator;

// Re-export core types for convenience
pub use provider_directory::{
    ConnectionConfig, Item, Order, Page, RecordStore, ScanQuery, StorageError, StoreConnection,
    Value,
};
