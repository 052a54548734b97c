//! Provider Directory - durable content-key to provider mapping.
//!
//! A content-routing layer (such as a DHT) uses this crate to answer "who can
//! serve X?". Each announcement is persisted as its own record keyed by the
//! content key and the record's expiry time, so that reading a key back in
//! descending sort order yields the freshest announcements first.
//!
//! # Core Concepts
//!
//! - **Provider record**: `(key, expires_at) -> provider`. Records are
//!   append-only; expiry is left to the store.
//! - **Address cache**: peer addresses are not stored with records. They are
//!   learned from announcements and resolved again on every read.
//!
//! # Traits
//!
//! - [`RecordStore`]: composite-key put and paginated range queries
//! - [`AddressCache`]: peer id to address resolution
//! - [`StoreConnection`]: connection and schema setup for database backends
//! - [`Clock`]: time source for record expiry

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod address_cache;
mod config;
mod directory;
mod error;
mod memory;
mod peer;
mod query;
mod record;
mod repository;
mod time;

pub use address_cache::{AddressCache, MemoryAddressCache, PROVIDER_ADDR_TTL};
pub use config::{DirectoryConfig, DirectorySettings};
pub use directory::ProviderDirectory;
pub use error::{ConfigError, DirectoryError, MalformedRecord, StorageError};
pub use memory::MemoryRecordStore;
pub use peer::{AddrInfo, Multiaddr, PeerId};
pub use query::{
    Item, Order, Page, Paginator, RecordStore, ScanQuery, Value, check_identifier,
};
pub use record::{KEY_ATTRIBUTE, PROVIDER_ATTRIBUTE, ProviderRecord, SORT_ATTRIBUTE};
pub use repository::{ConnectionConfig, StoreConnection};
pub use time::{Clock, ManualClock, SystemClock, expiry_after};
