//! The provider directory: announcement write path and newest-first read path.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::time::expiry_after;
use crate::{
    AddrInfo, AddressCache, Clock, DirectoryConfig, DirectoryError, Order, Paginator,
    ProviderRecord, RecordStore, ScanQuery, SystemClock,
};

/// Maps content keys to the peers announcing they can serve them.
///
/// Holds no state of its own beyond configuration: every announcement lives
/// in the `RecordStore`, and peer addresses live in the `AddressCache`. Both
/// operations take `&self` and may run concurrently.
pub struct ProviderDirectory<S: RecordStore + ?Sized, C: AddressCache + ?Sized> {
    config: DirectoryConfig,
    store: Arc<S>,
    addresses: Arc<C>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore + ?Sized, C: AddressCache + ?Sized> Clone for ProviderDirectory<S, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            addresses: Arc::clone(&self.addresses),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: RecordStore + ?Sized, C: AddressCache + ?Sized> ProviderDirectory<S, C> {
    pub fn new(
        config: DirectoryConfig,
        store: Arc<S>,
        addresses: Arc<C>,
    ) -> Result<Self, DirectoryError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            addresses,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to compute record expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Record that `provider` can serve `key`.
    ///
    /// The provider's addresses are handed to the address cache before the
    /// record is written, so they are learned even if the write fails.
    /// Announcements from this node skip the cache. Store failures are
    /// returned as-is without retrying.
    pub async fn add_provider(&self, key: &[u8], provider: &AddrInfo) -> Result<(), DirectoryError> {
        if key.is_empty() {
            return Err(DirectoryError::InvalidKey);
        }

        if provider.id != self.config.self_id {
            self.addresses.add_addresses(
                &provider.id,
                &provider.addrs,
                self.config.provider_addr_ttl,
            );
        }

        let expires_at = expiry_after(self.clock.now(), self.config.record_ttl);
        let record = ProviderRecord::new(key, provider.id.clone(), expires_at);

        debug!(
            key = %hex::encode(key),
            provider = %provider.id,
            expires_at,
            "add provider"
        );

        self.store
            .put(&record.key, record.expires_at, record.attributes())
            .await
            .map_err(|e| {
                warn!(key = %hex::encode(key), provider = %provider.id, error = %e, "add provider failed");
                DirectoryError::StoreWrite(e)
            })
    }

    /// Every stored provider for `key`, most recently announced first, with
    /// addresses resolved through the address cache.
    ///
    /// Pages of `query_page_limit` records are read until the store is
    /// exhausted. Any failed page or malformed record fails the whole call.
    pub async fn get_providers(&self, key: &[u8]) -> Result<Vec<AddrInfo>, DirectoryError> {
        if key.is_empty() {
            return Err(DirectoryError::InvalidKey);
        }

        let mut query = ScanQuery::new(key)
            .order(Order::Desc)
            .limit(self.config.query_page_limit);
        if self.config.filter_expired {
            query = query.sort_floor(self.clock.now_unix());
        }

        let mut paginator = Paginator::new(self.store.as_ref(), query);
        let mut providers = Vec::new();

        while paginator.has_more_pages() {
            let items = paginator.next_page().await.map_err(|e| {
                warn!(key = %hex::encode(key), error = %e, "get providers failed");
                DirectoryError::StoreRead(e)
            })?;

            for item in &items {
                let id = ProviderRecord::provider_from_item(item)?;
                let info = self.addresses.peer_info(&id);
                debug!(provider = %info, "found provider");
                providers.push(info);
            }
        }

        debug!(key = %hex::encode(key), count = providers.len(), "get providers");
        Ok(providers)
    }
}
