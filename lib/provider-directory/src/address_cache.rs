//! Resolution of peer identities to network addresses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{AddrInfo, Clock, Multiaddr, PeerId, SystemClock};

/// How long addresses learned from a provider announcement stay cached.
pub const PROVIDER_ADDR_TTL: Duration = Duration::from_secs(30 * 60);

/// Peer address book consulted and fed by the directory.
///
/// Neither method can fail: an unknown peer resolves to an empty address set,
/// and learning addresses is best-effort.
pub trait AddressCache: Send + Sync {
    fn peer_info(&self, id: &PeerId) -> AddrInfo;

    fn add_addresses(&self, id: &PeerId, addrs: &[Multiaddr], ttl: Duration);
}

impl<C: AddressCache + ?Sized> AddressCache for Arc<C> {
    fn peer_info(&self, id: &PeerId) -> AddrInfo {
        (**self).peer_info(id)
    }

    fn add_addresses(&self, id: &PeerId, addrs: &[Multiaddr], ttl: Duration) {
        (**self).add_addresses(id, addrs, ttl)
    }
}

#[derive(Debug, Clone)]
struct CachedAddr {
    addr: Multiaddr,
    expires_at: DateTime<Utc>,
}

/// In-memory address book with per-address expiry.
#[derive(Clone)]
pub struct MemoryAddressCache {
    inner: Arc<MemoryAddressCacheInner>,
}

struct MemoryAddressCacheInner {
    clock: Arc<dyn Clock>,
    /// Insertion-ordered addresses per peer
    peers: RwLock<HashMap<PeerId, Vec<CachedAddr>>>,
}

impl MemoryAddressCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(MemoryAddressCacheInner {
                clock,
                peers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Drop every expired address, and peers left with none.
    pub fn prune(&self) -> usize {
        let now = self.inner.clock.now();
        let mut peers = self.inner.peers.write();
        let mut removed = 0;
        for addrs in peers.values_mut() {
            let before = addrs.len();
            addrs.retain(|cached| cached.expires_at > now);
            removed += before - addrs.len();
        }
        peers.retain(|_, addrs| !addrs.is_empty());
        removed
    }

    /// Number of peers with at least one cached address, expired or not.
    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().len()
    }
}

impl Default for MemoryAddressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressCache for MemoryAddressCache {
    fn peer_info(&self, id: &PeerId) -> AddrInfo {
        let now = self.inner.clock.now();
        let peers = self.inner.peers.read();

        let addrs = match peers.get(id) {
            Some(cached) => cached
                .iter()
                .filter(|c| c.expires_at > now)
                .map(|c| c.addr.clone())
                .collect(),
            None => Vec::new(),
        };

        AddrInfo::new(id.clone(), addrs)
    }

    fn add_addresses(&self, id: &PeerId, addrs: &[Multiaddr], ttl: Duration) {
        if addrs.is_empty() || ttl.is_zero() {
            return;
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .inner
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut peers = self.inner.peers.write();
        let cached = peers.entry(id.clone()).or_default();

        for addr in addrs {
            match cached.iter_mut().find(|c| &c.addr == addr) {
                // Never shorten a lifetime granted earlier
                Some(existing) => existing.expires_at = existing.expires_at.max(expires_at),
                None => cached.push(CachedAddr {
                    addr: addr.clone(),
                    expires_at,
                }),
            }
        }
    }
}
