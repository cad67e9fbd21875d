//! TTL-bounded snapshot cache keyed by address, query kind and parameter.
//!
//! Backed by a moka LRU store. Freshness is also re-checked against each
//! entry's creation instant on read, so a value older than the TTL is never
//! returned even if the store has not evicted it yet.

use crate::types::Address;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Kind of cached view; part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    WalletData,
    ProfitLoss,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::WalletData => "wallet",
            CacheKind::ProfitLoss => "pnl",
        }
    }
}

/// Stored value plus bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub created_at: Instant,
    pub owner: String,
}

/// Concurrent, capacity-bounded TTL cache.
pub struct SnapshotCache<V> {
    store: Cache<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V> SnapshotCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let store = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { store, ttl }
    }

    fn key(address: &Address, kind: CacheKind, param: Option<&str>) -> String {
        match param {
            Some(param) => format!("{}:{}:{}", address, kind.as_str(), param),
            None => format!("{}:{}", address, kind.as_str()),
        }
    }

    /// Fresh value for the key, if any.
    pub async fn get(&self, address: &Address, kind: CacheKind, param: Option<&str>) -> Option<V> {
        let key = Self::key(address, kind, param);
        let entry = self.store.get(&key).await?;

        if entry.created_at.elapsed() > self.ttl {
            debug!("Cache entry {} is stale, dropping", key);
            self.store.invalidate(&key).await;
            return None;
        }

        debug!("Cache hit for {}", key);
        Some(entry.payload)
    }

    pub async fn set(&self, address: &Address, kind: CacheKind, param: Option<&str>, value: V) {
        let key = Self::key(address, kind, param);
        let entry = CacheEntry {
            payload: value,
            created_at: Instant::now(),
            owner: address.to_string(),
        };
        self.store.insert(key, entry).await;
    }

    /// Drop every entry for an address, or only one kind (all its parameters).
    pub async fn invalidate(&self, address: &Address, kind: Option<CacheKind>) {
        let prefix = match kind {
            Some(kind) => format!("{}:{}", address, kind.as_str()),
            None => address.to_string(),
        };

        let doomed: Vec<String> = self
            .store
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &doomed {
            self.store.invalidate(key).await;
        }
        debug!("Invalidated {} cache entries with prefix {}", doomed.len(), prefix);
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    /// Approximate number of live entries after pending maintenance.
    pub async fn entry_count(&self) -> u64 {
        self.store.run_pending_tasks().await;
        self.store.entry_count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
