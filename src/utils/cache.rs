//! In-Memory Label Cache
//!
//! Thread-safe TTL cache for enrichment lookups, shared by concurrent traces.
//! Keys are `(chain, normalized address)` so the same EVM address on two
//! chains is cached separately.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::config::Chain;
use crate::utils::address::normalize;
use crate::utils::constants::DEFAULT_LABEL_CACHE_TTL_SECS;

/// Cache entry with creation time for TTL validation
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub labels: BTreeSet<String>,
    pub created_at: Instant,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > Duration::from_secs(self.ttl_secs)
    }

    pub fn remaining_ttl(&self) -> u64 {
        let elapsed = self.created_at.elapsed().as_secs();
        self.ttl_secs.saturating_sub(elapsed)
    }
}

/// Label cache backed by DashMap
#[derive(Clone)]
pub struct LabelCache {
    store: Arc<DashMap<(Chain, String), CacheEntry>>,
    ttl_secs: u64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_LABEL_CACHE_TTL_SECS)
    }
}

impl LabelCache {
    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl_secs,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns cached labels when present and not expired
    pub fn get(&self, chain: Chain, address: &str) -> Option<BTreeSet<String>> {
        let key = (chain, normalize(chain, address));

        if let Some(entry) = self.store.get(&key) {
            if entry.is_expired() {
                drop(entry); // release read guard before remove
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 LABEL CACHE MISS (expired): {}:{}", key.0, key.1);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "✅ LABEL CACHE HIT: {}:{} (TTL: {}s remaining)",
                    key.0,
                    key.1,
                    entry.remaining_ttl()
                );
                Some(entry.labels.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn set(&self, chain: Chain, address: &str, labels: BTreeSet<String>) {
        let key = (chain, normalize(chain, address));
        self.store.insert(
            key,
            CacheEntry {
                labels,
                created_at: Instant::now(),
                ttl_secs: self.ttl_secs,
            },
        );
    }

    /// Drop every expired entry; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before - self.store.len();
        if removed > 0 {
            debug!("🧹 LABEL CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl_secs,
        }
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cache_set_get() {
        let cache = LabelCache::default();
        let address = "0xdAC17F958D2ee523a2206206994597C13D831ec7";
        cache.set(Chain::Ethereum, address, labels(&["exchange"]));
        assert_eq!(cache.get(Chain::Ethereum, address), Some(labels(&["exchange"])));
    }

    #[test]
    fn test_address_normalization() {
        let cache = LabelCache::default();
        cache.set(
            Chain::Ethereum,
            "0xDAC17F958D2EE523A2206206994597C13D831EC7",
            labels(&["mixer"]),
        );
        assert!(cache
            .get(Chain::Ethereum, "0xdac17f958d2ee523a2206206994597c13d831ec7")
            .is_some());
    }

    #[test]
    fn test_chain_is_part_of_key() {
        let cache = LabelCache::default();
        let address = "0x1234567890123456789012345678901234567890";
        cache.set(Chain::Ethereum, address, labels(&["bridge"]));
        assert!(cache.get(Chain::Base, address).is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = LabelCache::with_ttl(0);
        cache.set(Chain::Solana, "abc", labels(&["x"]));
        std::thread::sleep(Duration::from_millis(1100));
        assert!(cache.get(Chain::Solana, "abc").is_none());
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = LabelCache::default();
        cache.set(Chain::Tron, "T1", BTreeSet::new());
        cache.get(Chain::Tron, "T1");
        cache.get(Chain::Tron, "T2");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
