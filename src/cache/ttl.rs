//! String-keyed cache with per-entry time-to-live.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// A cached value and the instant after which it is stale.
#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Key → (value, expiry) map.
///
/// Expired entries are only removed when read (or by `invalidate`/`clear`);
/// there is no background eviction. Last writer wins.
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CachedEntry<V>>>,
    name: Arc<str>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            name: Arc::clone(&self.name),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            name: name.into(),
        }
    }

    /// Store `value` under `key`, expiring `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CachedEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Return the value if it has not expired; evict it otherwise.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // The read guard is released above; removing while holding it would deadlock the shard.
        self.entries
            .remove_if(key, |_, entry| now >= entry.expires_at);
        debug!("{}: evicted expired entry {}", self.name, key);
        None
    }

    /// Delete every key containing `pattern`. Returns how many were removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        let removed = before.saturating_sub(self.entries.len());
        debug!("{}: invalidated {} entries matching '{}'", self.name, removed, pattern);
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_after_ttl() {
        let cache = TtlCache::new("quotes");
        cache.set("k", 42u32, Duration::from_secs(30));
        assert_eq!(cache.get("k"), Some(42));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get("k"), Some(42));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_value_and_expiry() {
        let cache = TtlCache::new("prices");
        cache.set("eth", 1.0f64, Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set("eth", 2.0f64, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("eth"), Some(2.0));
    }

    #[test]
    fn test_invalidate_by_substring() {
        let cache = TtlCache::new("mixed");
        let ttl = Duration::from_secs(60);
        cache.set("quote_ETH_1_USDC", 1, ttl);
        cache.set("quote_MATIC_5_USDC", 2, ttl);
        cache.set("exchange_rates", 3, ttl);
        cache.set("contract_status", 4, ttl);

        assert_eq!(cache.invalidate("quote"), 2);
        assert_eq!(cache.get("quote_ETH_1_USDC"), None);
        assert_eq!(cache.get("quote_MATIC_5_USDC"), None);
        assert_eq!(cache.get("exchange_rates"), Some(3));
        assert_eq!(cache.get("contract_status"), Some(4));
    }

    #[test]
    fn test_missing_key_and_clear() {
        let cache: TtlCache<String> = TtlCache::new("empty");
        assert!(cache.get("nope").is_none());

        cache.set("a", "x".to_string(), Duration::from_secs(1));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
