//! Cache configuration.

use std::time::Duration;

/// Configuration for a `TypedCache` instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Time-to-live for cache entries.
    /// After this duration, entries are automatically evicted.
    pub ttl: Option<Duration>,

    /// Time-to-idle for cache entries.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Account lookups: credentials rarely change, but a password reset
    /// must not be masked for long.
    pub fn accounts() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
            tti: Some(Duration::from_secs(120)),
        }
    }

    /// Last-seen KYC status per connected user.
    /// No expiry: an entry lives as long as the user's connection and is
    /// dropped when the user unregisters or disconnects.
    pub fn kyc_snapshots() -> Self {
        Self {
            max_capacity: 20_000,
            ttl: None,
            tti: None,
        }
    }
}
