//! Cache module.
//!
//! Two flavours of in-process cache, both owned by the application state
//! and handed to the components that need them:
//!
//! - `TtlCache` - string-keyed map with a TTL chosen per `set` call and
//!   substring invalidation. Used for quotes, prices and contract status.
//! - `TypedCache` - Moka-backed cache with a fixed TTL from `CacheConfig`.
//!   Used for repository lookups and KYC snapshots.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use remitd::cache::TtlCache;
//!
//! let quotes: TtlCache<String> = TtlCache::new("quotes");
//! quotes.set("quote_ETH_1_USDC", "2025.53".to_string(), Duration::from_secs(30));
//! assert_eq!(quotes.get("quote_ETH_1_USDC").as_deref(), Some("2025.53"));
//! quotes.invalidate("quote_");
//! ```

mod config;
mod ttl;
mod typed;

pub use config::CacheConfig;
pub use ttl::TtlCache;
pub use typed::TypedCache;
