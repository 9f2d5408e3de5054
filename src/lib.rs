//! Remitd - remittance backend.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `cache` - TTL cache (per-entry expiry) and Moka-backed typed caches
//! - `retry` - Retrying executor for transient store failures
//! - `database` - Store traits with MongoDB and in-memory backends, schema migrations
//! - `chain` - Block explorer, JSON-RPC provider, remittance gateway, price feed
//! - `poller` - Bounded status polling of pending on-chain transactions
//! - `notify` - WebSocket notification hub and KYC watcher
//! - `services` - Auth, KYC, quote, transaction and network-data use cases
//! - `api` - Axum router, handlers and error mapping

pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod database;
pub mod notify;
pub mod poller;
pub mod retry;
pub mod services;

pub use api::{build_router, AppState};
pub use config::Config;
