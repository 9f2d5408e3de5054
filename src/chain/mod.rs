//! External chain collaborators.
//!
//! - `explorer` - Polygonscan-compatible receipt status lookups
//! - `gateway` - Remittance sending and conversion quotes
//! - `rpc` - Minimal JSON-RPC provider (gas price, block number, chain id)
//! - `prices` - CoinGecko price feed with a daily call budget
//! - `rates` - Static reference prices used whenever live data is unavailable
//! - `tokens` - Token catalog (symbols, names, contract addresses)

mod explorer;
mod gateway;
mod prices;
pub mod rates;
mod rpc;
pub mod tokens;

pub use explorer::{ChainStatus, ExplorerClient, StatusSource};
pub use gateway::{
    QuoteSource, RemittanceGateway, RemittanceReceipt, RemittanceStatus, SimulatedGateway, TokenQuote,
};
pub use prices::{ExchangeRates, PriceFeed, RateSource};
pub use rpc::RpcProvider;

use std::time::Duration;

use thiserror::Error;

/// Timeout applied to every outbound chain/explorer/price request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("remittance rejected: {0}")]
    Rejected(String),
}

/// Build the shared HTTP client used by the chain clients.
pub fn http_client() -> Result<reqwest::Client, ChainError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("remitd/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
