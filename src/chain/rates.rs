//! Reference token prices (USD) with 24h change.
//!
//! Used when live prices are unavailable and by the quote fallback.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePrice {
    pub symbol: &'static str,
    pub price: f64,
    pub price_change: f64,
}

const fn entry(symbol: &'static str, price: f64, price_change: f64) -> ReferencePrice {
    ReferencePrice {
        symbol,
        price,
        price_change,
    }
}

pub const REFERENCE_PRICES: &[ReferencePrice] = &[
    entry("BTC", 87_324.00, 2.1),
    entry("ETH", 2_025.53, 1.5),
    entry("MATIC", 0.238_411, -0.8),
    entry("USDC", 1.0, 0.01),
    entry("USDT", 1.0, 0.02),
    entry("DAI", 1.0, 0.05),
    entry("SGD", 0.74, -0.3),
    entry("WBTC", 87_324.00, 2.1),
    entry("WETH", 2_025.53, 1.5),
    entry("SOL", 168.45, 3.2),
    entry("AVAX", 26.32, -1.8),
    entry("DOT", 7.15, 0.9),
    entry("LINK", 12.85, 1.7),
    entry("UNI", 8.47, -0.5),
    entry("AAVE", 93.21, 2.3),
];

/// Case-insensitive lookup.
pub fn lookup(symbol: &str) -> Option<&'static ReferencePrice> {
    REFERENCE_PRICES
        .iter()
        .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
}

/// Reference price, or 1.0 for unknown tokens.
pub fn price_or_par(symbol: &str) -> f64 {
    lookup(symbol).map(|p| p.price).unwrap_or(1.0)
}

/// Convert `amount` of `source` into `target` at reference prices.
pub fn convert(amount: f64, source: &str, target: &str) -> f64 {
    let target_price = price_or_par(target);
    if target_price <= 0.0 {
        return amount;
    }
    amount * price_or_par(source) / target_price
}
