//! Token market data for the send form: catalog search, per-token prices,
//! price history and the bundled rates/fees/conditions snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use super::quote::parse_amount;
use super::{GasPrices, NetworkService, ServiceError};
use crate::cache::TtlCache;
use crate::chain::tokens::{self, TokenInfo, TokenKind, TOKEN_CATALOG};
use crate::chain::{rates, ExchangeRates, PriceFeed, RateSource};

const SEARCH_TTL: Duration = Duration::from_secs(30 * 60);
const HISTORY_TTL: Duration = Duration::from_secs(60 * 60);
const PRICE_TTL: Duration = Duration::from_secs(5 * 60);

const POPULAR_LIMIT: usize = 5;
const MIN_QUERY_LEN: usize = 2;
const DEFAULT_HISTORY_DAYS: u32 = 7;
const MAX_HISTORY_DAYS: u32 = 365;
/// Synthetic history swings up to 10% either side of the current price.
const HISTORY_SPREAD: f64 = 0.10;

const SWAP_FEE_RATE: f64 = 0.003;
const PLATFORM_FEE_RATE: f64 = 0.005;
/// Average cost of a bank or money-transfer-operator remittance.
const TRADITIONAL_FEE_RATE: f64 = 0.062;
const DEFAULT_GAS_USD: f64 = 2.10;
/// Percent above the long-run average that counts as expensive.
const HIGH_PRICE_THRESHOLD: f64 = 5.0;

const HISTORICAL_AVERAGES: &[(&str, f64)] = &[
    ("BTC", 60_000.0),
    ("ETH", 3_000.0),
    ("MATIC", 0.75),
    ("USDC", 1.0),
    ("USDT", 1.0),
    ("DAI", 1.0),
    ("BUSD", 1.0),
    ("WETH", 3_000.0),
    ("WMATIC", 0.75),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListing {
    pub symbol: &'static str,
    pub name: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub address: &'static str,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceOrigin {
    Coingecko,
    Reference,
    /// Unknown token priced at par.
    Default,
}

impl From<RateSource> for PriceOrigin {
    fn from(source: RateSource) -> Self {
        match source {
            RateSource::Coingecko => Self::Coingecko,
            RateSource::Reference => Self::Reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPrice {
    pub symbol: String,
    pub price: f64,
    pub price_change_24h: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub source: PriceOrigin,
}

/// `[unix_millis, value]` series in the CoinGecko market-chart layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistory {
    pub prices: Vec<(i64, f64)>,
    pub market_caps: Vec<(i64, f64)>,
    pub total_volumes: Vec<(i64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub amount: f64,
    pub converted_amount: f64,
}

/// Fees in USD for the requested amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub gas: f64,
    pub swap: f64,
    pub platform: f64,
    pub total: f64,
    pub traditional: f64,
    pub savings: f64,
    /// Total fees as a percentage of the amount, two decimals.
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCondition {
    pub current: f64,
    pub historical: f64,
    pub difference: f64,
    pub is_higher: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditions {
    pub favorable: bool,
    pub message: &'static str,
    pub is_higher_than_average: bool,
    pub tokens: BTreeMap<String, TokenCondition>,
}

impl MarketConditions {
    fn assess(rates: &ExchangeRates, symbols: &[&str], gas_is_high: bool) -> Self {
        let mut tokens = BTreeMap::new();
        for symbol in symbols {
            let historical = HISTORICAL_AVERAGES
                .iter()
                .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
                .map(|(_, avg)| *avg);
            if let (Some(current), Some(historical)) = (rates.price(symbol), historical) {
                let difference = (current - historical) / historical * 100.0;
                tokens.insert(
                    symbol.to_string(),
                    TokenCondition {
                        current,
                        historical,
                        difference,
                        is_higher: difference > HIGH_PRICE_THRESHOLD,
                    },
                );
            }
        }

        let is_higher_than_average = tokens.values().any(|t| t.is_higher);
        let favorable = !is_higher_than_average && !gas_is_high;
        let message = if favorable {
            "Current market conditions are favorable for this transaction."
        } else if is_higher_than_average {
            "Token prices are currently higher than average. You might get better rates later."
        } else {
            "Gas fees are currently high. Consider waiting for lower network traffic."
        };

        Self {
            favorable,
            message,
            is_higher_than_average,
            tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledRates {
    pub timestamp: DateTime<Utc>,
    pub exchange_rates: BTreeMap<String, f64>,
    pub rate_source: RateSource,
    pub gas_estimate: GasPrices,
    pub conversion: Conversion,
    pub fees: FeeBreakdown,
    pub market_conditions: MarketConditions,
}

#[derive(Clone)]
pub struct MarketService {
    prices: Arc<PriceFeed>,
    network: NetworkService,
    searches: TtlCache<Vec<TokenListing>>,
    histories: TtlCache<PriceHistory>,
    token_prices: TtlCache<TokenPrice>,
}

impl MarketService {
    pub fn new(prices: Arc<PriceFeed>, network: NetworkService) -> Self {
        Self {
            prices,
            network,
            searches: TtlCache::new("token_search"),
            histories: TtlCache::new("price_history"),
            token_prices: TtlCache::new("token_price"),
        }
    }

    /// Rates, gas, fees and market conditions for converting `amount` of
    /// `from` into `to`. Defaults: 1 ETH into USDC.
    pub async fn bundled_rates(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        amount: Option<&str>,
    ) -> Result<BundledRates, ServiceError> {
        let from = symbol_or(from, "ETH");
        let to = symbol_or(to, "USDC");
        let amount = match amount.map(str::trim) {
            None | Some("") => 1.0,
            Some(raw) => parse_amount(raw)?,
        };

        let rates = self.prices.exchange_rates().await;
        let gas = self.network.gas_prices().await;

        let from_price = rates.price(&from).unwrap_or_else(|| rates::price_or_par(&from));
        let to_price = rates.price(&to).unwrap_or_else(|| rates::price_or_par(&to));
        let rate = if to_price > 0.0 { from_price / to_price } else { 1.0 };

        let value_usd = amount * from_price;
        let gas_usd = gas.average_usd.parse().unwrap_or(DEFAULT_GAS_USD);
        let swap = value_usd * SWAP_FEE_RATE;
        let platform = value_usd * PLATFORM_FEE_RATE;
        let total = gas_usd + swap + platform;
        let traditional = value_usd * TRADITIONAL_FEE_RATE;
        let percentage = if value_usd > 0.0 {
            format!("{:.2}", total / value_usd * 100.0)
        } else {
            "0.00".to_string()
        };

        let market_conditions = MarketConditions::assess(&rates, &[from.as_str(), to.as_str()], gas.is_high);
        debug!(
            "Bundled rates {} -> {}: rate {}, fees ${:.2}, favorable {}",
            from, to, rate, total, market_conditions.favorable
        );

        Ok(BundledRates {
            timestamp: Utc::now(),
            rate_source: rates.source,
            exchange_rates: rates.rates,
            gas_estimate: gas,
            conversion: Conversion {
                from,
                to,
                rate,
                amount,
                converted_amount: amount * rate,
            },
            fees: FeeBreakdown {
                gas: gas_usd,
                swap,
                platform,
                total,
                traditional,
                savings: traditional - total,
                percentage,
            },
            market_conditions,
        })
    }

    /// Popular tokens when `query` is empty, otherwise catalog entries whose
    /// symbol or name contains it. `kind` narrows to crypto or stablecoins.
    pub async fn tokens(&self, query: Option<&str>, kind: Option<&str>) -> Vec<TokenListing> {
        let query = query.map(str::trim).unwrap_or_default().to_lowercase();
        let kind = kind.and_then(TokenKind::parse);

        if query.is_empty() {
            let popular = tokens::of_kind(kind.unwrap_or(TokenKind::Crypto)).take(POPULAR_LIMIT);
            return self.listings(popular).await;
        }
        if query.chars().count() < MIN_QUERY_LEN {
            return self.listings(tokens::of_kind(kind.unwrap_or(TokenKind::Crypto))).await;
        }

        let key = format!(
            "market_search_{}_{}",
            query,
            kind.map(|k| format!("{k:?}").to_lowercase()).unwrap_or_else(|| "all".into())
        );
        if let Some(found) = self.searches.get(&key) {
            return found;
        }

        let matches = TOKEN_CATALOG.iter().filter(|t| {
            kind.is_none_or(|k| t.kind == k)
                && (t.symbol.to_lowercase().contains(&query) || t.name.to_lowercase().contains(&query))
        });
        let found = self.listings(matches).await;
        debug!("Token search '{}' matched {} tokens", query, found.len());
        self.searches.set(key, found.clone(), SEARCH_TTL);
        found
    }

    /// 24h change in percent per symbol, formatted to two decimals.
    ///
    /// Symbols without reference data get a stable pseudo-change derived
    /// from the symbol, small for stablecoins.
    pub fn price_changes(&self, symbols: &str) -> Result<BTreeMap<String, String>, ServiceError> {
        let symbols: Vec<&str> = symbols
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(ServiceError::validation("Symbols parameter is required"));
        }

        Ok(symbols
            .into_iter()
            .map(|symbol| {
                let change = match rates::lookup(symbol) {
                    Some(reference) => reference.price_change,
                    None => {
                        let seed: u32 = symbol.chars().map(u32::from).sum();
                        let amplitude = if tokens::is_stablecoin(symbol) { 0.2 } else { 5.0 };
                        f64::from(seed).sin() * amplitude
                    }
                };
                (symbol.to_string(), format!("{change:.2}"))
            })
            .collect())
    }

    /// Daily points for the last `days` days around the current price.
    pub async fn token_history(
        &self,
        symbol: &str,
        days: Option<&str>,
    ) -> Result<PriceHistory, ServiceError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ServiceError::validation("Token symbol is required"));
        }
        let days = match days.map(str::trim) {
            None | Some("") => DEFAULT_HISTORY_DAYS,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|d| (1..=MAX_HISTORY_DAYS).contains(d))
                .ok_or_else(|| ServiceError::validation("Days must be between 1 and 365"))?,
        };

        let key = format!("market_history_{symbol}_{days}");
        if let Some(history) = self.histories.get(&key) {
            return Ok(history);
        }

        let current = self.prices.price(&symbol).await;
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let mut history = PriceHistory {
            prices: Vec::with_capacity(days as usize + 1),
            market_caps: Vec::with_capacity(days as usize + 1),
            total_volumes: Vec::with_capacity(days as usize + 1),
        };
        for back in (0..=i64::from(days)).rev() {
            let at = (now - chrono::Duration::days(back)).timestamp_millis();
            let price = current * (1.0 + rng.gen_range(-HISTORY_SPREAD..HISTORY_SPREAD));
            history.prices.push((at, price));
            history.market_caps.push((at, price * 1e9));
            history.total_volumes.push((at, price * 1e8));
        }

        self.histories.set(key, history.clone(), HISTORY_TTL);
        Ok(history)
    }

    /// Price by symbol or by contract address.
    pub async fn token_price(&self, symbol_or_address: &str) -> Result<TokenPrice, ServiceError> {
        let raw = symbol_or_address.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("undefined") || raw.eq_ignore_ascii_case("null") {
            return Err(ServiceError::validation("Valid token symbol or address is required"));
        }

        let key = format!("market_price_{}", raw.to_lowercase());
        if let Some(price) = self.token_prices.get(&key) {
            return Ok(price);
        }

        let (symbol, address) = if raw.starts_with("0x") {
            match tokens::by_address(raw) {
                Some(token) => (token.symbol.to_string(), Some(raw.to_string())),
                None => {
                    let unknown = TokenPrice {
                        symbol: "UNKNOWN".to_string(),
                        price: 1.0,
                        price_change_24h: 0.0,
                        address: Some(raw.to_string()),
                        source: PriceOrigin::Default,
                    };
                    self.token_prices.set(key, unknown.clone(), PRICE_TTL);
                    return Ok(unknown);
                }
            }
        } else {
            (raw.to_uppercase(), None)
        };

        let rates = self.prices.exchange_rates().await;
        let price_change_24h = rates::lookup(&symbol).map(|r| r.price_change).unwrap_or(0.0);
        let price = match rates.price(&symbol) {
            Some(price) => TokenPrice {
                symbol,
                price,
                price_change_24h,
                address,
                source: rates.source.into(),
            },
            None => TokenPrice {
                symbol,
                price: 1.0,
                price_change_24h,
                address,
                source: PriceOrigin::Default,
            },
        };

        self.token_prices.set(key, price.clone(), PRICE_TTL);
        Ok(price)
    }

    /// Drop cached searches, histories and token prices.
    pub fn invalidate(&self) -> usize {
        self.searches.invalidate("market")
            + self.histories.invalidate("market")
            + self.token_prices.invalidate("market")
    }

    async fn listings(&self, tokens: impl Iterator<Item = &'static TokenInfo>) -> Vec<TokenListing> {
        let rates = self.prices.exchange_rates().await;
        tokens
            .map(|t| TokenListing {
                symbol: t.symbol,
                name: t.name,
                address: t.address,
                kind: t.kind,
                price: rates.price(t.symbol).unwrap_or_else(|| rates::price_or_par(t.symbol)),
            })
            .collect()
    }
}

fn symbol_or(raw: Option<&str>, default: &str) -> String {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_uppercase(),
        _ => default.to_string(),
    }
}
