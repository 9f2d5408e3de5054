//! Live token prices from CoinGecko.
//!
//! Results are cached for 15 minutes. The free tier is rate limited, so the
//! feed keeps a conservative daily call budget; once spent, the reference
//! table is served until the next UTC day. Any failure also falls back to the
//! reference table.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::rates::{self, REFERENCE_PRICES};
use super::{http_client, ChainError};
use crate::cache::TtlCache;

const RATES_KEY: &str = "price_rates";
const RATES_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_DAILY_BUDGET: u32 = 40;

/// CoinGecko ids for the symbols we track. Others come from the reference table.
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("MATIC", "matic-network"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("DAI", "dai"),
    ("WBTC", "wrapped-bitcoin"),
    ("WETH", "weth"),
    ("SOL", "solana"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("AAVE", "aave"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Coingecko,
    Reference,
}

/// USD prices keyed by symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRates {
    pub rates: BTreeMap<String, f64>,
    pub source: RateSource,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRates {
    pub fn reference() -> Self {
        Self {
            rates: REFERENCE_PRICES
                .iter()
                .map(|p| (p.symbol.to_string(), p.price))
                .collect(),
            source: RateSource::Reference,
            updated_at: Utc::now(),
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.rates.get(&symbol.to_uppercase()).copied()
    }
}

#[derive(Debug)]
struct DailyBudget {
    day: NaiveDate,
    used: u32,
    limit: u32,
}

impl DailyBudget {
    fn new(limit: u32) -> Self {
        Self {
            day: Utc::now().date_naive(),
            used: 0,
            limit,
        }
    }

    /// Spend one call. `false` once the day's budget is gone.
    fn try_spend(&mut self, today: NaiveDate) -> bool {
        if today != self.day {
            info!("CoinGecko call budget reset for {}", today);
            self.day = today;
            self.used = 0;
        }
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }
}

pub struct PriceFeed {
    http: reqwest::Client,
    base_url: String,
    cache: TtlCache<ExchangeRates>,
    budget: Mutex<DailyBudget>,
    /// Held while refilling the cache so concurrent misses share one fetch.
    refill: AsyncMutex<()>,
}

impl PriceFeed {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChainError> {
        Self::with_daily_budget(base_url, DEFAULT_DAILY_BUDGET)
    }

    pub fn with_daily_budget(base_url: impl Into<String>, limit: u32) -> Result<Self, ChainError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: TtlCache::new("price_feed"),
            budget: Mutex::new(DailyBudget::new(limit)),
            refill: AsyncMutex::new(()),
        })
    }

    /// Current rates: cached, live, or reference, in that order of preference.
    pub async fn exchange_rates(&self) -> ExchangeRates {
        if let Some(rates) = self.cache.get(RATES_KEY) {
            return rates;
        }

        let _refill = self.refill.lock().await;
        if let Some(rates) = self.cache.get(RATES_KEY) {
            debug!("Prices refilled by a concurrent request");
            return rates;
        }

        let allowed = self.budget.lock().try_spend(Utc::now().date_naive());
        let rates = if allowed {
            match self.fetch().await {
                Ok(rates) => rates,
                Err(e) => {
                    warn!("CoinGecko request failed, using reference prices: {}", e);
                    ExchangeRates::reference()
                }
            }
        } else {
            debug!("CoinGecko daily budget spent, using reference prices");
            ExchangeRates::reference()
        };

        self.cache.set(RATES_KEY, rates.clone(), RATES_TTL);
        rates
    }

    /// USD price for a symbol; unknown symbols price at par.
    pub async fn price(&self, symbol: &str) -> f64 {
        self.exchange_rates()
            .await
            .price(symbol)
            .unwrap_or_else(|| rates::price_or_par(symbol))
    }

    /// Drop cached prices. Returns the number of entries removed.
    pub fn refresh(&self) -> usize {
        let removed = self.cache.invalidate("price");
        info!("Invalidated {} cached price entries", removed);
        removed
    }

    async fn fetch(&self) -> Result<ExchangeRates, ChainError> {
        let ids = COINGECKO_IDS
            .iter()
            .map(|(_, id)| *id)
            .collect::<Vec<_>>()
            .join(",");

        let body: Value = self
            .http
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !body.is_object() {
            return Err(ChainError::Malformed("simple/price: expected an object".into()));
        }

        // Start from reference prices so symbols CoinGecko omits stay priced.
        let mut rates = ExchangeRates::reference();
        rates.source = RateSource::Coingecko;
        let mut live = 0;
        for (symbol, id) in COINGECKO_IDS {
            if let Some(usd) = body.pointer(&format!("/{id}/usd")).and_then(Value::as_f64) {
                rates.rates.insert((*symbol).to_string(), usd);
                live += 1;
            }
        }

        if live == 0 {
            return Err(ChainError::Malformed("simple/price: no usable prices".into()));
        }
        debug!("Fetched {} live prices from CoinGecko", live);
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    #[test]
    fn test_budget_resets_daily() {
        let mut budget = DailyBudget::new(2);
        let today = budget.day;
        assert!(budget.try_spend(today));
        assert!(budget.try_spend(today));
        assert!(!budget.try_spend(today));

        let tomorrow = today.succ_opt().unwrap();
        assert!(budget.try_spend(tomorrow));
    }

    #[tokio::test]
    async fn test_live_prices_are_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"bitcoin":{"usd":90000.5},"ethereum":{"usd":2100.0}}"#)
            .expect(1)
            .create_async()
            .await;

        let feed = PriceFeed::new(server.url()).unwrap();
        let rates = feed.exchange_rates().await;
        assert_eq!(rates.source, RateSource::Coingecko);
        assert_eq!(rates.price("BTC"), Some(90000.5));
        // Missing from the response: reference price
        assert_eq!(rates.price("SGD"), Some(0.74));

        let again = feed.exchange_rates().await;
        assert_eq!(again.price("eth"), Some(2100.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ethereum":{"usd":2100.0}}"#)
            .expect(1)
            .create_async()
            .await;

        let feed = PriceFeed::with_daily_budget(server.url(), 5).unwrap();
        let all = futures::future::join_all((0..8).map(|_| feed.exchange_rates())).await;
        assert!(all.iter().all(|r| r.price("ETH") == Some(2100.0)));
        assert_eq!(feed.budget.lock().used, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_reference() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let feed = PriceFeed::new(server.url()).unwrap();
        let rates = feed.exchange_rates().await;
        assert_eq!(rates.source, RateSource::Reference);
        assert_eq!(rates.price("ETH"), Some(2_025.53));
    }

    #[tokio::test]
    async fn test_spent_budget_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let feed = PriceFeed::with_daily_budget(server.url(), 0).unwrap();
        assert_eq!(feed.exchange_rates().await.source, RateSource::Reference);
        assert_eq!(feed.refresh(), 1);
        mock.assert_async().await;
    }
}
