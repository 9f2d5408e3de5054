//! Public market and network data: exchange rates, gas prices and
//! gateway health.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::QuoteService;
use crate::cache::TtlCache;
use crate::chain::{ExchangeRates, PriceFeed, RemittanceGateway, RpcProvider};

const NETWORK_TTL: Duration = Duration::from_secs(60);
const GAS_KEY: &str = "network_gas_prices";
const CONTRACT_KEY: &str = "network_contract_status";

/// Gas of a plain value transfer.
const TRANSFER_GAS: f64 = 21_000.0;

/// Long-run averages (gwei) used as mock data and as the "high" baseline.
const HISTORICAL_SLOW: u64 = 50;
const HISTORICAL_AVERAGE: u64 = 70;
const HISTORICAL_FAST: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSource {
    Blockchain,
    Mock,
}

/// Gas price tiers in gwei with the USD cost of a transfer at each.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrices {
    pub slow: u64,
    pub average: u64,
    pub fast: u64,
    pub unit: &'static str,
    pub slow_usd: String,
    pub average_usd: String,
    pub fast_usd: String,
    pub eth_price: f64,
    /// Average more than 30% above the historical average.
    pub is_high: bool,
    pub source: GasSource,
}

impl GasPrices {
    fn from_tiers(slow: u64, average: u64, fast: u64, eth_price: f64, source: GasSource) -> Self {
        let usd = |gwei: u64| format!("{:.2}", gwei as f64 * 1e-9 * TRANSFER_GAS * eth_price);
        Self {
            slow,
            average,
            fast,
            unit: "gwei",
            slow_usd: usd(slow),
            average_usd: usd(average),
            fast_usd: usd(fast),
            eth_price,
            is_high: average as f64 > HISTORICAL_AVERAGE as f64 * 1.3,
            source,
        }
    }

    /// Tiers around the node's current price: 80%, 100% and 120%.
    fn from_wei(gas_price_wei: u128, eth_price: f64) -> Self {
        let gwei = gas_price_wei as f64 / 1e9;
        let slow = ((gwei * 0.8).round() as u64).max(1);
        let average = gwei.round() as u64;
        let fast = (gwei * 1.2).round() as u64;
        Self::from_tiers(slow, average, fast, eth_price, GasSource::Blockchain)
    }

    fn mock(eth_price: f64) -> Self {
        Self::from_tiers(
            HISTORICAL_SLOW,
            HISTORICAL_AVERAGE,
            HISTORICAL_FAST,
            eth_price,
            GasSource::Mock,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractStatus {
    /// Remittances go on-chain.
    pub working: bool,
    pub mode: &'static str,
    pub network: String,
    pub rpc_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Entries dropped by a cache refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheRefresh {
    pub prices: usize,
    pub quotes: usize,
    pub network: usize,
}

#[derive(Clone)]
pub struct NetworkService {
    gateway: Arc<dyn RemittanceGateway>,
    rpc: Option<Arc<RpcProvider>>,
    prices: Arc<PriceFeed>,
    quotes: QuoteService,
    gas: TtlCache<GasPrices>,
    contract: TtlCache<ContractStatus>,
}

impl NetworkService {
    pub fn new(
        gateway: Arc<dyn RemittanceGateway>,
        rpc: Option<Arc<RpcProvider>>,
        prices: Arc<PriceFeed>,
        quotes: QuoteService,
    ) -> Self {
        Self {
            gateway,
            rpc,
            prices,
            quotes,
            gas: TtlCache::new("gas_prices"),
            contract: TtlCache::new("contract_status"),
        }
    }

    pub async fn exchange_rates(&self) -> ExchangeRates {
        self.prices.exchange_rates().await
    }

    /// Live tiers from the RPC node, or the historical averages.
    pub async fn gas_prices(&self) -> GasPrices {
        if let Some(prices) = self.gas.get(GAS_KEY) {
            return prices;
        }

        let eth_price = self.prices.price("ETH").await;
        let prices = match &self.rpc {
            Some(rpc) => match rpc.gas_price().await {
                Ok(wei) => GasPrices::from_wei(wei, eth_price),
                Err(e) => {
                    warn!("Gas price lookup failed, using historical averages: {}", e);
                    GasPrices::mock(eth_price)
                }
            },
            None => GasPrices::mock(eth_price),
        };
        debug!("Gas prices: {}/{}/{} gwei ({:?})", prices.slow, prices.average, prices.fast, prices.source);

        self.gas.set(GAS_KEY, prices.clone(), NETWORK_TTL);
        prices
    }

    pub async fn contract_status(&self) -> ContractStatus {
        if let Some(status) = self.contract.get(CONTRACT_KEY) {
            return status;
        }

        let mode = self.gateway.mode();
        let mut status = ContractStatus {
            working: false,
            mode,
            network: "Not set".to_string(),
            rpc_reachable: false,
            chain_id: None,
            block_number: None,
            error: None,
            checked_at: Utc::now(),
        };

        if let Some(rpc) = &self.rpc {
            status.network = rpc.url().to_string();
            match futures::try_join!(rpc.chain_id(), rpc.block_number()) {
                Ok((chain_id, block_number)) => {
                    status.rpc_reachable = true;
                    status.chain_id = Some(chain_id);
                    status.block_number = Some(block_number);
                }
                Err(e) => {
                    warn!("RPC node {} unreachable: {}", rpc.url(), e);
                    status.error = Some(e.to_string());
                }
            }
        }
        status.working = mode == "blockchain" && status.rpc_reachable;

        self.contract.set(CONTRACT_KEY, status.clone(), NETWORK_TTL);
        status
    }

    /// Drop cached prices, quotes and network data.
    pub fn refresh_caches(&self) -> CacheRefresh {
        let refresh = CacheRefresh {
            prices: self.prices.refresh(),
            quotes: self.quotes.invalidate(),
            network: self.gas.invalidate("network") + self.contract.invalidate("network"),
        };
        info!(
            "Cache refresh: {} price, {} quote, {} network entries dropped",
            refresh.prices, refresh.quotes, refresh.network
        );
        refresh
    }
}
