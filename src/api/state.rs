//! Shared application state.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::chain::{
    ChainError, ExplorerClient, PriceFeed, RemittanceGateway, RpcProvider, SimulatedGateway,
    StatusSource,
};
use crate::config::Config;
use crate::database::Stores;
use crate::notify::{KycWatcher, NotificationHub, SocketContext};
use crate::poller::{PollPolicy, StatusPoller};
use crate::retry::RetryPolicy;
use crate::services::{
    AuthService, KycService, MarketService, NetworkService, QuoteService, TransactionService,
};

/// External chain collaborators.
#[derive(Clone)]
pub struct ChainClients {
    pub gateway: Arc<dyn RemittanceGateway>,
    pub status_source: Arc<dyn StatusSource>,
    pub rpc: Option<Arc<RpcProvider>>,
    pub prices: Arc<PriceFeed>,
}

impl ChainClients {
    pub fn from_config(config: &Config) -> Result<Self, ChainError> {
        let explorer = ExplorerClient::new(config.explorer_url(), config.explorer_api_key.clone())?;
        let rpc = config
            .rpc_url
            .as_deref()
            .map(RpcProvider::new)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            gateway: Arc::new(SimulatedGateway::new()),
            status_source: Arc::new(explorer),
            rpc,
            prices: Arc::new(PriceFeed::new(config.coingecko_api_url.clone())?),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub kyc: KycService,
    pub quotes: QuoteService,
    pub transactions: TransactionService,
    pub network: NetworkService,
    pub market: MarketService,
    pub hub: NotificationHub,
    pub watcher: KycWatcher,
    pub poller: StatusPoller,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, chain: ChainClients) -> Self {
        let retry = RetryPolicy::with_max_attempts(config.db_max_retries);
        let hub = NotificationHub::new();

        let watcher = KycWatcher::new(stores.kyc.clone(), hub.clone(), retry);
        let poller = StatusPoller::new(
            chain.status_source.clone(),
            stores.transactions.clone(),
            hub.clone(),
            PollPolicy::from(&config),
            retry,
        );

        let auth = AuthService::new(stores.users.clone(), &config.jwt_secret, retry);
        let kyc = KycService::new(
            stores.kyc.clone(),
            hub.clone(),
            watcher.clone(),
            config.upload_dir.clone(),
            retry,
        );
        let quotes = QuoteService::new(chain.gateway.clone());
        let transactions = TransactionService::new(
            stores.transactions.clone(),
            kyc.clone(),
            quotes.clone(),
            chain.gateway.clone(),
            chain.status_source.clone(),
            poller.clone(),
            hub.clone(),
            retry,
        );
        let network = NetworkService::new(chain.gateway, chain.rpc, chain.prices.clone(), quotes.clone());
        let market = MarketService::new(chain.prices, network.clone());

        Self {
            config: Arc::new(config),
            auth,
            kyc,
            quotes,
            transactions,
            network,
            market,
            hub,
            watcher,
            poller,
        }
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for SocketContext {
    fn from_ref(state: &AppState) -> Self {
        SocketContext {
            hub: state.hub.clone(),
            watcher: state.watcher.clone(),
        }
    }
}
