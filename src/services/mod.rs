//! Application use cases, between the HTTP layer and the stores.
//!
//! Every store call goes through the retrying executor.

pub mod auth;
pub mod kyc;
pub mod market;
pub mod network;
mod password;
pub mod quote;
pub mod transactions;

use thiserror::Error;

use crate::database::models::KycSummary;
use crate::database::StoreError;

pub use auth::{AuthError, AuthService, Claims};
pub use kyc::{KycService, StoredDocument};
pub use market::{BundledRates, MarketService, PriceHistory, TokenListing, TokenPrice};
pub use network::{CacheRefresh, ContractStatus, GasPrices, NetworkService};
pub use password::{hash_password, spawn_hash_password, spawn_verify_password, verify_password};
pub use quote::QuoteService;
pub use transactions::{CreateTransaction, TransactionDetail, TransactionPage, TransactionService};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input; the message is shown to the client.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("KYC verification required")]
    KycRequired(KycSummary),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
