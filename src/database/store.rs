//! Storage traits implemented by the MongoDB repositories and the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::StoreError;
use super::models::{KycStatus, NewTransaction, NewUser, Transaction, TransactionStatus, User};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the email is taken.
    async fn create(&self, user: &NewUser) -> StoreResult<User>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &NewTransaction) -> StoreResult<Transaction>;

    async fn get(&self, id: i64) -> StoreResult<Option<Transaction>>;

    /// Newest first.
    async fn page_by_sender(&self, sender: i64, limit: u32, offset: u64) -> StoreResult<Vec<Transaction>>;

    async fn count_by_sender(&self, sender: i64) -> StoreResult<u64>;

    /// Set the status unless the transaction is already completed or failed.
    /// `None` if it does not exist or is finalized.
    async fn set_status(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>>;

    /// Move a `pending` transaction to `status`.
    /// `None` if it does not exist or has already left `pending`.
    async fn settle(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>>;

    /// Pending transactions that carry a real on-chain hash.
    async fn awaiting_confirmation(&self) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait KycStore: Send + Sync {
    async fn get(&self, user_id: i64) -> StoreResult<Option<KycStatus>>;

    /// Add a completed step (no-op if present), creating the record if needed.
    async fn add_step(&self, user_id: i64, step: &str) -> StoreResult<KycStatus>;

    async fn set_pending_verification(&self, user_id: i64, pending: bool) -> StoreResult<()>;

    /// Record a review outcome, creating the record if needed.
    async fn set_verified(&self, user_id: i64, verified: bool) -> StoreResult<KycStatus>;
}

/// The set of stores the services run against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub kyc: Arc<dyn KycStore>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
