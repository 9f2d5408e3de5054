//! MongoDB-backed store implementations.

mod kyc_repository;
mod transaction_repository;
mod user_repository;

use std::sync::Arc;

pub use kyc_repository::KycRepository;
pub use transaction_repository::TransactionRepository;
pub use user_repository::UserRepository;

use super::store::Stores;
use super::Database;

impl Stores {
    /// Build the repositories over a connected database.
    pub fn mongo(db: &Database) -> Self {
        Self {
            users: Arc::new(UserRepository::new(db)),
            transactions: Arc::new(TransactionRepository::new(db)),
            kyc: Arc::new(KycRepository::new(db)),
        }
    }
}
