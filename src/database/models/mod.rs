//! Database model exports.

pub mod kyc;
pub mod transaction;
pub mod user;

pub use kyc::{KycStatus, KycStep, KycSummary};
pub use transaction::{
    is_chain_reference, NewTransaction, Transaction, TransactionStatus, DEFAULT_RECEIVE_TOKEN,
    PLACEHOLDER_HASH_PREFIX,
};
pub use user::{NewUser, PublicUser, User};
