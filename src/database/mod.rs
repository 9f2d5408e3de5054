//! Database module exports.

mod error;
mod memory;
pub mod migrations;
pub mod models;
mod mongo;
mod repository;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use mongo::Database;
pub use repository::{KycRepository, TransactionRepository, UserRepository};
pub use store::{KycStore, StoreResult, Stores, TransactionStore, UserStore};
