//! In-memory store.
//!
//! Backs `DATABASE_BACKEND=memory` and the test suite. Same semantics as the
//! MongoDB repositories; nothing survives a restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::StoreError;
use super::models::{KycStatus, NewTransaction, NewUser, Transaction, TransactionStatus, User};
use super::store::{KycStore, StoreResult, Stores, TransactionStore, UserStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<i64, User>,
    /// lowercase email -> user id
    emails: DashMap<String, i64>,
    transactions: DashMap<i64, Transaction>,
    kyc: DashMap<i64, KycStatus>,
    user_seq: AtomicI64,
    tx_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap one shared instance as all three stores.
    pub fn into_stores(self) -> Stores {
        let store = Arc::new(self);
        Stores {
            users: store.clone(),
            transactions: store.clone(),
            kyc: store,
        }
    }
}

impl Stores {
    /// Fresh, empty in-memory stores.
    pub fn memory() -> Self {
        MemoryStore::new().into_stores()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: &NewUser) -> StoreResult<User> {
        let email = user.email.to_lowercase();
        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("email {email}"))),
            Entry::Vacant(slot) => {
                let id = self.user_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let created = User {
                    id,
                    username: user.username.clone(),
                    email,
                    password_hash: user.password_hash.clone(),
                    created_at: Utc::now(),
                };
                slot.insert(id);
                self.users.insert(id, created.clone());
                Ok(created)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let Some(id) = self.emails.get(&email.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert(&self, tx: &NewTransaction) -> StoreResult<Transaction> {
        let id = self.tx_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = tx.clone().into_transaction(id, Utc::now());
        self.transactions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn page_by_sender(&self, sender: i64, limit: u32, offset: u64) -> StoreResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.sender == sender)
            .map(|t| t.clone())
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_by_sender(&self, sender: i64) -> StoreResult<u64> {
        Ok(self.transactions.iter().filter(|t| t.sender == sender).count() as u64)
    }

    async fn set_status(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>> {
        let Some(mut t) = self.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if t.status.is_terminal() {
            return Ok(None);
        }
        t.status = status;
        Ok(Some(t.clone()))
    }

    async fn settle(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>> {
        let Some(mut t) = self.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if t.status != TransactionStatus::Pending {
            return Ok(None);
        }
        t.status = status;
        Ok(Some(t.clone()))
    }

    async fn awaiting_confirmation(&self) -> StoreResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.awaits_confirmation())
            .map(|t| t.clone())
            .collect();
        rows.sort_by_key(|t| t.id);
        Ok(rows)
    }
}

#[async_trait]
impl KycStore for MemoryStore {
    async fn get(&self, user_id: i64) -> StoreResult<Option<KycStatus>> {
        Ok(self.kyc.get(&user_id).map(|k| k.clone()))
    }

    async fn add_step(&self, user_id: i64, step: &str) -> StoreResult<KycStatus> {
        let mut record = self.kyc.entry(user_id).or_insert_with(|| KycStatus::new(user_id));
        if !record.completed_steps.iter().any(|s| s == step) {
            record.completed_steps.push(step.to_string());
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn set_pending_verification(&self, user_id: i64, pending: bool) -> StoreResult<()> {
        let mut record = self.kyc.entry(user_id).or_insert_with(|| KycStatus::new(user_id));
        record.pending_verification = pending;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_verified(&self, user_id: i64, verified: bool) -> StoreResult<KycStatus> {
        let mut record = self.kyc.entry(user_id).or_insert_with(|| KycStatus::new(user_id));
        record.verified = verified;
        if verified {
            record.pending_verification = false;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
