//! Transaction repository.
//!
//! Uncached: status is written by the poller and read by clients concurrently.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use tracing::debug;

use crate::database::models::{NewTransaction, Transaction, TransactionStatus};
use crate::database::store::{StoreResult, TransactionStore};
use crate::database::Database;

pub struct TransactionRepository {
    db: Database,
    collection: Collection<Transaction>,
}

impl TransactionRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            collection: db.collection("transactions"),
        }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn insert(&self, tx: &NewTransaction) -> StoreResult<Transaction> {
        let id = self.db.next_id("transactions").await?;
        let stored = tx.clone().into_transaction(id, Utc::now());
        self.collection.insert_one(&stored).await?;
        debug!("Inserted transaction {} ({})", id, stored.tx_hash);
        Ok(stored)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Transaction>> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn page_by_sender(&self, sender: i64, limit: u32, offset: u64) -> StoreResult<Vec<Transaction>> {
        let cursor = self
            .collection
            .find(doc! { "sender": sender })
            .sort(doc! { "id": -1 })
            .skip(offset)
            .limit(i64::from(limit))
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_by_sender(&self, sender: i64) -> StoreResult<u64> {
        Ok(self.collection.count_documents(doc! { "sender": sender }).await?)
    }

    async fn set_status(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>> {
        let updated = self
            .collection
            .find_one_and_update(
                doc! {
                    "id": id,
                    "status": { "$nin": [TransactionStatus::Completed.as_str(), TransactionStatus::Failed.as_str()] },
                },
                doc! { "$set": { "status": status.as_str() } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn settle(&self, id: i64, status: TransactionStatus) -> StoreResult<Option<Transaction>> {
        let filter = doc! { "id": id, "status": TransactionStatus::Pending.as_str() };
        let updated = self
            .collection
            .find_one_and_update(filter, doc! { "$set": { "status": status.as_str() } })
            .return_document(ReturnDocument::After)
            .await?;
        debug!("Settle transaction {} as {}: {}", id, status, updated.is_some());
        Ok(updated)
    }

    async fn awaiting_confirmation(&self) -> StoreResult<Vec<Transaction>> {
        let cursor = self
            .collection
            .find(doc! { "status": TransactionStatus::Pending.as_str() })
            .sort(doc! { "id": 1 })
            .await?;
        let pending: Vec<Transaction> = cursor.try_collect().await?;
        Ok(pending.into_iter().filter(Transaction::awaits_confirmation).collect())
    }
}
