//! KYC status repository.
//!
//! Step additions use `$addToSet` so concurrent completions never drop a step.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use tracing::debug;

use crate::database::error::StoreError;
use crate::database::models::KycStatus;
use crate::database::store::{KycStore, StoreResult};
use crate::database::Database;

pub struct KycRepository {
    collection: Collection<KycStatus>,
}

impl KycRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("kyc_status"),
        }
    }

    /// Upsert `update` for `user_id` and return the resulting record.
    async fn upsert(&self, user_id: i64, update: Document) -> StoreResult<KycStatus> {
        self.collection
            .find_one_and_update(doc! { "user_id": user_id }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("kyc upsert for user {user_id} returned nothing")))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl KycStore for KycRepository {
    async fn get(&self, user_id: i64) -> StoreResult<Option<KycStatus>> {
        Ok(self.collection.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn add_step(&self, user_id: i64, step: &str) -> StoreResult<KycStatus> {
        let update = doc! {
            "$addToSet": { "completed_steps": step },
            "$set": { "updated_at": now() },
            "$setOnInsert": { "verified": false, "pending_verification": false },
        };
        let status = self.upsert(user_id, update).await?;
        debug!("KYC step {} recorded for user {}", step, user_id);
        Ok(status)
    }

    async fn set_pending_verification(&self, user_id: i64, pending: bool) -> StoreResult<()> {
        let update = doc! {
            "$set": { "pending_verification": pending, "updated_at": now() },
            "$setOnInsert": { "verified": false, "completed_steps": [] },
        };
        self.upsert(user_id, update).await?;
        Ok(())
    }

    async fn set_verified(&self, user_id: i64, verified: bool) -> StoreResult<KycStatus> {
        let mut set = doc! { "verified": verified, "updated_at": now() };
        if verified {
            set.insert("pending_verification", false);
        }
        let update = doc! {
            "$set": set,
            "$setOnInsert": { "completed_steps": [] },
        };
        self.upsert(user_id, update).await
    }
}
