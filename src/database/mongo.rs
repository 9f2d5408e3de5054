//! MongoDB database wrapper.

use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection};
use tracing::info;

use super::error::StoreError;

/// Collection holding per-entity sequence counters.
const COUNTERS: &str = "counters";

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server does not answer a ping.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some("remitd".to_string());
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    /// Shut the client down, waiting for in-flight operations.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &mongodb::Database {
        &self.db
    }

    /// Get a typed collection from the database.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    /// Allocate the next sequential id for `counter`, starting at 1.
    pub async fn next_id(&self, counter: &str) -> Result<i64, StoreError> {
        let counters: Collection<Document> = self.collection(COUNTERS);
        let updated = counters
            .find_one_and_update(doc! { "_id": counter }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        updated
            .and_then(|d| d.get_i64("seq").ok())
            .ok_or_else(|| StoreError::Backend(format!("counter {counter} returned no sequence")))
    }
}
