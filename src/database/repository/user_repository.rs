//! User repository with cache-first lookups.
//!
//! Dual-index caching:
//! - By user ID (primary)
//! - By email (login lookups)

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Collection;
use tracing::debug;

use crate::cache::{CacheConfig, TypedCache};
use crate::database::error::StoreError;
use crate::database::models::{NewUser, User};
use crate::database::store::{StoreResult, UserStore};
use crate::database::Database;

pub struct UserRepository {
    db: Database,
    collection: Collection<User>,
    cache_by_id: TypedCache<i64, User>,
    cache_by_email: TypedCache<String, i64>, // email (lowercase) -> user_id
}

impl UserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            collection: db.collection("users"),
            cache_by_id: TypedCache::new("users_by_id", CacheConfig::accounts()),
            cache_by_email: TypedCache::new("users_by_email", CacheConfig::accounts()),
        }
    }

    fn remember(&self, user: &User) {
        self.cache_by_id.insert(user.id, user.clone());
        self.cache_by_email.insert(user.email.clone(), user.id);
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, user: &NewUser) -> StoreResult<User> {
        let email = user.email.to_lowercase();
        if self.find_by_email(&email).await?.is_some() {
            return Err(StoreError::Duplicate(format!("email {email}")));
        }

        let created = User {
            id: self.db.next_id("users").await?,
            username: user.username.clone(),
            email,
            password_hash: user.password_hash.clone(),
            created_at: Utc::now(),
        };

        // The unique index on email settles concurrent registrations.
        self.collection.insert_one(&created).await?;
        self.remember(&created);

        debug!("Created user {} <{}>", created.id, created.email);
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();

        if let Some(user_id) = self.cache_by_email.get(&email)
            && let Some(user) = self.cache_by_id.get(&user_id)
        {
            return Ok(Some(user));
        }

        let result = self.collection.find_one(doc! { "email": &email }).await?;
        if let Some(user) = &result {
            self.remember(user);
        }
        Ok(result)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        if let Some(user) = self.cache_by_id.get(&id) {
            return Ok(Some(user));
        }

        let result = self.collection.find_one(doc! { "id": id }).await?;
        if let Some(user) = &result {
            self.remember(user);
        }
        Ok(result)
    }
}
