//! Account registration, login and bearer tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::password::{spawn_hash_password, spawn_verify_password};
use super::ServiceError;
use crate::database::models::{NewUser, PublicUser, User};
use crate::database::{StoreError, UserStore};
use crate::retry::{execute_with_retry, RetryPolicy};

/// Token lifetime.
pub const TOKEN_TTL_DAYS: i64 = 7;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token, authorization denied")]
    MissingToken,

    #[error("Token is not valid")]
    InvalidToken,

    #[error("password hashing failed")]
    Hashing,

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    retry: RetryPolicy,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: &str, retry: RetryPolicy) -> Self {
        Self {
            users,
            encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
            retry,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ServiceError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(ServiceError::validation("All fields are required"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(
                "Password must be at least 6 characters long",
            ));
        }

        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::validation("Email already in use"));
        }

        let new_user = NewUser {
            username: username.to_string(),
            email,
            password_hash: spawn_hash_password(password).await?,
        };

        let users = self.users.clone();
        let created = execute_with_retry("users.create", &self.retry, || {
            let users = users.clone();
            let new_user = new_user.clone();
            async move { users.create(&new_user).await }
        })
        .await;

        match created {
            Ok(user) => {
                info!("Registered user {} ({})", user.id, user.email);
                Ok(PublicUser::from(&user))
            }
            // Lost a race with a concurrent registration.
            Err(StoreError::Duplicate(_)) => Err(ServiceError::validation("Email already in use")),
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and issue a token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, PublicUser), ServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(ServiceError::validation("Email and password are required"));
        }

        let Some(user) = self.find_by_email(&email).await? else {
            debug!("Login for unknown email {}", email);
            return Err(ServiceError::InvalidCredentials);
        };
        if !spawn_verify_password(password, &user.password_hash).await? {
            debug!("Wrong password for user {}", user.id);
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        Ok((token, PublicUser::from(&user)))
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected token: {}", e);
                AuthError::InvalidToken
            })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.clone();
        execute_with_retry("users.find_by_email", &self.retry, || {
            let users = users.clone();
            let email = email.to_string();
            async move { users.find_by_email(&email).await }
        })
        .await
    }
}
