//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! Stored form: `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>`.

use std::num::NonZeroU32;

use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use tokio::task;

use super::AuthError;

const SCHEME: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = digest::SHA256_OUTPUT_LEN;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| AuthError::Hashing)?;

    let iterations = NonZeroU32::new(ITERATIONS).ok_or(AuthError::Hashing)?;
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(ALGORITHM, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{SCHEME}${ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Constant-time check of `password` against a stored hash.
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(ALGORITHM, iterations, &salt, password.as_bytes(), &hash).is_ok()
}

/// `hash_password` on the blocking pool, so key derivation does not stall
/// the request workers.
pub async fn spawn_hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|_| AuthError::Hashing)?
}

/// `verify_password` on the blocking pool.
pub async fn spawn_verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let (password, stored) = (password.to_string(), stored.to_string());
    task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|_| AuthError::Hashing)
}
