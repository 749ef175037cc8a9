//! API key generation, prefix handling, and hashing.
//!
//! Raw keys have the form `sk_<type>_<random>`. Only the first ten characters
//! (the public prefix) and an Argon2id hash of the full key are persisted;
//! verification fetches all candidates sharing the prefix and compares the
//! raw key against each hash.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

/// Length of the stored public key prefix.
pub const KEY_PREFIX_LEN: usize = 10;

/// Length of the random suffix in a generated key.
const KEY_RANDOM_LEN: usize = 24;

/// Error type for key hashing operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to hash key: {0}")]
    Hash(String),
}

/// Generates a new raw API key of the form `sk_<type>_<random>`.
pub fn generate_key(key_type: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("sk_{}_{}", key_type, suffix)
}

/// Returns the public prefix of a raw key used for candidate lookup.
pub fn key_prefix(raw_key: &str) -> &str {
    match raw_key.char_indices().nth(KEY_PREFIX_LEN) {
        Some((idx, _)) => &raw_key[..idx],
        None => raw_key,
    }
}

/// Hashes a raw API key with Argon2id for storage.
pub fn hash_key(raw_key: &str) -> Result<String, KeyError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(raw_key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| KeyError::Hash(e.to_string()))
}

/// Verifies a raw key against a stored hash in constant time.
///
/// Malformed stored hashes verify as false rather than erroring, so a single
/// corrupt row cannot break authentication for its prefix group.
pub fn verify_key(raw_key: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw_key.as_bytes(), &parsed)
        .is_ok()
}
