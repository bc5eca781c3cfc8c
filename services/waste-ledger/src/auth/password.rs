//! Password hashing and verification using Argon2id.
//!
//! Hashes are PHC strings, so the salt and parameters travel with the hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use tracing::warn;

use crate::errors::{LedgerServiceError, Result};

lazy_static! {
    /// Verified against when a login names an unknown user, so both paths cost the same.
    static ref DUMMY_HASH: Option<String> = hash_password("not-a-real-password").ok();
}

/// Hash a password with a freshly generated salt.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(LedgerServiceError::Validation(
            "password must not be empty".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerServiceError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored hash.
///
/// A stored hash that cannot be parsed counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn the same effort as a real verification and report a mismatch.
pub fn verify_against_dummy(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}
