//! Password hashing and verification.
//!
//! Secrets are hashed with Argon2id using a random per-hash salt and the
//! crate's default cost parameters. The resulting PHC string is the only form
//! of a password that ever reaches the database.

use std::sync::LazyLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

/// Hash a plaintext password.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Check a candidate password against a stored hash.
pub fn verify_password(stored_hash: &str, candidate: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| PasswordError::Hashing(e.to_string()))?;

    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(PasswordError::Mismatch),
        Err(e) => Err(PasswordError::Hashing(e.to_string())),
    }
}

/// Hash on the blocking pool so request workers are not stalled.
pub async fn hash_password_async(plaintext: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// Verify on the blocking pool.
pub async fn verify_password_async(
    stored_hash: String,
    candidate: String,
) -> Result<(), PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&stored_hash, &candidate))
        .await
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// Stand-in hash checked when a login names no account, computed once.
static UNKNOWN_ACCOUNT_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("no account has this password").ok());

/// Verify a candidate against the stand-in hash on the blocking pool.
///
/// Costs the same as [`verify_password_async`] so a login for an unknown
/// email takes as long as one with a wrong password. The outcome carries no
/// meaning beyond a `Hashing` error.
pub async fn verify_unknown_account_async(candidate: String) -> Result<(), PasswordError> {
    tokio::task::spawn_blocking(move || match UNKNOWN_ACCOUNT_HASH.as_deref() {
        Some(hash) => verify_password(hash, &candidate),
        None => Err(PasswordError::Hashing("stand-in hash unavailable".to_string())),
    })
    .await
    .map_err(|e| PasswordError::Hashing(e.to_string()))?
}

/// Errors that can occur while hashing or verifying a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// The candidate does not match the stored hash
    Mismatch,
    /// Hash computation failed or the stored hash is unreadable
    Hashing(String),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Mismatch => write!(f, "Password does not match"),
            PasswordError::Hashing(e) => write!(f, "Password hashing failed: {}", e),
        }
    }
}

impl std::error::Error for PasswordError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password(&hash, "correct horse battery staple").is_ok());
    }

    #[test]
    fn test_wrong_password_is_mismatch() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert_eq!(
            verify_password(&hash, "correct horse battery stapler"),
            Err(PasswordError::Mismatch)
        );
        assert_eq!(verify_password(&hash, ""), Err(PasswordError::Mismatch));
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hash = hash_password("hunter2").unwrap();
        assert!(!hash.contains("hunter2"));
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let first = hash_password("hunter2").unwrap();
        let second = hash_password("hunter2").unwrap();
        assert_ne!(first, second);
        assert!(verify_password(&first, "hunter2").is_ok());
        assert!(verify_password(&second, "hunter2").is_ok());
    }

    #[test]
    fn test_garbage_hash_is_hashing_error() {
        let result = verify_password("not-a-phc-string", "hunter2");
        assert!(matches!(result, Err(PasswordError::Hashing(_))));
    }

    #[tokio::test]
    async fn test_unknown_account_hash_runs_argon2() {
        let hash = UNKNOWN_ACCOUNT_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(
            verify_unknown_account_async("hunter2".to_string()).await,
            Err(PasswordError::Mismatch)
        );
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let hash = hash_password_async("s3cret".to_string()).await.unwrap();
        assert!(
            verify_password_async(hash.clone(), "s3cret".to_string())
                .await
                .is_ok()
        );
        assert_eq!(
            verify_password_async(hash, "S3cret".to_string()).await,
            Err(PasswordError::Mismatch)
        );
    }
}
