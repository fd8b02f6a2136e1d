// Password hashing (argon2id) on the blocking pool

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::core::errors::AppError;

/// Hash `password` with a random salt, returning the PHC string
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password_sync(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Check `password` against a stored PHC string
///
/// A malformed stored hash counts as a mismatch so a corrupt row cannot be
/// used to distinguish accounts.
pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password_sync(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
}

fn hash_password_sync(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password_sync(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("engine123").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("engine123", &hash).await.unwrap());
        assert!(!verify_password("engine124", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let a = hash_password("engine123").await.unwrap();
        let b = hash_password("engine123").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_mismatch() {
        assert!(!verify_password("engine123", "not-a-phc-string").await.unwrap());
    }
}
