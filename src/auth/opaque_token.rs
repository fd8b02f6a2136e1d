// Opaque bearer tokens (newsletter unsubscribe links) and their stored hashes

use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// SHA-256 of an opaque token (64-character hex string)
///
/// Only the hash is persisted; a leaked table cannot be replayed as links.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn from_token(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a hash read back from storage (64 hex characters)
    pub fn from_hash_string(hash_str: &str) -> Result<Self, String> {
        if hash_str.len() != 64 {
            return Err(format!("Invalid hash length: expected 64, got {}", hash_str.len()));
        }
        if !hash_str.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Invalid hash format: must be 64 hex characters".to_string());
        }
        Ok(Self(hash_str.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Freshly generated token; the plaintext only leaves the process in an email
pub struct OpaqueToken(Secret<String>);

impl OpaqueToken {
    /// 256 bits of randomness from two v4 UUIDs
    pub fn generate() -> Self {
        let raw = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self(Secret::new(raw))
    }

    pub fn hash(&self) -> TokenHash {
        TokenHash::from_token(self.0.expose_secret())
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueToken")
            .field("token", &"<REDACTED>")
            .finish()
    }
}
