//! Raw secret generation and hashing.
//!
//! Session handles, authorization codes, access tokens and refresh tokens are
//! handed to clients in raw form and persisted only as SHA-256 digests. Every
//! lookup hashes the presented value first, so a copy of the store never
//! yields a usable secret.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generates a cryptographically secure random secret.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes a raw secret with SHA-256, hex encoded.
///
/// Used both when storing a new secret and when looking one up.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short prefix of a hash, safe to put in logs.
#[must_use]
pub fn hash_prefix(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret() {
        let hash = hash_secret("test-token-value");

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_secret("test-token-value"));
        assert_ne!(hash, hash_secret("other-token-value"));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_hash_prefix() {
        let hash = hash_secret("x");
        assert_eq!(hash_prefix(&hash).len(), 8);
        assert_eq!(hash_prefix("abc"), "abc");
    }
}
