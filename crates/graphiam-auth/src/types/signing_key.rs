//! Stored signing keys.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::token::jwt::{JwtError, SigningAlgorithm, SigningKeyPair};

/// Key family of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyImplementation {
    /// RSA (RS256, RS384).
    Rsa,
    /// ECDSA (ES384).
    Ecdsa,
}

impl From<SigningAlgorithm> for KeyImplementation {
    fn from(algorithm: SigningAlgorithm) -> Self {
        if algorithm.is_rsa() { Self::Rsa } else { Self::Ecdsa }
    }
}

/// A signing key of a tenant/realm.
///
/// `disabled` is monotonic: once stamped it is never cleared. A disabled key
/// keeps verifying for the configured grace period and never signs again.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Key id, carried in the `kid` header of every token it signs.
    pub kid: String,

    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// Eligible for new signatures.
    pub active: bool,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Key family.
    pub implementation: KeyImplementation,

    /// PKCS#8 PEM private key. Never leaves the key manager.
    pub signing_key_material: String,

    /// Public key as a JWK JSON document.
    pub public_key_jwk: String,

    /// When the key was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the key was disabled.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub disabled: Option<OffsetDateTime>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("tenant", &self.tenant)
            .field("realm", &self.realm)
            .field("active", &self.active)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Builds a stored key from freshly generated key material.
    ///
    /// # Errors
    /// Returns an error if the public JWK cannot be serialized.
    pub fn from_key_pair(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        pair: &SigningKeyPair,
    ) -> Result<Self, JwtError> {
        let jwk = serde_json::to_string(&pair.to_jwk())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        Ok(Self {
            kid: pair.kid.clone(),
            tenant: tenant.into(),
            realm: realm.into(),
            active: true,
            algorithm: pair.algorithm,
            implementation: pair.algorithm.into(),
            signing_key_material: pair.private_key_pem().to_string(),
            public_key_jwk: jwk,
            created_at: OffsetDateTime::now_utc(),
            disabled: None,
        })
    }

    /// Returns `true` if the key may produce new signatures.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.active && self.disabled.is_none()
    }

    /// Returns `true` if tokens signed by this key still verify at `now`.
    #[must_use]
    pub fn can_verify_at(&self, now: OffsetDateTime, grace: Duration) -> bool {
        match self.disabled {
            None => true,
            Some(disabled) => time::Duration::try_from(grace)
                .ok()
                .and_then(|grace| disabled.checked_add(grace))
                .is_none_or(|until| now < until),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_key() -> SigningKey {
        let pair = SigningKeyPair::generate_ec().unwrap();
        SigningKey::from_key_pair("acme", "staff", &pair).unwrap()
    }

    #[test]
    fn test_from_key_pair() {
        let key = create_test_key();
        assert!(key.can_sign());
        assert_eq!(key.implementation, KeyImplementation::Ecdsa);
        assert!(key.signing_key_material.contains("PRIVATE KEY"));
        assert!(key.public_key_jwk.contains(&key.kid));
        assert!(!key.public_key_jwk.contains("PRIVATE"));
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = create_test_key();
        let debug = format!("{key:?}");
        assert!(debug.contains(&key.kid));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_grace_period() {
        let mut key = create_test_key();
        let now = OffsetDateTime::now_utc();
        let grace = Duration::from_secs(3600);
        assert!(key.can_verify_at(now, grace));

        key.active = false;
        key.disabled = Some(now);
        assert!(!key.can_sign());
        assert!(key.can_verify_at(now + time::Duration::minutes(30), grace));
        assert!(!key.can_verify_at(now + time::Duration::hours(2), grace));
        assert!(!key.can_verify_at(now, Duration::ZERO));
        assert!(key.can_verify_at(now, Duration::MAX));
    }
}
