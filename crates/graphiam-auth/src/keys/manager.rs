//! Signing key manager.
//!
//! Owns the signing keys of every tenant/realm. Private key material is
//! loaded from storage only inside this module and never returned through
//! its signing or verification operations.
//!
//! Key selection for new signatures is deterministic: among keys that can
//! sign, the most recently created wins, ties broken by kid. Rotation is
//! additive, so tokens signed by the previous key keep verifying until that
//! key is disabled and its grace period has passed.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::config::SigningConfig;
use crate::storage::SigningKeyStorage;
use crate::token::jwt::{
    Claims, Jwk, Jwks, SigningAlgorithm, SigningKeyPair, token_kid, verify_token,
};
use crate::types::SigningKey;
use crate::{AuthError, AuthResult};

/// Manages signing keys per tenant/realm.
pub struct SigningKeyManager {
    storage: Arc<dyn SigningKeyStorage>,
    algorithm: SigningAlgorithm,
    grace: Duration,
}

impl SigningKeyManager {
    /// Creates a manager from the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for an unsupported algorithm.
    pub fn new(storage: Arc<dyn SigningKeyStorage>, config: &SigningConfig) -> AuthResult<Self> {
        Ok(Self {
            storage,
            algorithm: config.signing_algorithm()?,
            grace: config.verification_grace_period,
        })
    }

    /// Algorithm used for newly generated keys.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// How long a disabled key keeps verifying.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Returns the key to use for new signatures.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoActiveSigningKey` if no key can sign. A
    /// disabled key is never used as a fallback.
    pub async fn active_key(&self, tenant: &str, realm: &str) -> AuthResult<SigningKey> {
        let keys = self.storage.list_active(tenant, realm).await?;
        keys.into_iter()
            .filter(SigningKey::can_sign)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.kid.cmp(&b.kid))
            })
            .ok_or_else(|| AuthError::no_active_signing_key(tenant, realm))
    }

    /// Signs a claim set with the active key.
    ///
    /// Returns the compact JWS and the kid placed in its header.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NoActiveSigningKey` if no key can sign, or
    /// `AuthError::Internal` if the stored key material is unusable.
    pub async fn sign(
        &self,
        tenant: &str,
        realm: &str,
        claims: &Claims,
    ) -> AuthResult<(String, String)> {
        let key = self.active_key(tenant, realm).await?;
        let pair = SigningKeyPair::from_pkcs8_pem(
            key.kid.clone(),
            key.algorithm,
            &key.signing_key_material,
        )?;
        let token = pair.sign(claims)?;
        tracing::trace!(tenant, realm, kid = %key.kid, "claims signed");
        Ok((token, key.kid))
    }

    /// Verifies a token and returns its claims.
    ///
    /// The key is found by the token's `kid` whether or not it is still
    /// active, as long as it is not past its grace period.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` if the token is malformed, has no kid, or
    ///   its signature does not verify
    /// - `AuthError::UnknownSigningKey` if no stored key has the kid
    /// - `AuthError::SigningKeyRevoked` if the key was disabled longer ago
    ///   than the grace period
    /// - `AuthError::TokenExpired` if `exp` has passed
    pub async fn verify(&self, tenant: &str, realm: &str, token: &str) -> AuthResult<Claims> {
        let kid = token_kid(token)?
            .ok_or_else(|| AuthError::invalid_token("token header has no kid"))?;

        let Some(key) = self.storage.get(tenant, realm, &kid).await? else {
            tracing::warn!(tenant, realm, kid = %kid, "token signed by unknown key");
            return Err(AuthError::unknown_signing_key(kid));
        };

        if !key.can_verify_at(OffsetDateTime::now_utc(), self.grace) {
            tracing::warn!(tenant, realm, kid = %kid, "token signed by revoked key");
            return Err(AuthError::signing_key_revoked(kid));
        }

        let decoding_key = Jwk::from_json(&key.public_key_jwk)?.to_decoding_key()?;
        Ok(verify_token(token, key.algorithm, &decoding_key)?)
    }

    /// Creates a new active key. Existing keys stay active.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if key generation fails, or the storage
    /// error unchanged.
    pub async fn rotate(&self, tenant: &str, realm: &str) -> AuthResult<SigningKey> {
        let algorithm = self.algorithm;
        // RSA generation takes long enough to stall a runtime worker.
        let pair = tokio::task::spawn_blocking(move || SigningKeyPair::generate(algorithm))
            .await
            .map_err(|e| AuthError::internal(format!("key generation task failed: {e}")))??;

        let key = SigningKey::from_key_pair(tenant, realm, &pair)?;
        self.storage.create(&key).await?;

        tracing::info!(
            tenant,
            realm,
            kid = %key.kid,
            algorithm = %key.algorithm,
            "signing key created"
        );
        Ok(key)
    }

    /// Disables a key. It stops signing at once and stops verifying after
    /// the grace period. Disabling twice keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownSigningKey` if the key does not exist.
    pub async fn disable(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<()> {
        let disabled = self
            .storage
            .disable(tenant, realm, kid, OffsetDateTime::now_utc())
            .await?;
        if !disabled {
            return Err(AuthError::unknown_signing_key(kid));
        }
        tracing::info!(tenant, realm, kid, "signing key disabled");
        Ok(())
    }

    /// Returns the active key, creating one if the realm has none.
    ///
    /// Meant for provisioning. [`SigningKeyManager::sign`] never creates
    /// keys on its own.
    ///
    /// # Errors
    ///
    /// See [`SigningKeyManager::rotate`].
    pub async fn ensure_key(&self, tenant: &str, realm: &str) -> AuthResult<SigningKey> {
        match self.active_key(tenant, realm).await {
            Ok(key) => Ok(key),
            Err(AuthError::NoActiveSigningKey { .. }) => self.rotate(tenant, realm).await,
            Err(err) => Err(err),
        }
    }

    /// Lists every key of the realm, newest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn list(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>> {
        let mut keys = self.storage.list(tenant, realm).await?;
        keys.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.kid.cmp(&a.kid))
        });
        Ok(keys)
    }

    /// Public key set of every key that still verifies, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if a stored JWK is unreadable.
    pub async fn jwks(&self, tenant: &str, realm: &str) -> AuthResult<Jwks> {
        let now = OffsetDateTime::now_utc();
        let mut jwks = Jwks::new();
        for key in self.list(tenant, realm).await? {
            if key.can_verify_at(now, self.grace) {
                jwks.add_key(Jwk::from_json(&key.public_key_jwk)?);
            }
        }
        Ok(jwks)
    }

    /// Deletes a key that can no longer verify anything.
    ///
    /// Returns `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the key is active or still
    /// within its grace period.
    pub async fn delete_key(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<bool> {
        let Some(key) = self.storage.get(tenant, realm, kid).await? else {
            return Ok(false);
        };
        if key.can_verify_at(OffsetDateTime::now_utc(), self.grace) {
            return Err(AuthError::invalid_request(format!(
                "signing key '{kid}' can still verify tokens"
            )));
        }
        let deleted = self.storage.delete(tenant, realm, kid).await?;
        if deleted {
            tracing::info!(tenant, realm, kid, "signing key deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::RwLock;

    type Key = (String, String, String);

    #[derive(Default)]
    struct MockSigningKeyStorage {
        keys: RwLock<HashMap<Key, SigningKey>>,
    }

    fn key_id(tenant: &str, realm: &str, kid: &str) -> Key {
        (tenant.to_string(), realm.to_string(), kid.to_string())
    }

    #[async_trait]
    impl SigningKeyStorage for MockSigningKeyStorage {
        async fn create(&self, key: &SigningKey) -> AuthResult<()> {
            self.keys
                .write()
                .unwrap()
                .insert(key_id(&key.tenant, &key.realm, &key.kid), key.clone());
            Ok(())
        }

        async fn get(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<Option<SigningKey>> {
            Ok(self.keys.read().unwrap().get(&key_id(tenant, realm, kid)).cloned())
        }

        async fn list(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>> {
            Ok(self
                .keys
                .read()
                .unwrap()
                .values()
                .filter(|k| k.tenant == tenant && k.realm == realm)
                .cloned()
                .collect())
        }

        async fn list_active(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>> {
            let keys = self.list(tenant, realm).await?;
            Ok(keys.into_iter().filter(|k| k.active).collect())
        }

        async fn update(&self, key: &SigningKey) -> AuthResult<bool> {
            let mut keys = self.keys.write().unwrap();
            match keys.get_mut(&key_id(&key.tenant, &key.realm, &key.kid)) {
                Some(stored) => {
                    *stored = key.clone();
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn disable(
            &self,
            tenant: &str,
            realm: &str,
            kid: &str,
            at: OffsetDateTime,
        ) -> AuthResult<bool> {
            let mut keys = self.keys.write().unwrap();
            match keys.get_mut(&key_id(tenant, realm, kid)) {
                Some(stored) => {
                    stored.active = false;
                    stored.disabled.get_or_insert(at);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<bool> {
            Ok(self
                .keys
                .write()
                .unwrap()
                .remove(&key_id(tenant, realm, kid))
                .is_some())
        }
    }

    fn manager_with_grace(grace: Duration) -> SigningKeyManager {
        let config = SigningConfig {
            verification_grace_period: grace,
            ..SigningConfig::default()
        };
        SigningKeyManager::new(Arc::new(MockSigningKeyStorage::default()), &config).unwrap()
    }

    fn manager() -> SigningKeyManager {
        manager_with_grace(Duration::from_secs(3600))
    }

    fn claims() -> Claims {
        let mut claims = Claims::new();
        claims.insert("sub".into(), json!("u-alice"));
        claims.insert("roles".into(), json!(["admin"]));
        claims
    }

    #[tokio::test]
    async fn test_sign_without_key_fails() {
        let manager = manager();
        let err = manager.sign("acme", "staff", &claims()).await.unwrap_err();
        assert!(matches!(err, AuthError::NoActiveSigningKey { .. }));
    }

    #[tokio::test]
    async fn test_sign_verify_round_trip() {
        let manager = manager();
        let key = manager.rotate("acme", "staff").await.unwrap();

        let (token, kid) = manager.sign("acme", "staff", &claims()).await.unwrap();
        assert_eq!(kid, key.kid);
        assert_eq!(manager.verify("acme", "staff", &token).await.unwrap(), claims());
    }

    #[tokio::test]
    async fn test_rotation_is_additive() {
        let manager = manager();
        let old = manager.rotate("acme", "staff").await.unwrap();
        let (old_token, _) = manager.sign("acme", "staff", &claims()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let new = manager.rotate("acme", "staff").await.unwrap();
        assert_eq!(manager.active_key("acme", "staff").await.unwrap().kid, new.kid);

        // Both keys are still active and the old token still verifies.
        let listed = manager.list("acme", "staff").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|k| k.active));
        assert_eq!(listed[0].kid, new.kid);
        assert!(manager.verify("acme", "staff", &old_token).await.is_ok());

        manager.disable("acme", "staff", &new.kid).await.unwrap();
        assert_eq!(manager.active_key("acme", "staff").await.unwrap().kid, old.kid);

        manager.disable("acme", "staff", &old.kid).await.unwrap();
        let err = manager.active_key("acme", "staff").await.unwrap_err();
        assert!(matches!(err, AuthError::NoActiveSigningKey { .. }));
    }

    #[tokio::test]
    async fn test_disabled_key_verifies_within_grace() {
        let manager = manager();
        let key = manager.rotate("acme", "staff").await.unwrap();
        let (token, _) = manager.sign("acme", "staff", &claims()).await.unwrap();

        manager.disable("acme", "staff", &key.kid).await.unwrap();
        assert!(manager.verify("acme", "staff", &token).await.is_ok());
        assert!(manager.sign("acme", "staff", &claims()).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_key_past_grace_is_revoked() {
        let manager = manager_with_grace(Duration::ZERO);
        let key = manager.rotate("acme", "staff").await.unwrap();
        let (token, _) = manager.sign("acme", "staff", &claims()).await.unwrap();

        manager.disable("acme", "staff", &key.kid).await.unwrap();
        let err = manager.verify("acme", "staff", &token).await.unwrap_err();
        assert!(matches!(err, AuthError::SigningKeyRevoked { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let manager = manager();
        manager.rotate("acme", "staff").await.unwrap();
        manager.rotate("acme", "patients").await.unwrap();
        let (token, _) = manager.sign("acme", "patients", &claims()).await.unwrap();

        let err = manager.verify("acme", "staff", &token).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownSigningKey { .. }));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let manager = manager();
        manager.rotate("acme", "staff").await.unwrap();
        let err = manager.verify("acme", "staff", "not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_tampered_token() {
        let manager = manager();
        manager.rotate("acme", "staff").await.unwrap();
        let (token, _) = manager.sign("acme", "staff", &claims()).await.unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = {
            use base64::Engine;
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"sub":"mallory"}"#)
        };
        parts[1] = &forged;
        let err = manager
            .verify("acme", "staff", &parts.join("."))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_disable_unknown_key() {
        let manager = manager();
        let err = manager.disable("acme", "staff", "missing").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownSigningKey { .. }));
    }

    #[tokio::test]
    async fn test_ensure_key_is_idempotent() {
        let manager = manager();
        let first = manager.ensure_key("acme", "staff").await.unwrap();
        let second = manager.ensure_key("acme", "staff").await.unwrap();
        assert_eq!(first.kid, second.kid);
        assert_eq!(manager.list("acme", "staff").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jwks_and_delete() {
        let manager = manager_with_grace(Duration::ZERO);
        let retired = manager.rotate("acme", "staff").await.unwrap();
        let current = manager.rotate("acme", "staff").await.unwrap();

        let err = manager
            .delete_key("acme", "staff", &retired.kid)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));

        manager.disable("acme", "staff", &retired.kid).await.unwrap();
        let jwks = manager.jwks("acme", "staff").await.unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert!(jwks.find(&current.kid).is_some());
        assert!(jwks.find(&retired.kid).is_none());

        assert!(manager.delete_key("acme", "staff", &retired.kid).await.unwrap());
        assert!(!manager.delete_key("acme", "staff", &retired.kid).await.unwrap());
    }
}
