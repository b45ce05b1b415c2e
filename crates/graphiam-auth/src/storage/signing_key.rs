//! Signing key storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::SigningKey;

/// Storage trait for signing keys, scoped by tenant and realm.
#[async_trait]
pub trait SigningKeyStorage: Send + Sync {
    /// Stores a new key. Fails if the kid already exists.
    async fn create(&self, key: &SigningKey) -> AuthResult<()>;

    /// Finds a key by kid, whatever its state.
    async fn get(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<Option<SigningKey>>;

    /// Lists every key of the realm.
    async fn list(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>>;

    /// Lists keys with `active = true`.
    async fn list_active(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>>;

    /// Replaces a stored key. Returns `false` if it does not exist.
    ///
    /// Must not clear a `disabled` timestamp that is already stored.
    async fn update(&self, key: &SigningKey) -> AuthResult<bool>;

    /// Sets `active = false` and stamps `disabled = at` unless already
    /// stamped. Returns `false` if the key does not exist.
    async fn disable(
        &self,
        tenant: &str,
        realm: &str,
        kid: &str,
        at: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Deletes a key. Returns `true` if it existed.
    async fn delete(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<bool>;
}
