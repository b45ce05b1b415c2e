//! In-memory signing key storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use graphiam_auth::storage::SigningKeyStorage;
use graphiam_auth::types::SigningKey;
use graphiam_auth::{AuthError, AuthResult};
use time::OffsetDateTime;

use crate::{ScopedKey, scoped_key};

/// Signing keys keyed by tenant, realm and kid.
///
/// A stored `disabled` timestamp survives every later write.
#[derive(Debug, Default)]
pub struct MemorySigningKeyStorage {
    keys: DashMap<ScopedKey, SigningKey>,
}

impl MemorySigningKeyStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn scoped(&self, tenant: &str, realm: &str, pred: impl Fn(&SigningKey) -> bool) -> Vec<SigningKey> {
        self.keys
            .iter()
            .filter(|e| e.tenant == tenant && e.realm == realm && pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }
}

#[async_trait]
impl SigningKeyStorage for MemorySigningKeyStorage {
    async fn create(&self, key: &SigningKey) -> AuthResult<()> {
        match self.keys.entry(scoped_key(&key.tenant, &key.realm, &key.kid)) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "signing key {} already exists",
                key.kid
            ))),
            Entry::Vacant(entry) => {
                entry.insert(key.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<Option<SigningKey>> {
        Ok(self
            .keys
            .get(&scoped_key(tenant, realm, kid))
            .map(|e| e.value().clone()))
    }

    async fn list(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>> {
        Ok(self.scoped(tenant, realm, |_| true))
    }

    async fn list_active(&self, tenant: &str, realm: &str) -> AuthResult<Vec<SigningKey>> {
        Ok(self.scoped(tenant, realm, |k| k.active))
    }

    async fn update(&self, key: &SigningKey) -> AuthResult<bool> {
        Ok(
            match self.keys.get_mut(&scoped_key(&key.tenant, &key.realm, &key.kid)) {
                Some(mut stored) => {
                    let disabled = stored.disabled.or(key.disabled);
                    *stored = key.clone();
                    stored.disabled = disabled;
                    if disabled.is_some() {
                        stored.active = false;
                    }
                    true
                }
                None => false,
            },
        )
    }

    async fn disable(
        &self,
        tenant: &str,
        realm: &str,
        kid: &str,
        at: OffsetDateTime,
    ) -> AuthResult<bool> {
        Ok(match self.keys.get_mut(&scoped_key(tenant, realm, kid)) {
            Some(mut stored) => {
                stored.active = false;
                stored.disabled.get_or_insert(at);
                true
            }
            None => false,
        })
    }

    async fn delete(&self, tenant: &str, realm: &str, kid: &str) -> AuthResult<bool> {
        Ok(self.keys.remove(&scoped_key(tenant, realm, kid)).is_some())
    }
}
