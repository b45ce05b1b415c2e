//! In-memory auth session storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use graphiam_auth::storage::AuthSessionStorage;
use graphiam_auth::types::AuthSession;
use graphiam_auth::{AuthError, AuthResult};
use time::OffsetDateTime;

use crate::{ScopedKey, scoped_key};

/// Auth sessions keyed by tenant, realm and run id.
///
/// The version check and the write happen under the entry's shard lock, so
/// two saves of the same version cannot both succeed.
#[derive(Debug, Default)]
pub struct MemoryAuthSessionStorage {
    sessions: DashMap<ScopedKey, AuthSession>,
}

impl MemoryAuthSessionStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl AuthSessionStorage for MemoryAuthSessionStorage {
    async fn create_or_update(
        &self,
        session: &AuthSession,
        expected_version: Option<u64>,
    ) -> AuthResult<()> {
        let key = scoped_key(&session.tenant, &session.realm, &session.run_id);
        match self.sessions.entry(key) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get().version;
                if expected_version != Some(stored) {
                    return Err(AuthError::session_conflict(format!(
                        "auth session {} is at version {stored}",
                        session.run_id
                    )));
                }
                entry.insert(session.clone());
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    return Err(AuthError::session_conflict(format!(
                        "auth session {} no longer exists",
                        session.run_id
                    )));
                }
                entry.insert(session.clone());
            }
        }
        Ok(())
    }

    async fn get_by_hash(
        &self,
        tenant: &str,
        realm: &str,
        session_id_hash: &str,
    ) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .sessions
            .iter()
            .find(|e| e.is_scoped_to(tenant, realm) && e.session_id_hash == session_id_hash)
            .map(|e| e.value().clone()))
    }

    async fn get_by_run_id(
        &self,
        tenant: &str,
        realm: &str,
        run_id: &str,
    ) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .sessions
            .get(&scoped_key(tenant, realm, run_id))
            .map(|e| e.value().clone()))
    }

    async fn list_all(&self, tenant: &str) -> AuthResult<Vec<AuthSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|e| e.tenant == tenant)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn delete(&self, tenant: &str, realm: &str, run_id: &str) -> AuthResult<bool> {
        Ok(self
            .sessions
            .remove(&scoped_key(tenant, realm, run_id))
            .is_some())
    }

    async fn delete_expired(
        &self,
        tenant: &str,
        realm: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let candidates: Vec<ScopedKey> = self
            .sessions
            .iter()
            .filter(|e| e.is_scoped_to(tenant, realm) && e.is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();

        let mut deleted = 0;
        for key in candidates {
            if self
                .sessions
                .remove_if(&key, |_, s| s.is_expired_at(now))
                .is_some()
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
