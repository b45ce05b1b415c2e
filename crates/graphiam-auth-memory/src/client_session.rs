//! In-memory client session storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use graphiam_auth::storage::ClientSessionStorage;
use graphiam_auth::types::ClientSession;
use graphiam_auth::{AuthError, AuthResult};
use time::OffsetDateTime;

use crate::{ScopedKey, scoped_key};

/// Client sessions keyed by tenant, realm and client session id.
///
/// Hash lookups scan the map. Conditional updates and deletes run under
/// the entry's shard lock.
#[derive(Debug, Default)]
pub struct MemoryClientSessionStorage {
    sessions: DashMap<ScopedKey, ClientSession>,
}

impl MemoryClientSessionStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored client sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Every stored client session, ordered by id.
    pub fn snapshot(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| a.client_session_id.cmp(&b.client_session_id));
        sessions
    }

    fn find(
        &self,
        tenant: &str,
        realm: &str,
        pred: impl Fn(&ClientSession) -> bool,
    ) -> Option<ClientSession> {
        self.sessions
            .iter()
            .find(|e| e.tenant == tenant && e.realm == realm && pred(e.value()))
            .map(|e| e.value().clone())
    }

    fn filter(
        &self,
        tenant: &str,
        realm: &str,
        pred: impl Fn(&ClientSession) -> bool,
    ) -> Vec<ClientSession> {
        self.sessions
            .iter()
            .filter(|e| e.tenant == tenant && e.realm == realm && pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }
}

fn key_of(session: &ClientSession) -> ScopedKey {
    scoped_key(&session.tenant, &session.realm, &session.client_session_id)
}

#[async_trait]
impl ClientSessionStorage for MemoryClientSessionStorage {
    async fn create(&self, session: &ClientSession) -> AuthResult<()> {
        match self.sessions.entry(key_of(session)) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "client session {} already exists",
                session.client_session_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn get_by_id(
        &self,
        tenant: &str,
        realm: &str,
        client_session_id: &str,
    ) -> AuthResult<Option<ClientSession>> {
        Ok(self
            .sessions
            .get(&scoped_key(tenant, realm, client_session_id))
            .map(|e| e.value().clone()))
    }

    async fn get_by_access_token_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>> {
        Ok(self.find(tenant, realm, |s| s.access_token_hash.as_deref() == Some(hash)))
    }

    async fn get_by_refresh_token_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>> {
        Ok(self.find(tenant, realm, |s| s.refresh_token_hash.as_deref() == Some(hash)))
    }

    async fn get_by_auth_code_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>> {
        Ok(self.find(tenant, realm, |s| s.auth_code_hash.as_deref() == Some(hash)))
    }

    async fn list_by_client(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Vec<ClientSession>> {
        Ok(self.filter(tenant, realm, |s| s.client_id == client_id))
    }

    async fn list_by_user(
        &self,
        tenant: &str,
        realm: &str,
        user_id: &str,
    ) -> AuthResult<Vec<ClientSession>> {
        Ok(self.filter(tenant, realm, |s| s.user_id == user_id))
    }

    async fn update(&self, session: &ClientSession) -> AuthResult<bool> {
        Ok(match self.sessions.get_mut(&key_of(session)) {
            Some(mut stored) => {
                *stored = session.clone();
                true
            }
            None => false,
        })
    }

    async fn update_if_auth_code_matches(
        &self,
        session: &ClientSession,
        expected_auth_code_hash: &str,
    ) -> AuthResult<bool> {
        Ok(match self.sessions.get_mut(&key_of(session)) {
            Some(mut stored)
                if stored.auth_code_hash.as_deref() == Some(expected_auth_code_hash) =>
            {
                *stored = session.clone();
                true
            }
            _ => false,
        })
    }

    async fn delete(
        &self,
        tenant: &str,
        realm: &str,
        client_session_id: &str,
    ) -> AuthResult<bool> {
        Ok(self
            .sessions
            .remove(&scoped_key(tenant, realm, client_session_id))
            .is_some())
    }

    async fn delete_expired(
        &self,
        tenant: &str,
        realm: &str,
        now: OffsetDateTime,
    ) -> AuthResult<u64> {
        let candidates: Vec<ScopedKey> = self
            .filter(tenant, realm, |s| s.is_expired_at(now))
            .iter()
            .map(key_of)
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
        if deleted > 0 {
            tracing::debug!(tenant, realm, deleted, "expired client sessions removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphiam_auth::types::GrantType;

    fn code_session(hash: &str) -> ClientSession {
        let mut session = ClientSession::new(
            "acme",
            "staff",
            "app",
            "u1",
            GrantType::AuthorizationCode,
            OffsetDateTime::now_utc() + time::Duration::minutes(5),
        );
        session.auth_code_hash = Some(hash.to_string());
        session
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = MemoryClientSessionStorage::new();
        let session = code_session("c1");
        store.create(&session).await.unwrap();
        assert!(matches!(
            store.create(&session).await,
            Err(AuthError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_conditional_code_swap() {
        let store = MemoryClientSessionStorage::new();
        let session = code_session("c1");
        store.create(&session).await.unwrap();

        let mut exchanged = session.clone();
        exchanged.auth_code_hash = None;
        exchanged.access_token_hash = Some("a1".into());

        assert!(store.update_if_auth_code_matches(&exchanged, "c1").await.unwrap());
        assert!(!store.update_if_auth_code_matches(&exchanged, "c1").await.unwrap());

        assert!(store.get_by_auth_code_hash("acme", "staff", "c1").await.unwrap().is_none());
        let found = store
            .get_by_access_token_hash("acme", "staff", "a1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.client_session_id, session.client_session_id);
    }

    #[tokio::test]
    async fn test_update_and_delete_affect_one_record() {
        let store = MemoryClientSessionStorage::new();
        let session = code_session("c1");
        assert!(!store.update(&session).await.unwrap());
        store.create(&session).await.unwrap();
        store.create(&code_session("c2")).await.unwrap();

        assert!(store.update(&session).await.unwrap());
        assert!(store.delete("acme", "staff", &session.client_session_id).await.unwrap());
        assert!(!store.delete("acme", "staff", &session.client_session_id).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookups_are_realm_scoped() {
        let store = MemoryClientSessionStorage::new();
        store.create(&code_session("c1")).await.unwrap();
        assert!(store.get_by_auth_code_hash("acme", "other", "c1").await.unwrap().is_none());
        assert!(store.list_by_client("acme", "other", "app").await.unwrap().is_empty());
        assert_eq!(store.list_by_user("acme", "staff", "u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_expired_is_idempotent() {
        let store = MemoryClientSessionStorage::new();
        let mut expired = code_session("c1");
        expired.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        store.create(&expired).await.unwrap();
        store.create(&code_session("c2")).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert_eq!(store.delete_expired("acme", "staff", now).await.unwrap(), 1);
        assert_eq!(store.delete_expired("acme", "staff", now).await.unwrap(), 0);
    }
}
