//! In-memory application registry.

use async_trait::async_trait;
use dashmap::DashMap;
use graphiam_auth::AuthResult;
use graphiam_auth::storage::ApplicationStorage;
use graphiam_auth::types::Application;

use crate::{ScopedKey, scoped_key};

/// Applications keyed by tenant, realm and client id.
#[derive(Debug, Default)]
pub struct MemoryApplicationStorage {
    applications: DashMap<ScopedKey, Application>,
}

impl MemoryApplicationStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an application.
    pub fn insert(&self, application: Application) {
        let key = scoped_key(
            &application.tenant,
            &application.realm,
            &application.client_id,
        );
        self.applications.insert(key, application);
    }

    /// Removes an application. Returns `false` if it was not registered.
    pub fn remove(&self, tenant: &str, realm: &str, client_id: &str) -> bool {
        self.applications
            .remove(&scoped_key(tenant, realm, client_id))
            .is_some()
    }
}

#[async_trait]
impl ApplicationStorage for MemoryApplicationStorage {
    async fn get_by_client_id(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Option<Application>> {
        Ok(self
            .applications
            .get(&scoped_key(tenant, realm, client_id))
            .map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphiam_auth::types::GrantType;
    use tokio_test::block_on;

    #[test]
    fn test_application_lookup() {
        let store = MemoryApplicationStorage::new();
        store.insert(
            Application::public("acme", "staff", "portal").with_grant(GrantType::AuthorizationCode),
        );

        block_on(async {
            let found = store.get_by_client_id("acme", "staff", "portal").await.unwrap();
            assert!(found.unwrap().is_grant_allowed(GrantType::AuthorizationCode));
            assert!(store.get_by_client_id("acme", "other", "portal").await.unwrap().is_none());
        });

        assert!(store.remove("acme", "staff", "portal"));
        assert!(!store.remove("acme", "staff", "portal"));
        assert!(block_on(store.get_by_client_id("acme", "staff", "portal")).unwrap().is_none());
    }
}
