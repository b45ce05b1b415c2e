//! In-memory flow and user storage.

use async_trait::async_trait;
use dashmap::DashMap;
use graphiam_auth::AuthResult;
use graphiam_auth::flow::FlowDocument;
use graphiam_auth::storage::{FlowDefinitionStorage, UserStorage};
use graphiam_auth::types::{Flow, User};

use crate::{ScopedKey, scoped_key};

/// Flows keyed by tenant, realm and flow id.
#[derive(Debug, Default)]
pub struct MemoryFlowStorage {
    flows: DashMap<ScopedKey, Flow>,
}

impl MemoryFlowStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a flow.
    pub fn insert(&self, flow: Flow) {
        self.flows
            .insert(scoped_key(&flow.tenant, &flow.realm, &flow.id), flow);
    }

    /// Adds loaded flow documents to a tenant/realm.
    pub fn insert_documents(
        &self,
        tenant: &str,
        realm: &str,
        documents: impl IntoIterator<Item = FlowDocument>,
    ) {
        for document in documents {
            self.insert(document.into_flow(tenant, realm));
        }
    }
}

#[async_trait]
impl FlowDefinitionStorage for MemoryFlowStorage {
    async fn get_by_id(&self, tenant: &str, realm: &str, flow_id: &str) -> AuthResult<Option<Flow>> {
        Ok(self
            .flows
            .get(&scoped_key(tenant, realm, flow_id))
            .map(|e| e.value().clone()))
    }

    async fn get_by_route(
        &self,
        tenant: &str,
        realm: &str,
        route: &str,
    ) -> AuthResult<Option<Flow>> {
        Ok(self
            .flows
            .iter()
            .find(|e| e.tenant == tenant && e.realm == realm && e.route == route)
            .map(|e| e.value().clone()))
    }
}

/// Users keyed by tenant, realm and user id.
#[derive(Debug, Default)]
pub struct MemoryUserStorage {
    users: DashMap<ScopedKey, User>,
}

impl MemoryUserStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user: User) {
        self.users
            .insert(scoped_key(&user.tenant, &user.realm, &user.id), user);
    }

    /// Finds a user by username.
    pub fn find_by_username(&self, tenant: &str, realm: &str, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|e| e.tenant == tenant && e.realm == realm && e.username == username)
            .map(|e| e.value().clone())
    }
}

#[async_trait]
impl UserStorage for MemoryUserStorage {
    async fn get_by_id(&self, tenant: &str, realm: &str, user_id: &str) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .get(&scoped_key(tenant, realm, user_id))
            .map(|e| e.value().clone()))
    }
}
