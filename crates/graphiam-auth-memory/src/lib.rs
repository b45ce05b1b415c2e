//! In-memory storage backend for the GraphIAM authentication engine.
//!
//! Every store is a sharded [`DashMap`](dashmap::DashMap) keyed by
//! `(tenant, realm, id)`. Conditional writes (session versions, the
//! authorization code swap, refresh token rotation) are decided under the
//! entry's shard lock, so the guarantees the engine relies on hold for
//! concurrent callers within one process.
//!
//! Nothing survives a restart. Use this backend for tests, tooling and
//! single-node development setups.
//!
//! # Example
//!
//! ```ignore
//! use graphiam_auth::{AuthConfig, NodeRegistry};
//! use graphiam_auth_memory::MemoryStores;
//!
//! let stores = MemoryStores::new();
//! let config = AuthConfig::default();
//! let interpreter = stores.interpreter(NodeRegistry::with_builtins(), &config);
//! let issuance = stores.issuance(&config)?;
//! ```

pub mod application;
pub mod auth_session;
pub mod client_session;
pub mod flow;
pub mod signing_key;

use std::sync::Arc;

use graphiam_auth::{
    AuthConfig, AuthResult, AuthSessionManager, FlowInterpreter, IssuanceManager, NodeRegistry,
    SigningKeyManager,
};

pub use application::MemoryApplicationStorage;
pub use auth_session::MemoryAuthSessionStorage;
pub use client_session::MemoryClientSessionStorage;
pub use flow::{MemoryFlowStorage, MemoryUserStorage};
pub use signing_key::MemorySigningKeyStorage;

/// Map key shared by every store: tenant, realm, record id.
pub(crate) type ScopedKey = (String, String, String);

pub(crate) fn scoped_key(tenant: &str, realm: &str, id: &str) -> ScopedKey {
    (tenant.to_string(), realm.to_string(), id.to_string())
}

/// One instance of every store, shareable across engine components.
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub auth_sessions: Arc<MemoryAuthSessionStorage>,
    pub client_sessions: Arc<MemoryClientSessionStorage>,
    pub applications: Arc<MemoryApplicationStorage>,
    pub signing_keys: Arc<MemorySigningKeyStorage>,
    pub flows: Arc<MemoryFlowStorage>,
    pub users: Arc<MemoryUserStorage>,
}

impl MemoryStores {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an auth session manager over these stores.
    pub fn session_manager(&self, config: &AuthConfig) -> AuthSessionManager {
        AuthSessionManager::new(self.auth_sessions.clone(), config.flow.session_lifetime)
    }

    /// Builds a flow interpreter over these stores.
    pub fn interpreter(&self, registry: NodeRegistry, config: &AuthConfig) -> FlowInterpreter {
        FlowInterpreter::new(
            self.flows.clone(),
            self.session_manager(config),
            registry,
            &config.flow,
        )
    }

    /// Builds a signing key manager over these stores.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for an unsupported signing algorithm.
    pub fn key_manager(&self, config: &AuthConfig) -> AuthResult<SigningKeyManager> {
        SigningKeyManager::new(self.signing_keys.clone(), &config.signing)
    }

    /// Builds an issuance manager, with its own key manager, over these stores.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for an unsupported signing algorithm.
    pub fn issuance(&self, config: &AuthConfig) -> AuthResult<IssuanceManager> {
        Ok(IssuanceManager::new(
            self.client_sessions.clone(),
            self.applications.clone(),
            self.users.clone(),
            Arc::new(self.key_manager(config)?),
            config.clone(),
        ))
    }
}
