//! Auth session state machine.
//!
//! [`AuthSessionManager`] is the only component that talks to the
//! [`AuthSessionStorage`] port. It adds two things on top of plain CRUD:
//!
//! - Expiry is re-checked on every load, so an expired session is a miss
//!   even before the sweep removes it.
//! - Saves carry an optimistic version check. Two requests that loaded the
//!   same version cannot both persist a transition; the loser gets
//!   `AuthError::SessionConflict` and its in-memory changes are discarded.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::storage::AuthSessionStorage;
use crate::token::secret::hash_prefix;
use crate::types::AuthSession;
use crate::{AuthError, AuthResult};

/// Persists and loads auth sessions.
#[derive(Clone)]
pub struct AuthSessionManager {
    storage: Arc<dyn AuthSessionStorage>,
    lifetime: Duration,
}

impl AuthSessionManager {
    /// Creates a manager whose new sessions live for `lifetime`.
    pub fn new(storage: Arc<dyn AuthSessionStorage>, lifetime: Duration) -> Self {
        Self { storage, lifetime }
    }

    /// Lifetime given to new sessions.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Builds a new, unsaved session positioned at `start`.
    #[must_use]
    pub fn new_session(
        &self,
        tenant: &str,
        realm: &str,
        flow_id: &str,
        session_id_hash: &str,
        start: &str,
    ) -> AuthSession {
        AuthSession::new(tenant, realm, flow_id, session_id_hash, start, self.lifetime)
    }

    /// Persists a session, bumping its version.
    ///
    /// A session with version 0 is created; any other version must match the
    /// stored one. On failure the version is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionConflict` if another save won the race, or
    /// the storage error unchanged.
    pub async fn save(&self, session: &mut AuthSession) -> AuthResult<()> {
        let expected = (session.version > 0).then_some(session.version);
        session.version += 1;

        match self.storage.create_or_update(session, expected).await {
            Ok(()) => {
                tracing::trace!(
                    run_id = %session.run_id,
                    version = session.version,
                    "auth session saved"
                );
                Ok(())
            }
            Err(err) => {
                session.version -= 1;
                if matches!(err, AuthError::SessionConflict { .. }) {
                    tracing::warn!(
                        tenant = %session.tenant,
                        realm = %session.realm,
                        run_id = %session.run_id,
                        version = session.version,
                        "concurrent save rejected"
                    );
                }
                Err(err)
            }
        }
    }

    /// Loads a live session by handle hash.
    ///
    /// Returns `Ok(None)` if the session does not exist, is expired, or
    /// belongs to another tenant/realm.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn load(
        &self,
        tenant: &str,
        realm: &str,
        session_id_hash: &str,
    ) -> AuthResult<Option<AuthSession>> {
        let session = self
            .storage
            .get_by_hash(tenant, realm, session_id_hash)
            .await?;
        Ok(self.live(tenant, realm, session, hash_prefix(session_id_hash)))
    }

    /// Loads a live session by run id.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn load_by_run_id(
        &self,
        tenant: &str,
        realm: &str,
        run_id: &str,
    ) -> AuthResult<Option<AuthSession>> {
        let session = self.storage.get_by_run_id(tenant, realm, run_id).await?;
        Ok(self.live(tenant, realm, session, run_id))
    }

    /// Lists the live sessions of a tenant.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn list_all(&self, tenant: &str) -> AuthResult<Vec<AuthSession>> {
        let now = OffsetDateTime::now_utc();
        let sessions = self.storage.list_all(tenant).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.tenant == tenant && !s.is_expired_at(now))
            .collect())
    }

    /// Deletes a session (logout). Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn delete(&self, tenant: &str, realm: &str, run_id: &str) -> AuthResult<bool> {
        let deleted = self.storage.delete(tenant, realm, run_id).await?;
        if deleted {
            tracing::info!(tenant, realm, run_id, "auth session deleted");
        }
        Ok(deleted)
    }

    /// Deletes every expired session of the tenant/realm.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn sweep(&self, tenant: &str, realm: &str) -> AuthResult<u64> {
        let deleted = self
            .storage
            .delete_expired(tenant, realm, OffsetDateTime::now_utc())
            .await?;
        if deleted > 0 {
            tracing::info!(tenant, realm, deleted, "expired auth sessions swept");
        }
        Ok(deleted)
    }

    fn live(
        &self,
        tenant: &str,
        realm: &str,
        session: Option<AuthSession>,
        lookup: &str,
    ) -> Option<AuthSession> {
        let session = session?;
        if !session.is_scoped_to(tenant, realm) {
            tracing::error!(
                tenant,
                realm,
                stored_tenant = %session.tenant,
                stored_realm = %session.realm,
                "storage returned an auth session from another realm"
            );
            return None;
        }
        if session.is_expired() {
            tracing::debug!(tenant, realm, lookup, "auth session expired");
            return None;
        }
        Some(session)
    }
}
