//! Auth session storage trait.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Key sessions by `(tenant, realm, session_id_hash)` and by `run_id`
//! - Enforce the optimistic concurrency check in `create_or_update`
//!   atomically with the write
//! - Never store raw session handles (the engine never hands them over)

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::AuthSession;

/// Storage trait for auth sessions.
///
/// Lookups return sessions regardless of expiry; the session manager
/// re-checks `expires_at` on every load.
#[async_trait]
pub trait AuthSessionStorage: Send + Sync {
    /// Creates or replaces a session.
    ///
    /// # Arguments
    ///
    /// * `session` - The session to store, with `version` already bumped
    /// * `expected_version` - `None` to create (fails if the run id exists),
    ///   `Some(v)` to replace a stored session whose version is exactly `v`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionConflict` if the expectation does not hold,
    /// or `AuthError::Storage` if the backend fails.
    ///
    /// # Atomicity
    ///
    /// The version check and the write must be one atomic step:
    ///
    /// ```sql
    /// UPDATE auth_sessions
    /// SET body = $4, version = $5
    /// WHERE tenant = $1 AND realm = $2 AND run_id = $3 AND version = $6
    /// ```
    async fn create_or_update(
        &self,
        session: &AuthSession,
        expected_version: Option<u64>,
    ) -> AuthResult<()>;

    /// Finds a session by the hash of its client-visible handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_hash(
        &self,
        tenant: &str,
        realm: &str,
        session_id_hash: &str,
    ) -> AuthResult<Option<AuthSession>>;

    /// Finds a session by its run id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_run_id(
        &self,
        tenant: &str,
        realm: &str,
        run_id: &str,
    ) -> AuthResult<Option<AuthSession>>;

    /// Lists every session of a tenant, across realms.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_all(&self, tenant: &str) -> AuthResult<Vec<AuthSession>>;

    /// Deletes a session by run id. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, tenant: &str, realm: &str, run_id: &str) -> AuthResult<bool>;

    /// Deletes every session of the tenant/realm with `expires_at <= now`.
    ///
    /// Returns the number of deleted sessions. Calling it again with nothing
    /// left to delete returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_expired(&self, tenant: &str, realm: &str, now: OffsetDateTime)
    -> AuthResult<u64>;
}
