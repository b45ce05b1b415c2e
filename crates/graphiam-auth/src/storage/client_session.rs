//! Client session storage trait.
//!
//! All lookups take hashes, never raw codes or tokens.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::ClientSession;

/// Storage trait for OAuth 2.0 client sessions.
///
/// Every method is scoped by tenant and realm. Update and delete affect at
/// most one record.
#[async_trait]
pub trait ClientSessionStorage: Send + Sync {
    /// Stores a new client session.
    async fn create(&self, session: &ClientSession) -> AuthResult<()>;

    /// Finds a client session by id.
    async fn get_by_id(
        &self,
        tenant: &str,
        realm: &str,
        client_session_id: &str,
    ) -> AuthResult<Option<ClientSession>>;

    /// Finds a client session by access token hash.
    async fn get_by_access_token_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>>;

    /// Finds a client session by refresh token hash.
    async fn get_by_refresh_token_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>>;

    /// Finds a client session by authorization code hash.
    async fn get_by_auth_code_hash(
        &self,
        tenant: &str,
        realm: &str,
        hash: &str,
    ) -> AuthResult<Option<ClientSession>>;

    /// Lists the client sessions issued to a client.
    async fn list_by_client(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Vec<ClientSession>>;

    /// Lists the client sessions of a user.
    async fn list_by_user(
        &self,
        tenant: &str,
        realm: &str,
        user_id: &str,
    ) -> AuthResult<Vec<ClientSession>>;

    /// Replaces a stored client session. Returns `false` if it does not exist.
    async fn update(&self, session: &ClientSession) -> AuthResult<bool>;

    /// Replaces a stored client session only while its authorization code
    /// hash still equals `expected_auth_code_hash`.
    ///
    /// Returns `false` when another caller already swapped the code out. This
    /// is what makes a code redeemable at most once:
    ///
    /// ```sql
    /// UPDATE client_sessions
    /// SET auth_code_hash = NULL, access_token_hash = $5, ...
    /// WHERE tenant = $1 AND realm = $2 AND id = $3 AND auth_code_hash = $4
    /// ```
    async fn update_if_auth_code_matches(
        &self,
        session: &ClientSession,
        expected_auth_code_hash: &str,
    ) -> AuthResult<bool>;

    /// Deletes a client session. Returns `true` only for the caller that
    /// actually removed it.
    async fn delete(&self, tenant: &str, realm: &str, client_session_id: &str)
    -> AuthResult<bool>;

    /// Deletes every client session with `expires_at <= now`; returns the count.
    async fn delete_expired(&self, tenant: &str, realm: &str, now: OffsetDateTime)
    -> AuthResult<u64>;
}
