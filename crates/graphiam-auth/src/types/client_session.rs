//! OAuth 2.0 client sessions.
//!
//! A [`ClientSession`] tracks one grant from code issuance onwards. It is
//! created holding only an authorization code hash, and the code exchange
//! rewrites it in place so that it holds only an access token hash. Refresh
//! tokens live in their own client session, so at most one of the three
//! hash fields is ever set on a record.
//!
//! # Security
//!
//! Raw codes and tokens are returned to the client and never stored. Only
//! their SHA-256 digests are persisted and used as lookup keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::token::jwt::Claims;

/// Grant that produced a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code grant (RFC 6749 §4.1).
    AuthorizationCode,
    /// Refresh token grant (RFC 6749 §6).
    RefreshToken,
    /// Client credentials grant (RFC 6749 §4.4). No user is involved.
    ClientCredentials,
}

impl GrantType {
    /// Returns the grant type string used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which secret a client session currently stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientSessionStage {
    /// Holds an unexchanged authorization code.
    AuthorizationCode,
    /// Holds an access token.
    AccessToken,
    /// Holds a refresh token.
    RefreshToken,
    /// Holds nothing; unusable.
    Empty,
}

/// One OAuth 2.0 grant lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    /// Record id.
    pub client_session_id: String,

    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// Client the grant was issued to.
    pub client_id: String,

    /// Grant that created this record.
    pub grant_type: GrantType,

    /// SHA-256 of the access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_hash: Option<String>,

    /// SHA-256 of the refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,

    /// SHA-256 of the authorization code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_hash: Option<String>,

    /// Authenticated user. Empty for the client credentials grant.
    pub user_id: String,

    /// Granted scopes.
    #[serde(default)]
    pub scope: Vec<String>,

    /// PKCE code challenge recorded at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method recorded at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// Serialized login snapshot used for claims mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_session_json: Option<String>,

    /// Claims issued for this grant.
    #[serde(default)]
    pub claims: Claims,

    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// After this instant the record behaves as if it did not exist.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ClientSession {
    /// Creates an empty record for a client and user.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        grant_type: GrantType,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            client_session_id: uuid::Uuid::new_v4().to_string(),
            tenant: tenant.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            grant_type,
            access_token_hash: None,
            refresh_token_hash: None,
            auth_code_hash: None,
            user_id: user_id.into(),
            scope: Vec::new(),
            code_challenge: None,
            code_challenge_method: None,
            login_session_json: None,
            claims: Claims::new(),
            created_at: OffsetDateTime::now_utc(),
            expires_at,
        }
    }

    /// Returns which secret this record holds.
    #[must_use]
    pub fn stage(&self) -> ClientSessionStage {
        match (
            &self.auth_code_hash,
            &self.access_token_hash,
            &self.refresh_token_hash,
        ) {
            (Some(_), _, _) => ClientSessionStage::AuthorizationCode,
            (None, Some(_), _) => ClientSessionStage::AccessToken,
            (None, None, Some(_)) => ClientSessionStage::RefreshToken,
            (None, None, None) => ClientSessionStage::Empty,
        }
    }

    /// Returns `true` if the record is past its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the record is past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Space-separated scope string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn create_test_session() -> ClientSession {
        ClientSession::new(
            "acme",
            "staff",
            "app",
            "user-1",
            GrantType::AuthorizationCode,
            OffsetDateTime::now_utc() + Duration::minutes(5),
        )
    }

    #[test]
    fn test_stage() {
        let mut session = create_test_session();
        assert_eq!(session.stage(), ClientSessionStage::Empty);

        session.auth_code_hash = Some("code".into());
        assert_eq!(session.stage(), ClientSessionStage::AuthorizationCode);

        session.auth_code_hash = None;
        session.access_token_hash = Some("access".into());
        assert_eq!(session.stage(), ClientSessionStage::AccessToken);

        session.access_token_hash = None;
        session.refresh_token_hash = Some("refresh".into());
        assert_eq!(session.stage(), ClientSessionStage::RefreshToken);
    }

    #[test]
    fn test_expiry() {
        let mut session = create_test_session();
        assert!(!session.is_expired());
        session.expires_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn test_serialization() {
        let mut session = create_test_session();
        session.scope = vec!["openid".into(), "email".into()];
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["grant_type"], "authorization_code");
        assert!(json.get("auth_code_hash").is_none());
        assert_eq!(session.scope_string(), "openid email");
    }
}
