//! Token claims mapping.
//!
//! Claims are built from the user record, filtered by the granted scopes,
//! plus the login facts captured when the authorization code was issued.
//!
//! | scope     | claims                                                        |
//! |-----------|---------------------------------------------------------------|
//! | `openid`  | `sub`                                                         |
//! | `email`   | `email`, `email_verified`                                     |
//! | `profile` | `preferred_username`, `name`, `given_name`, `family_name`     |
//! | `phone`   | `phone_number`, `phone_number_verified`                       |
//! | `groups`  | `groups`                                                      |
//! | `roles`   | `roles`                                                       |
//!
//! `iss`, `aud`, `exp`, `iat`, `nbf`, `jti`, `acr` and `auth_time` are always
//! present; `nonce` when the authorize request carried one.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::token::jwt::Claims;
use crate::types::{AuthorizeRequest, FlowResult, User};
use crate::{AuthError, AuthResult};

/// OpenID scope.
pub const SCOPE_OPENID: &str = "openid";
/// Email scope.
pub const SCOPE_EMAIL: &str = "email";
/// Profile scope.
pub const SCOPE_PROFILE: &str = "profile";
/// Phone scope.
pub const SCOPE_PHONE: &str = "phone";
/// Groups scope.
pub const SCOPE_GROUPS: &str = "groups";
/// Roles scope.
pub const SCOPE_ROLES: &str = "roles";

/// What the issuance manager remembers about a login between code issuance
/// and token issuance. Stored as `login_session_json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSnapshot {
    /// The flow result the code was issued for.
    pub result: FlowResult,

    /// Redirect URI of the authorize request.
    pub redirect_uri: String,

    /// OIDC nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,

    /// Granted scopes.
    #[serde(default)]
    pub scope: Vec<String>,
}

impl LoginSnapshot {
    /// Captures a login for an authorize request.
    #[must_use]
    pub fn new(result: &FlowResult, request: &AuthorizeRequest, auth_time: OffsetDateTime) -> Self {
        Self {
            result: result.clone(),
            redirect_uri: request.redirect_uri.clone(),
            nonce: request.nonce.clone(),
            auth_time,
            scope: request.scope.clone(),
        }
    }

    /// Serializes the snapshot for storage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if serialization fails.
    pub fn to_json(&self) -> AuthResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AuthError::internal(format!("cannot serialize login snapshot: {e}")))
    }

    /// Reads a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the stored document is unreadable.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AuthError::internal(format!("corrupt login snapshot: {e}")))
    }

    fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }
}

/// Inputs of one claim set.
#[derive(Debug, Clone, Copy)]
pub struct ClaimsInput<'a> {
    /// Realm issuer URL.
    pub issuer: &'a str,
    /// Audience (the client id).
    pub client_id: &'a str,
    /// Current user record.
    pub user: &'a User,
    /// Login facts.
    pub login: &'a LoginSnapshot,
    /// Issue instant.
    pub issued_at: OffsetDateTime,
    /// Token expiry.
    pub expires_at: OffsetDateTime,
}

/// Builds the claim set for a token.
#[must_use]
pub fn build_claims(input: &ClaimsInput<'_>) -> Claims {
    let ClaimsInput {
        issuer,
        client_id,
        user,
        login,
        issued_at,
        expires_at,
    } = *input;
    let iat = issued_at.unix_timestamp();
    let exp = expires_at.unix_timestamp();

    let mut claims = Claims::new();
    claims.insert("iss".into(), json!(issuer));
    claims.insert("aud".into(), json!(client_id));
    claims.insert("iat".into(), json!(iat));
    claims.insert("nbf".into(), json!(iat));
    claims.insert("exp".into(), json!(exp));
    claims.insert("jti".into(), json!(uuid::Uuid::new_v4().to_string()));
    claims.insert("acr".into(), json!(login.result.auth_level.as_str()));
    claims.insert("auth_time".into(), json!(login.auth_time.unix_timestamp()));
    if let Some(nonce) = &login.nonce {
        claims.insert("nonce".into(), json!(nonce));
    }
    if !login.scope.is_empty() {
        claims.insert("scope".into(), json!(login.scope.join(" ")));
    }

    if login.has_scope(SCOPE_OPENID) {
        claims.insert("sub".into(), json!(user.id));
    }
    if login.has_scope(SCOPE_EMAIL) {
        insert_opt(&mut claims, "email", user.email.as_deref());
        claims.insert("email_verified".into(), json!(user.email_verified));
    }
    if login.has_scope(SCOPE_PROFILE) {
        claims.insert("preferred_username".into(), json!(user.username));
        insert_opt(&mut claims, "name", user.display_name().as_deref());
        insert_opt(&mut claims, "given_name", user.given_name.as_deref());
        insert_opt(&mut claims, "family_name", user.family_name.as_deref());
    }
    if login.has_scope(SCOPE_PHONE) {
        insert_opt(&mut claims, "phone_number", user.phone.as_deref());
        claims.insert("phone_number_verified".into(), json!(user.phone_verified));
    }
    if login.has_scope(SCOPE_GROUPS) {
        claims.insert("groups".into(), json!(user.groups));
    }
    if login.has_scope(SCOPE_ROLES) {
        claims.insert("roles".into(), json!(user.roles));
    }

    claims
}

fn insert_opt(claims: &mut Claims, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        claims.insert(name.to_string(), Value::from(value));
    }
}
