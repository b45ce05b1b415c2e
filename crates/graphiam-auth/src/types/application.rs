//! Registered OAuth 2.0 applications.
//!
//! An [`Application`] is what a `client_id` resolves to: which grants it may
//! use, which scopes it may request, where its redirects may go, and whether
//! it authenticates with a secret.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use super::client_session::GrantType;
use crate::token::secret::hash_secret;

/// An OAuth 2.0 client registered in a realm.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// OAuth 2.0 client identifier.
    pub client_id: String,

    /// SHA-256 of the client secret. Set for confidential applications only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,

    /// Whether the application can keep a secret.
    ///
    /// Public applications must use PKCE and cannot use the client
    /// credentials grant.
    pub confidential: bool,

    /// Grants the application may use.
    #[serde(default)]
    pub allowed_grants: Vec<GrantType>,

    /// Scopes the application may request. Nothing outside this list is granted.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Exact redirect URIs the application registered.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// When the application was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("tenant", &self.tenant)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("confidential", &self.confidential)
            .field("allowed_grants", &self.allowed_grants)
            .field("allowed_scopes", &self.allowed_scopes)
            .field("redirect_uris", &self.redirect_uris)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Creates a public application with no grants, scopes or redirects.
    #[must_use]
    pub fn public(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret_hash: None,
            confidential: false,
            allowed_grants: Vec::new(),
            allowed_scopes: Vec::new(),
            redirect_uris: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Creates a confidential application authenticating with `secret`.
    ///
    /// Only the secret's hash is kept.
    #[must_use]
    pub fn confidential(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        secret: &str,
    ) -> Self {
        Self {
            client_secret_hash: Some(hash_secret(secret)),
            confidential: true,
            ..Self::public(tenant, realm, client_id)
        }
    }

    /// Allows a grant.
    #[must_use]
    pub fn with_grant(mut self, grant: GrantType) -> Self {
        self.allowed_grants.push(grant);
        self
    }

    /// Allows a scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.allowed_scopes.push(scope.into());
        self
    }

    /// Registers a redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Checks if the grant is allowed for this application.
    #[must_use]
    pub fn is_grant_allowed(&self, grant: GrantType) -> bool {
        self.allowed_grants.contains(&grant)
    }

    /// Checks if the scope is allowed for this application.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|allowed| allowed == scope)
    }

    /// Returns the first requested scope this application may not request.
    #[must_use]
    pub fn disallowed_scope<'a>(&self, scopes: &'a [String]) -> Option<&'a str> {
        scopes
            .iter()
            .map(String::as_str)
            .find(|scope| !self.is_scope_allowed(scope))
    }

    /// Checks if the redirect URI was registered, by exact match.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Public applications always use PKCE.
    #[must_use]
    pub fn requires_pkce(&self) -> bool {
        !self.confidential
    }

    /// Checks a presented client secret.
    ///
    /// Public applications need no secret and always pass. Confidential ones
    /// pass only when the presented secret hashes to the stored hash.
    #[must_use]
    pub fn verify_secret(&self, secret: Option<&str>) -> bool {
        if !self.confidential {
            return true;
        }
        match (&self.client_secret_hash, secret) {
            (Some(stored), Some(secret)) => hash_secret(secret)
                .as_bytes()
                .ct_eq(stored.as_bytes())
                .into(),
            _ => false,
        }
    }
}
