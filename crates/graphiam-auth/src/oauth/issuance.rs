//! OAuth 2.0 issuance manager.
//!
//! Turns a completed login into client sessions: an authorization code
//! first, then an access token (and optionally a refresh token) when the
//! code is exchanged. Every request is checked against the registered
//! [`Application`]: its grants, scopes, redirect URIs and, for confidential
//! applications, its secret.
//!
//! # Grant lifecycle
//!
//! ```text
//! issue_authorization_code ──► [auth_code_hash]
//!                                   │ exchange_code (at most once)
//!                                   ▼
//!                             [access_token_hash] + new [refresh_token_hash]
//!                                                          │ refresh (rotates)
//!                                                          ▼
//!                                   new [access_token_hash] + new [refresh_token_hash]
//! ```
//!
//! Raw codes and tokens are returned once and never stored or logged. The
//! code swap is a conditional update on the code hash, so two concurrent
//! exchanges of the same code cannot both succeed. Refresh rotation relies
//! on delete reporting which caller actually removed the record.
//!
//! New records are written before the presented grant is consumed, and
//! removed again if consuming it fails. A failed write therefore never
//! burns a code or refresh token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use super::claims::{ClaimsInput, LoginSnapshot, build_claims};
use super::pkce::{PkceError, verify_code_challenge};
use crate::config::AuthConfig;
use crate::keys::SigningKeyManager;
use crate::storage::{ApplicationStorage, ClientSessionStorage, UserStorage};
use crate::token::jwt::Claims;
use crate::token::secret::{generate_secret, hash_prefix, hash_secret};
use crate::types::{
    Application, AuthSession, AuthorizeRequest, ClientSession, ClientSessionStage, FlowResult,
    GrantType, SessionState, User,
};
use crate::{AuthError, AuthResult};

/// Token type of issued access tokens.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Client credentials presented at the token endpoint.
#[derive(Clone)]
pub struct ClientAuthentication {
    /// Client identifier.
    pub client_id: String,
    /// Raw client secret. Required for confidential applications.
    pub client_secret: Option<String>,
}

impl ClientAuthentication {
    /// A public client, identified but not authenticated.
    #[must_use]
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    /// A confidential client presenting its secret.
    #[must_use]
    pub fn with_secret(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(secret.into()),
        }
    }
}

impl fmt::Debug for ClientAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuthentication")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// A code exchange request as received from the client.
#[derive(Clone)]
pub struct CodeExchange {
    /// Raw authorization code.
    pub code: String,
    /// PKCE code verifier, if the client sent one.
    pub code_verifier: Option<String>,
    /// Requesting client.
    pub client_id: String,
    /// Raw client secret, for confidential applications.
    pub client_secret: Option<String>,
    /// Redirect URI sent with the token request, if any.
    pub redirect_uri: Option<String>,
}

impl CodeExchange {
    /// Creates an exchange request without PKCE, secret or redirect URI.
    #[must_use]
    pub fn new(code: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            code_verifier: None,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
        }
    }

    /// Sets the PKCE code verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(verifier.into());
        self
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExchange")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("pkce", &self.code_verifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Redirect parameters for a finished authorization.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationResponse {
    /// Where to send the user agent.
    #[serde(skip)]
    pub redirect_uri: String,
    /// Raw authorization code.
    pub code: String,
    /// Client state from the authorize request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Issuer identifier (RFC 9207).
    pub iss: String,
}

impl fmt::Debug for AuthorizationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationResponse")
            .field("redirect_uri", &self.redirect_uri)
            .field("code", &"[redacted]")
            .field("state", &self.state)
            .field("iss", &self.iss)
            .finish()
    }
}

/// Tokens issued by a code exchange or refresh.
#[derive(Clone)]
pub struct TokenSet {
    /// The access-token client session.
    pub client_session: ClientSession,
    /// Raw opaque access token.
    pub access_token: String,
    /// Raw opaque refresh token, when refresh tokens are enabled.
    pub refresh_token: Option<String>,
    /// Signed ID token over the issued claims. Absent for client credentials.
    pub id_token: Option<String>,
    /// Kid of the key that signed the ID token.
    pub kid: Option<String>,
    /// Always `"Bearer"`.
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Granted scopes, space-separated.
    pub scope: String,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("client_session_id", &self.client_session.client_session_id)
            .field("kid", &self.kid)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// RFC 7662 introspection response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently usable.
    pub active: bool,
    /// Granted scopes, space-separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Resource owner's username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// `"access_token"` or `"refresh_token"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry (Unix time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time (Unix time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before (Unix time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl IntrospectionResponse {
    /// Response for unknown, expired or revoked tokens. Never says why.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    fn from_session(session: &ClientSession, token_type: &str) -> Self {
        let claim = |name: &str| {
            session
                .claims
                .get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        let username = session
            .login_session_json
            .as_deref()
            .and_then(|json| LoginSnapshot::from_json(json).ok())
            .map(|login| login.result.username);

        Self {
            active: true,
            scope: Some(session.scope_string()),
            client_id: Some(session.client_id.clone()),
            username,
            token_type: Some(token_type.to_string()),
            exp: Some(session.expires_at.unix_timestamp()),
            iat: Some(session.created_at.unix_timestamp()),
            nbf: session.claims.get("nbf").and_then(|v| v.as_i64()),
            sub: (!session.user_id.is_empty()).then(|| session.user_id.clone()),
            aud: claim("aud"),
            iss: claim("iss"),
            jti: claim("jti"),
        }
    }
}

/// Issues and manages OAuth 2.0 client sessions.
pub struct IssuanceManager {
    client_sessions: Arc<dyn ClientSessionStorage>,
    applications: Arc<dyn ApplicationStorage>,
    users: Arc<dyn UserStorage>,
    keys: Arc<SigningKeyManager>,
    config: AuthConfig,
}

impl IssuanceManager {
    /// Creates an issuance manager.
    pub fn new(
        client_sessions: Arc<dyn ClientSessionStorage>,
        applications: Arc<dyn ApplicationStorage>,
        users: Arc<dyn UserStorage>,
        keys: Arc<SigningKeyManager>,
        config: AuthConfig,
    ) -> Self {
        Self {
            client_sessions,
            applications,
            users,
            keys,
            config,
        }
    }

    /// The signing key manager used for ID tokens.
    #[must_use]
    pub fn keys(&self) -> &SigningKeyManager {
        &self.keys
    }

    /// Checks an authorize request against the client's registration.
    ///
    /// Call this before starting the login so a bad request never reaches
    /// the user. [`Self::issue_authorization_code`] repeats the check.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRequest` for a malformed request, an
    ///   unregistered redirect URI, or a public client without PKCE
    /// - `AuthError::InvalidClient` for an unknown client
    /// - `AuthError::UnauthorizedClient` if the client may not use the
    ///   authorization code grant
    /// - `AuthError::InvalidScope` for a scope the client may not request
    pub async fn validate_authorize_request(
        &self,
        tenant: &str,
        realm: &str,
        request: &AuthorizeRequest,
    ) -> AuthResult<Application> {
        let method = request.validate_for_code()?;
        let application = self.application(tenant, realm, &request.client_id).await?;

        if !application.is_redirect_uri_allowed(&request.redirect_uri) {
            return Err(AuthError::invalid_request("redirect_uri is not registered"));
        }
        Self::require_grant(&application, GrantType::AuthorizationCode)?;
        if application.requires_pkce() && method.is_none() {
            return Err(AuthError::invalid_request(
                "public clients must send an S256 code_challenge",
            ));
        }
        if let Some(scope) = application.disallowed_scope(&request.scope) {
            return Err(AuthError::invalid_scope(scope));
        }
        Ok(application)
    }

    /// Issues an authorization code for a successful login.
    ///
    /// Only the code's hash is stored. The code expires after the configured
    /// authorization code lifetime.
    ///
    /// # Errors
    ///
    /// - `AuthError::AccessDenied` if the result is not authenticated
    /// - any error of [`Self::validate_authorize_request`]
    /// - `AuthError::Configuration` if the code lifetime overflows
    pub async fn issue_authorization_code(
        &self,
        tenant: &str,
        realm: &str,
        result: &FlowResult,
        request: &AuthorizeRequest,
    ) -> AuthResult<(ClientSession, String)> {
        self.issue_code_at(tenant, realm, result, request, OffsetDateTime::now_utc())
            .await
    }

    async fn issue_code_at(
        &self,
        tenant: &str,
        realm: &str,
        result: &FlowResult,
        request: &AuthorizeRequest,
        auth_time: OffsetDateTime,
    ) -> AuthResult<(ClientSession, String)> {
        if !result.authenticated || result.user_id.is_empty() {
            return Err(AuthError::access_denied("login did not authenticate a user"));
        }
        self.validate_authorize_request(tenant, realm, request).await?;
        let method = request.validate_for_code()?;

        let code = generate_secret();
        let code_hash = hash_secret(&code);
        let expires_at = expires_after(
            OffsetDateTime::now_utc(),
            self.config.oauth.authorization_code_lifetime,
        )?;

        let mut session = ClientSession::new(
            tenant,
            realm,
            &request.client_id,
            &result.user_id,
            GrantType::AuthorizationCode,
            expires_at,
        );
        session.auth_code_hash = Some(code_hash);
        session.scope = request.scope.clone();
        session.code_challenge = request.code_challenge.clone();
        session.code_challenge_method = method.map(|m| m.as_str().to_string());
        session.login_session_json =
            Some(LoginSnapshot::new(result, request, auth_time).to_json()?);

        self.client_sessions.create(&session).await?;

        tracing::info!(
            tenant,
            realm,
            client_id = %request.client_id,
            user_id = %result.user_id,
            client_session_id = %session.client_session_id,
            pkce = session.code_challenge.is_some(),
            "authorization code issued"
        );
        Ok((session, code))
    }

    /// Issues the authorization response for a completed login that an
    /// authorize call started.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRequest` if the session is not finished or has
    ///   no OAuth 2.0 context
    /// - `AuthError::AccessDenied` if the login failed or did not
    ///   authenticate anyone
    pub async fn finish_authorization(
        &self,
        session: &AuthSession,
    ) -> AuthResult<AuthorizationResponse> {
        let oauth2 = session
            .oauth2
            .as_ref()
            .ok_or_else(|| AuthError::invalid_request("login was not started by an authorize request"))?;

        let result = match (session.state(), &session.result) {
            (SessionState::Completed, Some(result)) => result,
            (SessionState::Failed, _) => {
                return Err(AuthError::access_denied("login failed"));
            }
            _ => return Err(AuthError::invalid_request("login is not finished")),
        };

        let request = &oauth2.authorize_request;
        let auth_time = oauth2.auth_time.unwrap_or_else(OffsetDateTime::now_utc);
        let (_, code) = self
            .issue_code_at(&session.tenant, &session.realm, result, request, auth_time)
            .await?;

        Ok(AuthorizationResponse {
            redirect_uri: request.redirect_uri.clone(),
            code,
            state: request.state.clone(),
            iss: self.config.realm_issuer(&session.tenant, &session.realm),
        })
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// Nothing is written unless every check passes, and the code can be
    /// redeemed at most once even under concurrent requests. If a write
    /// fails the code stays redeemable.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidClient` for an unknown client or a wrong secret
    /// - `AuthError::UnauthorizedClient` if the client may not use the grant
    /// - `AuthError::InvalidGrant` for an unknown, expired, already used or
    ///   foreign code, or a user who can no longer sign in
    /// - `AuthError::PkceVerificationFailed` if a challenge was recorded, or
    ///   the client is public, and the verifier is missing or wrong
    /// - `AuthError::NoActiveSigningKey` if the realm cannot sign
    pub async fn exchange_code(
        &self,
        tenant: &str,
        realm: &str,
        exchange: &CodeExchange,
    ) -> AuthResult<TokenSet> {
        let application = self
            .authenticate(
                tenant,
                realm,
                &exchange.client_id,
                exchange.client_secret.as_deref(),
            )
            .await?;
        Self::require_grant(&application, GrantType::AuthorizationCode)?;

        let code_hash = hash_secret(&exchange.code);
        let now = OffsetDateTime::now_utc();

        let session = self
            .client_sessions
            .get_by_auth_code_hash(tenant, realm, &code_hash)
            .await?
            .filter(|s| !s.is_expired_at(now) && s.stage() == ClientSessionStage::AuthorizationCode)
            .ok_or_else(|| {
                tracing::debug!(tenant, realm, code = hash_prefix(&code_hash), "unknown authorization code");
                AuthError::invalid_grant("authorization code is invalid or expired")
            })?;

        if session.client_id != exchange.client_id {
            tracing::warn!(
                tenant,
                realm,
                client_id = %exchange.client_id,
                client_session_id = %session.client_session_id,
                "authorization code presented by another client"
            );
            return Err(AuthError::invalid_grant("authorization code was issued to another client"));
        }

        Self::check_pkce(&session, &application, exchange.code_verifier.as_deref())?;

        let login = Self::login(&session)?;
        if let Some(redirect_uri) = &exchange.redirect_uri {
            if *redirect_uri != login.redirect_uri {
                return Err(AuthError::invalid_grant("redirect_uri does not match"));
            }
        }
        let user = self.active_user(tenant, realm, &session.user_id).await?;

        let expires_at = expires_after(now, self.config.oauth.access_token_lifetime)?;
        let claims = self.claims(tenant, realm, &session.client_id, &user, &login, now, expires_at);
        // Sign before touching storage so a signing failure leaves the code usable.
        let (id_token, kid) = self.keys.sign(tenant, realm, &claims).await?;

        let access_token = generate_secret();
        let mut access = session.clone();
        access.auth_code_hash = None;
        access.access_token_hash = Some(hash_secret(&access_token));
        access.expires_at = expires_at;
        access.claims = claims;

        let refresh =
            self.refresh_record(&application, &access, GrantType::AuthorizationCode, now)?;
        if let Some((record, _)) = &refresh {
            self.client_sessions.create(record).await?;
        }

        let swapped = self
            .client_sessions
            .update_if_auth_code_matches(&access, &code_hash)
            .await;
        match swapped {
            Ok(true) => {}
            Ok(false) => {
                self.discard(refresh.as_ref().map(|(record, _)| record)).await;
                tracing::warn!(
                    tenant,
                    realm,
                    client_id = %session.client_id,
                    client_session_id = %session.client_session_id,
                    "authorization code replayed"
                );
                return Err(AuthError::invalid_grant("authorization code was already used"));
            }
            Err(err) => {
                self.discard(refresh.as_ref().map(|(record, _)| record)).await;
                return Err(err);
            }
        }

        tracing::info!(
            tenant,
            realm,
            client_id = %access.client_id,
            user_id = %access.user_id,
            client_session_id = %access.client_session_id,
            kid = %kid,
            "tokens issued"
        );
        let refresh_token = refresh.map(|(_, token)| token);
        Ok(self.token_set(access, access_token, refresh_token, Some(id_token), Some(kid)))
    }

    /// Exchanges a refresh token for a new access/refresh token pair.
    ///
    /// The presented refresh token is consumed: only one of two concurrent
    /// refreshes with the same token succeeds. If a write fails the presented
    /// token stays usable.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidClient` for an unknown client or a wrong secret
    /// - `AuthError::UnauthorizedClient` if the client may not use the grant
    /// - `AuthError::InvalidGrant` for an unknown, expired, already used or
    ///   foreign refresh token, or a user who can no longer sign in
    /// - `AuthError::NoActiveSigningKey` if the realm cannot sign
    pub async fn refresh(
        &self,
        tenant: &str,
        realm: &str,
        refresh_token: &str,
        client: &ClientAuthentication,
    ) -> AuthResult<TokenSet> {
        let client_id = client.client_id.as_str();
        let application = self
            .authenticate(tenant, realm, client_id, client.client_secret.as_deref())
            .await?;
        Self::require_grant(&application, GrantType::RefreshToken)?;

        let token_hash = hash_secret(refresh_token);
        let now = OffsetDateTime::now_utc();

        let stored = self
            .client_sessions
            .get_by_refresh_token_hash(tenant, realm, &token_hash)
            .await?
            .filter(|s| !s.is_expired_at(now))
            .ok_or_else(|| AuthError::invalid_grant("refresh token is invalid or expired"))?;

        if stored.client_id != client_id {
            tracing::warn!(
                tenant,
                realm,
                client_id,
                client_session_id = %stored.client_session_id,
                "refresh token presented by another client"
            );
            return Err(AuthError::invalid_grant("refresh token was issued to another client"));
        }

        let login = Self::login(&stored)?;
        let user = self.active_user(tenant, realm, &stored.user_id).await?;
        let expires_at = expires_after(now, self.config.oauth.access_token_lifetime)?;
        let claims = self.claims(tenant, realm, client_id, &user, &login, now, expires_at);
        let (id_token, kid) = self.keys.sign(tenant, realm, &claims).await?;

        let access_token = generate_secret();
        let mut access = ClientSession::new(
            tenant,
            realm,
            client_id,
            &stored.user_id,
            GrantType::RefreshToken,
            expires_at,
        );
        access.access_token_hash = Some(hash_secret(&access_token));
        access.scope = stored.scope.clone();
        access.login_session_json = stored.login_session_json.clone();
        access.claims = claims;
        let refresh =
            self.refresh_record(&application, &access, GrantType::RefreshToken, now)?;

        self.client_sessions.create(&access).await?;
        if let Some((record, _)) = &refresh {
            if let Err(err) = self.client_sessions.create(record).await {
                self.discard([&access]).await;
                return Err(err);
            }
        }

        let created = || std::iter::once(&access).chain(refresh.iter().map(|(record, _)| record));
        match self
            .client_sessions
            .delete(tenant, realm, &stored.client_session_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.discard(created()).await;
                tracing::warn!(
                    tenant,
                    realm,
                    client_id,
                    client_session_id = %stored.client_session_id,
                    "refresh token replayed"
                );
                return Err(AuthError::invalid_grant("refresh token was already used"));
            }
            Err(err) => {
                self.discard(created()).await;
                return Err(err);
            }
        }

        tracing::info!(
            tenant,
            realm,
            client_id,
            user_id = %access.user_id,
            client_session_id = %access.client_session_id,
            kid = %kid,
            "tokens refreshed"
        );
        let refresh_token = refresh.map(|(_, token)| token);
        Ok(self.token_set(access, access_token, refresh_token, Some(id_token), Some(kid)))
    }

    /// Issues an access token to a confidential client acting on its own
    /// behalf (RFC 6749 §4.4).
    ///
    /// No user, ID token or refresh token is involved.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidClient` for an unknown client or a wrong secret
    /// - `AuthError::UnauthorizedClient` for a public client or one that may
    ///   not use the grant
    /// - `AuthError::InvalidScope` for a scope the client may not request
    pub async fn client_credentials(
        &self,
        tenant: &str,
        realm: &str,
        client: &ClientAuthentication,
        scope: &[String],
    ) -> AuthResult<TokenSet> {
        let client_id = client.client_id.as_str();
        let application = self
            .authenticate(tenant, realm, client_id, client.client_secret.as_deref())
            .await?;
        if !application.confidential {
            return Err(AuthError::unauthorized_client(
                "client credentials grant requires a confidential client",
            ));
        }
        Self::require_grant(&application, GrantType::ClientCredentials)?;
        if let Some(scope) = application.disallowed_scope(scope) {
            return Err(AuthError::invalid_scope(scope));
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = expires_after(now, self.config.oauth.access_token_lifetime)?;
        let access_token = generate_secret();
        let mut access = ClientSession::new(
            tenant,
            realm,
            client_id,
            "",
            GrantType::ClientCredentials,
            expires_at,
        );
        access.access_token_hash = Some(hash_secret(&access_token));
        access.scope = scope.to_vec();
        access.claims = client_claims(
            &self.config.realm_issuer(tenant, realm),
            client_id,
            scope,
            now,
            expires_at,
        );
        self.client_sessions.create(&access).await?;

        tracing::info!(
            tenant,
            realm,
            client_id,
            client_session_id = %access.client_session_id,
            "client credentials token issued"
        );
        Ok(self.token_set(access, access_token, None, None, None))
    }

    /// Finds the live client session of an access token.
    ///
    /// Expired sessions are reported as `None`, exactly like unknown ones.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn introspect_by_access_token(
        &self,
        tenant: &str,
        realm: &str,
        access_token: &str,
    ) -> AuthResult<Option<ClientSession>> {
        let hash = hash_secret(access_token);
        let session = self
            .client_sessions
            .get_by_access_token_hash(tenant, realm, &hash)
            .await?;
        Ok(session.filter(|s| !s.is_expired()))
    }

    /// RFC 7662 introspection of an access or refresh token.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn introspect(
        &self,
        tenant: &str,
        realm: &str,
        token: &str,
    ) -> AuthResult<IntrospectionResponse> {
        if let Some(session) = self.introspect_by_access_token(tenant, realm, token).await? {
            return Ok(IntrospectionResponse::from_session(&session, "access_token"));
        }

        let hash = hash_secret(token);
        let refresh = self
            .client_sessions
            .get_by_refresh_token_hash(tenant, realm, &hash)
            .await?
            .filter(|s| !s.is_expired());
        Ok(match refresh {
            Some(session) => IntrospectionResponse::from_session(&session, "refresh_token"),
            None => IntrospectionResponse::inactive(),
        })
    }

    /// Deletes a client session. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn revoke(
        &self,
        tenant: &str,
        realm: &str,
        client_session_id: &str,
    ) -> AuthResult<bool> {
        let deleted = self
            .client_sessions
            .delete(tenant, realm, client_session_id)
            .await?;
        if deleted {
            tracing::info!(tenant, realm, client_session_id, "client session revoked");
        }
        Ok(deleted)
    }

    /// Revokes the client session of a raw access or refresh token
    /// (RFC 7009). Returns `false` for unknown tokens.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn revoke_token(&self, tenant: &str, realm: &str, token: &str) -> AuthResult<bool> {
        let hash = hash_secret(token);
        let session = match self
            .client_sessions
            .get_by_access_token_hash(tenant, realm, &hash)
            .await?
        {
            Some(session) => Some(session),
            None => {
                self.client_sessions
                    .get_by_refresh_token_hash(tenant, realm, &hash)
                    .await?
            }
        };
        match session {
            Some(session) => self.revoke(tenant, realm, &session.client_session_id).await,
            None => Ok(false),
        }
    }

    /// Lists the live client sessions of a user.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn list_for_user(
        &self,
        tenant: &str,
        realm: &str,
        user_id: &str,
    ) -> AuthResult<Vec<ClientSession>> {
        let now = OffsetDateTime::now_utc();
        let sessions = self.client_sessions.list_by_user(tenant, realm, user_id).await?;
        Ok(sessions.into_iter().filter(|s| !s.is_expired_at(now)).collect())
    }

    /// Lists the live client sessions of a client.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn list_for_client(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Vec<ClientSession>> {
        let now = OffsetDateTime::now_utc();
        let sessions = self
            .client_sessions
            .list_by_client(tenant, realm, client_id)
            .await?;
        Ok(sessions.into_iter().filter(|s| !s.is_expired_at(now)).collect())
    }

    /// Deletes every expired client session of the tenant/realm.
    ///
    /// # Errors
    ///
    /// Returns the storage error unchanged.
    pub async fn sweep(&self, tenant: &str, realm: &str) -> AuthResult<u64> {
        let deleted = self
            .client_sessions
            .delete_expired(tenant, realm, OffsetDateTime::now_utc())
            .await?;
        if deleted > 0 {
            tracing::info!(tenant, realm, deleted, "expired client sessions swept");
        }
        Ok(deleted)
    }

    async fn application(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
    ) -> AuthResult<Application> {
        self.applications
            .get_by_client_id(tenant, realm, client_id)
            .await?
            .ok_or_else(|| {
                tracing::debug!(tenant, realm, client_id, "unknown client");
                AuthError::invalid_client(format!("unknown client '{client_id}'"))
            })
    }

    async fn authenticate(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
        secret: Option<&str>,
    ) -> AuthResult<Application> {
        let application = self.application(tenant, realm, client_id).await?;
        if !application.verify_secret(secret) {
            tracing::warn!(tenant, realm, client_id, "client authentication failed");
            return Err(AuthError::invalid_client("client authentication failed"));
        }
        Ok(application)
    }

    fn require_grant(application: &Application, grant: GrantType) -> AuthResult<()> {
        if application.is_grant_allowed(grant) {
            Ok(())
        } else {
            Err(AuthError::unauthorized_client(format!(
                "grant '{grant}' is not allowed for client '{}'",
                application.client_id
            )))
        }
    }

    fn check_pkce(
        session: &ClientSession,
        application: &Application,
        verifier: Option<&str>,
    ) -> AuthResult<()> {
        let outcome = match (&session.code_challenge, &session.code_challenge_method) {
            (None, None) if !application.requires_pkce() => return Ok(()),
            (Some(challenge), Some(method)) => verify_code_challenge(challenge, method, verifier),
            _ => Err(PkceError::VerificationFailed),
        };
        outcome.map_err(|err| {
            tracing::warn!(
                tenant = %session.tenant,
                realm = %session.realm,
                client_id = %session.client_id,
                client_session_id = %session.client_session_id,
                error = %err,
                "PKCE verification failed"
            );
            AuthError::from(err)
        })
    }

    fn login(session: &ClientSession) -> AuthResult<LoginSnapshot> {
        let json = session.login_session_json.as_deref().ok_or_else(|| {
            AuthError::internal(format!(
                "client session {} has no login snapshot",
                session.client_session_id
            ))
        })?;
        LoginSnapshot::from_json(json)
    }

    async fn active_user(&self, tenant: &str, realm: &str, user_id: &str) -> AuthResult<User> {
        match self.users.get_by_id(tenant, realm, user_id).await? {
            Some(user) if !user.disabled => Ok(user),
            Some(_) => Err(AuthError::invalid_grant("user is disabled")),
            None => Err(AuthError::invalid_grant("user no longer exists")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn claims(
        &self,
        tenant: &str,
        realm: &str,
        client_id: &str,
        user: &User,
        login: &LoginSnapshot,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Claims {
        let issuer = self.config.realm_issuer(tenant, realm);
        build_claims(&ClaimsInput {
            issuer: &issuer,
            client_id,
            user,
            login,
            issued_at: now,
            expires_at,
        })
    }

    /// Builds, without storing, the refresh record that accompanies `access`.
    ///
    /// Returns `None` when refresh tokens are off or the client may not use
    /// the refresh token grant.
    fn refresh_record(
        &self,
        application: &Application,
        access: &ClientSession,
        grant_type: GrantType,
        now: OffsetDateTime,
    ) -> AuthResult<Option<(ClientSession, String)>> {
        if !self.config.oauth.refresh_tokens_enabled
            || !application.is_grant_allowed(GrantType::RefreshToken)
        {
            return Ok(None);
        }

        let refresh_token = generate_secret();
        let mut refresh = ClientSession::new(
            &access.tenant,
            &access.realm,
            &access.client_id,
            &access.user_id,
            grant_type,
            expires_after(now, self.config.oauth.refresh_token_lifetime)?,
        );
        refresh.refresh_token_hash = Some(hash_secret(&refresh_token));
        refresh.scope = access.scope.clone();
        refresh.login_session_json = access.login_session_json.clone();
        Ok(Some((refresh, refresh_token)))
    }

    /// Deletes records written for a grant that could not be completed.
    async fn discard(&self, records: impl IntoIterator<Item = &ClientSession>) {
        for record in records {
            if let Err(err) = self
                .client_sessions
                .delete(&record.tenant, &record.realm, &record.client_session_id)
                .await
            {
                tracing::warn!(
                    tenant = %record.tenant,
                    realm = %record.realm,
                    client_session_id = %record.client_session_id,
                    error = %err,
                    "failed to remove unused client session"
                );
            }
        }
    }

    fn token_set(
        &self,
        client_session: ClientSession,
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        kid: Option<String>,
    ) -> TokenSet {
        TokenSet {
            scope: client_session.scope_string(),
            client_session,
            access_token,
            refresh_token,
            id_token,
            kid,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.config.oauth.access_token_lifetime.as_secs(),
        }
    }
}

/// `now + lifetime`, or a configuration error if the instant is not representable.
fn expires_after(now: OffsetDateTime, lifetime: Duration) -> AuthResult<OffsetDateTime> {
    time::Duration::try_from(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add(lifetime))
        .ok_or_else(|| {
            AuthError::configuration(format!("lifetime {lifetime:?} overflows the expiry time"))
        })
}

/// Claims recorded for a client credentials token.
fn client_claims(
    issuer: &str,
    client_id: &str,
    scope: &[String],
    now: OffsetDateTime,
    expires_at: OffsetDateTime,
) -> Claims {
    let mut claims = Claims::new();
    claims.insert("iss".into(), issuer.into());
    claims.insert("aud".into(), client_id.into());
    claims.insert("sub".into(), client_id.into());
    claims.insert("iat".into(), now.unix_timestamp().into());
    claims.insert("exp".into(), expires_at.unix_timestamp().into());
    claims.insert("jti".into(), uuid::Uuid::new_v4().to_string().into());
    if !scope.is_empty() {
        claims.insert("scope".into(), scope.join(" ").into());
    }
    claims
}
