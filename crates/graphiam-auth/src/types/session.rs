//! Auth sessions and flow results.
//!
//! An [`AuthSession`] is the durable record of one flow execution. It is
//! created when a flow starts, mutated once per node transition and frozen
//! once it carries either a [`FlowResult`] or an error.
//!
//! # States
//!
//! The state is derived, never stored:
//!
//! | `error` | `result` | `prompts`  | state           |
//! |---------|----------|------------|-----------------|
//! | set     | any      | any        | `Failed`        |
//! | unset   | set      | any        | `Completed`     |
//! | unset   | unset    | non-empty  | `AwaitingInput` |
//! | unset   | unset    | empty      | `Pending`       |

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::user::User;
use crate::oauth::pkce::PkceChallengeMethod;
use crate::{AuthError, AuthResult};

/// Pending UI prompts: input name → prompt type or label.
pub type Prompts = HashMap<String, String>;

/// Ordinal strength of the authentication a flow achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum AuthLevel {
    /// Not authenticated.
    #[default]
    #[serde(rename = "0")]
    None,
    /// One factor verified.
    #[serde(rename = "1")]
    SingleFactor,
    /// Two or more factors verified.
    #[serde(rename = "2")]
    MultiFactor,
}

impl AuthLevel {
    /// Parses the wire form (`"0"`, `"1"`, `"2"`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::None),
            "1" => Some(Self::SingleFactor),
            "2" => Some(Self::MultiFactor),
            _ => None,
        }
    }

    /// Returns the wire form, also used as the `acr` claim.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "0",
            Self::SingleFactor => "1",
            Self::MultiFactor => "2",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal artifact of a flow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResult {
    /// Authenticated user id (empty when unauthenticated).
    pub user_id: String,

    /// Authenticated username (empty when unauthenticated).
    pub username: String,

    /// Whether the flow ended in a successful authentication.
    pub authenticated: bool,

    /// Strength of the authentication.
    pub auth_level: AuthLevel,

    /// Name of the flow definition that produced this result.
    pub flow_name: String,
}

impl FlowResult {
    /// A successful result for a user.
    #[must_use]
    pub fn authenticated(user: &User, auth_level: AuthLevel) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            authenticated: true,
            auth_level,
            flow_name: String::new(),
        }
    }

    /// A result for a flow that ended without authenticating anyone.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            user_id: String::new(),
            username: String::new(),
            authenticated: false,
            auth_level: AuthLevel::None,
            flow_name: String::new(),
        }
    }
}

/// The OAuth 2.0 authorization request that triggered a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// Requesting client.
    pub client_id: String,

    /// Redirect URI the response goes to.
    pub redirect_uri: String,

    /// Must be `"code"`.
    pub response_type: String,

    /// Requested scopes.
    #[serde(default)]
    pub scope: Vec<String>,

    /// Opaque client state echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// PKCE code challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method; only `"S256"` is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// OIDC nonce copied into the ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// OIDC prompt parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// OIDC max_age parameter in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,

    /// Requested authentication context classes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acr_values: Vec<String>,
}

impl AuthorizeRequest {
    /// Creates a `response_type=code` request.
    #[must_use]
    pub fn code(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            response_type: "code".to_string(),
            scope: Vec::new(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
            prompt: None,
            max_age: None,
            acr_values: Vec::new(),
        }
    }

    /// Returns `true` if the scope list contains `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    /// Checks that the request can be answered with an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` if the client id or redirect URI is
    /// empty, the response type is not `code`, or the PKCE parameters are
    /// inconsistent (`plain` is always rejected).
    pub fn validate_for_code(&self) -> AuthResult<Option<PkceChallengeMethod>> {
        if self.client_id.is_empty() {
            return Err(AuthError::invalid_request("client_id is required"));
        }
        if self.redirect_uri.is_empty() {
            return Err(AuthError::invalid_request("redirect_uri is required"));
        }
        if self.response_type != "code" {
            return Err(AuthError::invalid_request(format!(
                "unsupported response_type '{}'",
                self.response_type
            )));
        }

        match (&self.code_challenge, &self.code_challenge_method) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(AuthError::invalid_request(
                "code_challenge_method is required with code_challenge",
            )),
            (None, Some(_)) => Err(AuthError::invalid_request(
                "code_challenge_method given without code_challenge",
            )),
            (Some(challenge), Some(method)) => {
                let method = PkceChallengeMethod::parse(method)
                    .map_err(|e| AuthError::invalid_request(e.to_string()))?;
                crate::oauth::pkce::PkceChallenge::new(challenge.clone())
                    .map_err(|e| AuthError::invalid_request(e.to_string()))?;
                Ok(Some(method))
            }
        }
    }
}

/// OAuth 2.0 context carried by a login that an authorize call started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oauth2Session {
    /// The original authorization request.
    pub authorize_request: AuthorizeRequest,

    /// When the user finished authenticating.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub auth_time: Option<OffsetDateTime>,

    /// Achieved authentication context class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
}

impl Oauth2Session {
    /// Wraps an authorization request.
    #[must_use]
    pub fn new(authorize_request: AuthorizeRequest) -> Self {
        Self {
            authorize_request,
            auth_time: None,
            acr: None,
        }
    }
}

/// Derived state of an [`AuthSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Running, no input requested.
    Pending,
    /// Suspended until the caller resumes with input.
    AwaitingInput,
    /// Terminal with a result.
    Completed,
    /// Terminal with an error.
    Failed,
}

impl SessionState {
    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Durable, resumable record of one flow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Execution identity.
    pub run_id: String,

    /// SHA-256 of the client-visible session handle.
    pub session_id_hash: String,

    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// Flow being executed.
    pub flow_id: String,

    /// Node that runs next.
    pub current: String,

    /// Accumulated inputs and node outputs. Keys are never removed.
    #[serde(default)]
    pub context: HashMap<String, String>,

    /// Executed node names, in order. Append-only.
    #[serde(default)]
    pub history: Vec<String>,

    /// Failure description; terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Flow outcome; terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FlowResult>,

    /// User bound by a node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Prompts the caller must answer before resuming.
    #[serde(default)]
    pub prompts: Prompts,

    /// OAuth 2.0 context, if an authorize call started this login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<Oauth2Session>,

    /// Optimistic concurrency counter; 0 means never saved.
    #[serde(default)]
    pub version: u64,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// After this instant the session behaves as if it did not exist.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthSession {
    /// Creates a fresh session positioned at the flow's start node.
    #[must_use]
    pub fn new(
        tenant: impl Into<String>,
        realm: impl Into<String>,
        flow_id: impl Into<String>,
        session_id_hash: impl Into<String>,
        start: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        let lifetime = time::Duration::try_from(lifetime).unwrap_or(time::Duration::MAX);
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            session_id_hash: session_id_hash.into(),
            tenant: tenant.into(),
            realm: realm.into(),
            flow_id: flow_id.into(),
            current: start.into(),
            context: HashMap::new(),
            history: Vec::new(),
            error: None,
            result: None,
            user: None,
            prompts: Prompts::new(),
            oauth2: None,
            version: 0,
            created_at: now,
            expires_at: now.saturating_add(lifetime),
        }
    }

    /// Returns the derived state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.error.is_some() {
            SessionState::Failed
        } else if self.result.is_some() {
            SessionState::Completed
        } else if !self.prompts.is_empty() {
            SessionState::AwaitingInput
        } else {
            SessionState::Pending
        }
    }

    /// Returns `true` once a result or an error is recorded.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns `true` if the session is past its deadline at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the session is past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the session belongs to the tenant/realm.
    #[must_use]
    pub fn is_scoped_to(&self, tenant: &str, realm: &str) -> bool {
        self.tenant == tenant && self.realm == realm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_session() -> AuthSession {
        AuthSession::new(
            "acme",
            "staff",
            "login",
            "hash",
            "init",
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_oversized_lifetime_saturates() {
        let session = AuthSession::new("acme", "staff", "login", "hash", "init", Duration::MAX);
        assert!(session.expires_at > session.created_at);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_auth_level_ordering_and_wire_form() {
        assert!(AuthLevel::MultiFactor > AuthLevel::SingleFactor);
        assert!(AuthLevel::SingleFactor > AuthLevel::None);
        assert_eq!(AuthLevel::parse("2"), Some(AuthLevel::MultiFactor));
        assert_eq!(AuthLevel::parse("3"), None);
        assert_eq!(
            serde_json::to_string(&AuthLevel::SingleFactor).unwrap(),
            "\"1\""
        );
    }

    #[test]
    fn test_state_derivation() {
        let mut session = create_test_session();
        assert_eq!(session.state(), SessionState::Pending);

        session.prompts.insert("password".into(), "password".into());
        assert_eq!(session.state(), SessionState::AwaitingInput);

        session.result = Some(FlowResult::unauthenticated());
        assert_eq!(session.state(), SessionState::Completed);

        session.error = Some("boom".into());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.is_terminal());
    }

    #[test]
    fn test_expiry() {
        let session = create_test_session();
        assert!(!session.is_expired());
        assert!(session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + time::Duration::seconds(1)));
    }

    #[test]
    fn test_new_session_is_unsaved() {
        let session = create_test_session();
        assert_eq!(session.version, 0);
        assert_eq!(session.current, "init");
        assert!(session.history.is_empty());
        assert!(session.is_scoped_to("acme", "staff"));
        assert!(!session.is_scoped_to("acme", "other"));
    }

    #[test]
    fn test_validate_for_code() {
        let request = AuthorizeRequest::code("app", "https://app.example.com/cb");
        assert_eq!(request.validate_for_code().unwrap(), None);

        let mut pkce = request.clone();
        pkce.code_challenge = Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into());
        pkce.code_challenge_method = Some("S256".into());
        assert_eq!(
            pkce.validate_for_code().unwrap(),
            Some(PkceChallengeMethod::S256)
        );

        let mut plain = pkce.clone();
        plain.code_challenge_method = Some("plain".into());
        assert!(matches!(
            plain.validate_for_code(),
            Err(AuthError::InvalidRequest { .. })
        ));

        let mut no_method = pkce.clone();
        no_method.code_challenge_method = None;
        assert!(no_method.validate_for_code().is_err());

        let mut token = request.clone();
        token.response_type = "token".into();
        assert!(token.validate_for_code().is_err());
    }

    #[test]
    fn test_session_serialization() {
        let mut session = create_test_session();
        session.oauth2 = Some(Oauth2Session::new(AuthorizeRequest::code(
            "app",
            "https://app.example.com/cb",
        )));
        let json = serde_json::to_string(&session).unwrap();
        let parsed: AuthSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }
}
