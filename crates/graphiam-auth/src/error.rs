//! Error types for the authentication engine.
//!
//! Every failure the engine can surface is a variant of [`AuthError`], so the
//! transport layer can map errors to HTTP status codes and OAuth 2.0 error
//! responses without inspecting messages. A missing session is not an error:
//! loaders return `Option` instead.

use std::fmt;

/// Errors that can occur while running flows, issuing tokens or managing keys.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The flow graph authored by an operator is malformed.
    #[error("Flow definition error: {message}")]
    FlowDefinition {
        /// Description of what is wrong with the graph.
        message: String,
    },

    /// A single request executed more nodes than the configured maximum.
    #[error("Flow execution limit exceeded after {steps} steps")]
    FlowExecutionLimitExceeded {
        /// Number of steps executed before aborting.
        steps: usize,
    },

    /// No flow exists for the requested id or route.
    #[error("Flow not found: {flow}")]
    FlowNotFound {
        /// The flow id or route that was requested.
        flow: String,
    },

    /// The authorization code or refresh token is invalid, expired, or already used.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// Client authentication failed: unknown client or wrong secret.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client was rejected.
        message: String,
    },

    /// The client may not use this grant or redirect.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of what the client is not allowed to do.
        message: String,
    },

    /// A requested scope is not allowed for the client.
    #[error("Invalid scope: {scope}")]
    InvalidScope {
        /// The rejected scope.
        scope: String,
    },

    /// PKCE code verifier does not match the recorded code challenge.
    #[error("PKCE verification failed")]
    PkceVerificationFailed,

    /// The request is missing a parameter or carries an invalid one.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The user did not authenticate successfully.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The token is malformed or its signature does not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The token's `exp` claim is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The realm has no active signing key.
    #[error("No active signing key for {tenant}/{realm}")]
    NoActiveSigningKey {
        /// Tenant that was asked to sign.
        tenant: String,
        /// Realm that was asked to sign.
        realm: String,
    },

    /// The token names a key id that is not stored for the realm.
    #[error("Unknown signing key: {kid}")]
    UnknownSigningKey {
        /// The key id from the token header.
        kid: String,
    },

    /// The token was signed by a key that was disabled beyond its grace period.
    #[error("Signing key revoked: {kid}")]
    SigningKeyRevoked {
        /// The retired key id.
        kid: String,
    },

    /// Another request saved the same auth session first.
    #[error("Session conflict: {message}")]
    SessionConflict {
        /// Description of the conflicting write.
        message: String,
    },

    /// A storage port failed. Propagated, never retried by the engine.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `FlowDefinition` error.
    #[must_use]
    pub fn flow_definition(message: impl Into<String>) -> Self {
        Self::FlowDefinition {
            message: message.into(),
        }
    }

    /// Creates a new `FlowNotFound` error.
    #[must_use]
    pub fn flow_not_found(flow: impl Into<String>) -> Self {
        Self::FlowNotFound { flow: flow.into() }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(scope: impl Into<String>) -> Self {
        Self::InvalidScope {
            scope: scope.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `NoActiveSigningKey` error.
    #[must_use]
    pub fn no_active_signing_key(tenant: impl Into<String>, realm: impl Into<String>) -> Self {
        Self::NoActiveSigningKey {
            tenant: tenant.into(),
            realm: realm.into(),
        }
    }

    /// Creates a new `UnknownSigningKey` error.
    #[must_use]
    pub fn unknown_signing_key(kid: impl Into<String>) -> Self {
        Self::UnknownSigningKey { kid: kid.into() }
    }

    /// Creates a new `SigningKeyRevoked` error.
    #[must_use]
    pub fn signing_key_revoked(kid: impl Into<String>) -> Self {
        Self::SigningKeyRevoked { kid: kid.into() }
    }

    /// Creates a new `SessionConflict` error.
    #[must_use]
    pub fn session_conflict(message: impl Into<String>) -> Self {
        Self::SessionConflict {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::FlowNotFound { .. }
                | Self::InvalidGrant { .. }
                | Self::InvalidClient { .. }
                | Self::UnauthorizedClient { .. }
                | Self::InvalidScope { .. }
                | Self::PkceVerificationFailed
                | Self::InvalidRequest { .. }
                | Self::AccessDenied { .. }
                | Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::UnknownSigningKey { .. }
                | Self::SigningKeyRevoked { .. }
                | Self::SessionConflict { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::FlowDefinition { .. }
                | Self::FlowExecutionLimitExceeded { .. }
                | Self::NoActiveSigningKey { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if an operator has to fix something for this error to go away.
    #[must_use]
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            Self::FlowDefinition { .. }
                | Self::FlowExecutionLimitExceeded { .. }
                | Self::NoActiveSigningKey { .. }
                | Self::Configuration { .. }
        )
    }

    /// Returns `true` if the presented token is suspicious or stale.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::UnknownSigningKey { .. }
                | Self::SigningKeyRevoked { .. }
        )
    }

    /// Returns a message that is safe to show to an end user.
    ///
    /// Operator and infrastructure errors are replaced by a generic message;
    /// their details belong in logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_server_error() {
            "The server could not complete the request".to_string()
        } else {
            self.to_string()
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FlowDefinition { .. } => ErrorCategory::Flow,
            Self::FlowExecutionLimitExceeded { .. } => ErrorCategory::Flow,
            Self::FlowNotFound { .. } => ErrorCategory::Flow,
            Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::InvalidClient { .. } => ErrorCategory::Authentication,
            Self::UnauthorizedClient { .. } => ErrorCategory::Authorization,
            Self::InvalidScope { .. } => ErrorCategory::Validation,
            Self::PkceVerificationFailed => ErrorCategory::Authentication,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::TokenExpired => ErrorCategory::Token,
            Self::NoActiveSigningKey { .. } => ErrorCategory::Signing,
            Self::UnknownSigningKey { .. } => ErrorCategory::Signing,
            Self::SigningKeyRevoked { .. } => ErrorCategory::Signing,
            Self::SessionConflict { .. } => ErrorCategory::Concurrency,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidClient { .. } => "invalid_client",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::PkceVerificationFailed => "invalid_grant",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::FlowNotFound { .. } => "invalid_request",
            Self::SessionConflict { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidToken { .. } => "invalid_token",
            Self::TokenExpired => "invalid_token",
            Self::UnknownSigningKey { .. } => "invalid_token",
            Self::SigningKeyRevoked { .. } => "invalid_token",
            Self::FlowDefinition { .. }
            | Self::FlowExecutionLimitExceeded { .. }
            | Self::NoActiveSigningKey { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of engine errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Flow graph or flow execution errors.
    Flow,
    /// Authentication-related errors (grant and PKCE checks).
    Authentication,
    /// Authorization-related errors.
    Authorization,
    /// Token validation errors.
    Token,
    /// Signing key lifecycle errors.
    Signing,
    /// Request validation errors.
    Validation,
    /// Concurrent modification of the same record.
    Concurrency,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow => write!(f, "flow"),
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Signing => write!(f, "signing"),
            Self::Validation => write!(f, "validation"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
