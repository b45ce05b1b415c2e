//! # graphiam-auth
//!
//! Authentication flow and token issuance engine for GraphIAM.
//!
//! This crate provides:
//! - A flow interpreter that walks graph-shaped login journeys
//! - Resumable auth sessions with optimistic concurrency
//! - OAuth 2.0 authorization codes, token exchange, refresh and client
//!   credentials, checked against each registered application
//! - Per-realm signing keys with additive rotation
//!
//! ## Overview
//!
//! ```text
//! FlowInterpreter ──► AuthSession ──► FlowResult ──► IssuanceManager ──► ClientSession
//!                     (AuthSessionManager)                 │
//!                                                          ▼
//!                                                  SigningKeyManager
//! ```
//!
//! Persistence is abstracted behind the traits in [`storage`]; node types are
//! supplied by the embedding application through [`flow::NodeRegistry`].
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - Error taxonomy
//! - [`flow`] - Flow interpreter, node executors and flow loading
//! - [`session`] - Auth session state machine
//! - [`oauth`] - OAuth 2.0 issuance and PKCE
//! - [`keys`] - Signing key lifecycle
//! - [`token`] - JWT signing primitives and secret hashing
//! - [`storage`] - Storage traits
//! - [`types`] - Domain types

pub mod config;
pub mod error;
pub mod flow;
pub mod keys;
pub mod oauth;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use flow::{
    FlowDocument, FlowInterpreter, FlowSelector, FlowStart, NodeContext, NodeError, NodeExecutor,
    NodeOutcome, NodeRegistry,
};
pub use keys::SigningKeyManager;
pub use oauth::{
    AuthorizationResponse, ClientAuthentication, CodeExchange, IntrospectionResponse,
    IssuanceManager, TokenSet,
};
pub use session::AuthSessionManager;
pub use storage::{
    ApplicationStorage, AuthSessionStorage, ClientSessionStorage, FlowDefinitionStorage,
    SigningKeyStorage, UserStorage,
};
pub use token::{Claims, Jwk, Jwks, JwtError, SigningAlgorithm};
pub use types::{
    Application, AuthLevel, AuthSession, AuthorizeRequest, ClientSession, Flow, FlowDefinition,
    FlowResult, GraphNode, Oauth2Session, SessionState, SigningKey, User,
};

/// Type alias for engine results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use graphiam_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::flow::{
        FlowInterpreter, FlowSelector, FlowStart, NodeContext, NodeError, NodeExecutor,
        NodeOutcome, NodeRegistry,
    };
    pub use crate::keys::SigningKeyManager;
    pub use crate::oauth::{ClientAuthentication, CodeExchange, IssuanceManager, TokenSet};
    pub use crate::session::AuthSessionManager;
    pub use crate::storage::{
        ApplicationStorage, AuthSessionStorage, ClientSessionStorage, FlowDefinitionStorage,
        SigningKeyStorage, UserStorage,
    };
    pub use crate::types::{
        Application, AuthLevel, AuthSession, AuthorizeRequest, ClientSession, Flow, FlowDefinition,
        FlowResult, GraphNode, Oauth2Session, Prompts, SessionState, SigningKey, User,
    };
}
