//! Storage ports consumed by the engine.
//!
//! One trait per entity:
//!
//! - [`ApplicationStorage`] - registered OAuth 2.0 clients
//! - [`AuthSessionStorage`] - resumable flow executions
//! - [`ClientSessionStorage`] - OAuth 2.0 grants
//! - [`SigningKeyStorage`] - token signing keys
//! - [`FlowDefinitionStorage`] - authentication graphs
//! - [`UserStorage`] - users
//!
//! Every call is scoped by tenant and realm. "Not found" is `Ok(None)`;
//! backend failures are `AuthError::Storage` and are never retried by the
//! engine.
//!
//! # Implementations
//!
//! - `graphiam-auth-memory` - concurrent in-memory maps

pub mod application;
pub mod auth_session;
pub mod client_session;
pub mod flow;
pub mod signing_key;
pub mod user;

pub use application::ApplicationStorage;
pub use auth_session::AuthSessionStorage;
pub use client_session::ClientSessionStorage;
pub use flow::FlowDefinitionStorage;
pub use signing_key::SigningKeyStorage;
pub use user::UserStorage;
