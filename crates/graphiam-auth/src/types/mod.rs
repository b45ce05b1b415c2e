//! Domain types shared by the engine components.
//!
//! - [`FlowDefinition`], [`GraphNode`], [`Flow`] - authentication graphs
//! - [`AuthSession`], [`FlowResult`], [`AuthLevel`] - flow execution state
//! - [`AuthorizeRequest`], [`Oauth2Session`] - OAuth 2.0 context of a login
//! - [`Application`] - a registered OAuth 2.0 client
//! - [`ClientSession`] - one OAuth 2.0 grant
//! - [`SigningKey`] - stored token signing key
//! - [`User`] - user attributes used for claims

pub mod application;
pub mod client_session;
pub mod flow;
pub mod session;
pub mod signing_key;
pub mod user;

pub use application::Application;
pub use client_session::{ClientSession, ClientSessionStage, GrantType};
pub use flow::{Flow, FlowDefinition, GraphNode};
pub use session::{
    AuthLevel, AuthSession, AuthorizeRequest, FlowResult, Oauth2Session, Prompts, SessionState,
};
pub use signing_key::{KeyImplementation, SigningKey};
pub use user::User;
