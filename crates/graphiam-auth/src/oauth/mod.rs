//! OAuth 2.0 issuance.
//!
//! - [`pkce`] - RFC 7636 code challenge verification (`S256` only)
//! - [`claims`] - scope-based claims mapping and the stored login snapshot
//! - [`issuance`] - authorization codes, code exchange, refresh, client
//!   credentials, introspection

pub mod claims;
pub mod issuance;
pub mod pkce;

pub use claims::{ClaimsInput, LoginSnapshot, build_claims};
pub use issuance::{
    AuthorizationResponse, ClientAuthentication, CodeExchange, IntrospectionResponse,
    IssuanceManager, TokenSet,
};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier, verify_code_challenge};
