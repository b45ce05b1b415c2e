//! Token primitives: secret generation, hashing and JWT signing.

pub mod jwt;
pub mod secret;

pub use jwt::{Claims, Jwk, Jwks, JwtError, SigningAlgorithm, SigningKeyPair};
pub use secret::{generate_secret, hash_secret};
