//! Signing key lifecycle.

pub mod manager;

pub use manager::SigningKeyManager;
