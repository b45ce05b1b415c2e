//! PKCE (Proof Key for Code Exchange) support.
//!
//! Implements RFC 7636 with the `S256` method only. The `plain` method is
//! rejected when the authorization request is validated, so every recorded
//! challenge is a base64url SHA-256 digest.
//!
//! Verification recomputes the challenge from the presented verifier and
//! compares in constant time.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE validation.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Code verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Code verifier contains characters outside `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters: must be URL-safe ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Code challenge is not valid base64url.
    #[error("Invalid challenge format: must be valid base64url")]
    InvalidChallengeFormat,

    /// Challenge method other than S256.
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// No verifier was presented for a code bound to a challenge.
    #[error("code_verifier is required for this authorization code")]
    MissingVerifier,

    /// The verifier does not hash to the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidChallengeFormat | Self::UnsupportedMethod(_) => "invalid_request",
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::MissingVerifier
            | Self::VerificationFailed => "invalid_grant",
        }
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::InvalidChallengeFormat | PkceError::UnsupportedMethod(_) => {
                Self::invalid_request(err.to_string())
            }
            // A bad verifier on a bound code is a failed proof, whatever its shape.
            PkceError::InvalidVerifierLength(_)
            | PkceError::InvalidVerifierCharacters
            | PkceError::MissingVerifier
            | PkceError::VerificationFailed => Self::PkceVerificationFailed,
        }
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash of the verifier, base64url-encoded without padding.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parses a challenge method string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything but `"S256"`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" => Err(PkceError::UnsupportedMethod(
                "plain (not accepted by this server)".to_string(),
            )),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Returns the method name as used in requests.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// A validated PKCE code verifier.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Validates a verifier string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is outside 43-128 or a character is
    /// not an RFC 3986 unreserved character.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generates a random verifier (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the verifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// A PKCE code challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Computes the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let hash = Sha256::digest(verifier.0.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hash))
    }

    /// Wraps a challenge received from a client.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if it is not base64url.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        if challenge.is_empty() || URL_SAFE_NO_PAD.decode(&challenge).is_err() {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge))
    }

    /// Verifies a verifier against this challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        let expected = Self::from_verifier(verifier);
        if bool::from(self.0.as_bytes().ct_eq(expected.0.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Returns the challenge string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks a presented verifier against a recorded challenge and method.
///
/// # Errors
///
/// Fails if the method is unsupported, the verifier is absent or malformed,
/// or it does not hash to the challenge.
pub fn verify_code_challenge(
    challenge: &str,
    method: &str,
    verifier: Option<&str>,
) -> Result<(), PkceError> {
    let PkceChallengeMethod::S256 = PkceChallengeMethod::parse(method)?;
    let verifier = verifier.ok_or(PkceError::MissingVerifier)?;
    let verifier = PkceVerifier::new(verifier.to_string())?;
    PkceChallenge(challenge.to_string()).verify(&verifier)
}

// =============================================================================
// Tests
// =============================================================================
