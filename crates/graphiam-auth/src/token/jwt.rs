//! JWT signing primitives and key material.
//!
//! This module knows how to generate key pairs, serialize them for storage
//! and turn them back into `jsonwebtoken` keys. It holds no state: which key
//! signs what is decided by [`crate::keys::SigningKeyManager`].
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA with SHA-256 (widely compatible)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve (default, smaller keys)
//!
//! Private keys are stored as PKCS#8 PEM, public keys as a JWK document.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use elliptic_curve::sec1::ToEncodedPoint;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthError;

/// Claim set carried by signed tokens.
pub type Claims = Map<String, Value>;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Self::TokenExpired,
            JwtError::DecodingError { .. }
            | JwtError::InvalidSignature
            | JwtError::InvalidClaims { .. } => Self::invalid_token(err.to_string()),
            JwtError::EncodingError { .. }
            | JwtError::KeyGenerationError { .. }
            | JwtError::InvalidKey { .. } => Self::internal(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256 (widely compatible).
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Parses an algorithm name as used in JWT headers.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Creates a new empty JWKS.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Adds a key to the set.
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// Finds a key by id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// JSON Web Key (public part only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Builds a verification key from the public components.
    ///
    /// # Errors
    /// Returns an error if a component required by `kty` is missing or invalid.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, JwtError> {
        let missing = |field: &str| JwtError::invalid_key(format!("JWK {} missing '{field}'", self.kid));
        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = self.e.as_deref().ok_or_else(|| missing("e"))?;
                DecodingKey::from_rsa_components(n, e).map_err(JwtError::from)
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = self.y.as_deref().ok_or_else(|| missing("y"))?;
                DecodingKey::from_ec_components(x, y).map_err(JwtError::from)
            }
            other => Err(JwtError::invalid_key(format!("Unsupported key type: {other}"))),
        }
    }

    /// Parses a JWK from its stored JSON form.
    ///
    /// # Errors
    /// Returns an error if the document is not a JWK.
    pub fn from_json(json: &str) -> Result<Self, JwtError> {
        serde_json::from_str(json).map_err(|e| JwtError::invalid_key(e.to_string()))
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A private key loaded for signing, together with its public JWK.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// PKCS#8 PEM of the private key, as persisted.
    private_pem: String,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Public key data for JWKS export.
    public_key_data: PublicKeyData,
}

/// Internal representation of public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a fresh key pair for the algorithm with a random key id.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    /// Generates a new RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pkcs8_pem(uuid::Uuid::new_v4().to_string(), algorithm, &private_pem)
    }

    /// Generates a new EC key pair using P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pkcs8_pem(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::ES384,
            &private_pem,
        )
    }

    /// Loads a key pair from a stored PKCS#8 PEM private key.
    ///
    /// The public half is derived from the private key.
    ///
    /// # Errors
    /// Returns an error if the PEM data does not match the algorithm.
    pub fn from_pkcs8_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, public_key_data) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;

            let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let n = private_key.n().to_bytes_be();
            let e = private_key.e().to_bytes_be();

            (encoding_key, PublicKeyData::Rsa { n, e })
        } else {
            let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;

            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let point = secret_key.public_key().to_encoded_point(false);
            let x = point
                .x()
                .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
            let y = point
                .y()
                .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

            (
                encoding_key,
                PublicKeyData::Ec {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            private_pem: private_pem.to_string(),
            encoding_key,
            public_key_data,
        })
    }

    /// Returns the PKCS#8 PEM of the private key.
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        &self.private_pem
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }

    /// Signs a claim set, putting this key's id in the header.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }
}

/// Returns the `kid` from a token header without verifying anything.
///
/// # Errors
/// Returns an error if the header cannot be parsed.
pub fn token_kid(token: &str) -> Result<Option<String>, JwtError> {
    let header = jsonwebtoken::decode_header(token)?;
    Ok(header.kid)
}

/// Verifies a token's signature and time claims and returns its claims.
///
/// No claim is required: `exp` and `nbf` are only checked when present, and
/// audience checks belong to the caller.
///
/// # Errors
/// Returns an error if the signature does not verify or the token is expired.
pub fn verify_token(
    token: &str,
    algorithm: SigningAlgorithm,
    key: &DecodingKey,
) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(algorithm.to_jwt_algorithm());
    validation.required_spec_claims.clear();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;

    let data = decode::<Claims>(token, key, &validation)?;
    Ok(data.claims)
}

// ============================================================================
// Tests
// ============================================================================
