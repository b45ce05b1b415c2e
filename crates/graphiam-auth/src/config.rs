//! Engine configuration.
//!
//! Lifetimes are written as human-readable durations (`"30m"`, `"10m"`,
//! `"24h"`) and every section falls back to its defaults, so an empty TOML
//! document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::jwt::SigningAlgorithm;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Upper bounds for configured lifetimes.
const MAX_SESSION_LIFETIME: Duration = Duration::from_secs(DAY);
const MAX_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(DAY);
const MAX_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * DAY);
const MAX_VERIFICATION_GRACE_PERIOD: Duration = Duration::from_secs(30 * DAY);

/// Root engine configuration.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://id.example.com"
///
/// [flow]
/// session_lifetime = "30m"
/// max_steps_per_request = 100
///
/// [oauth]
/// authorization_code_lifetime = "5m"
/// access_token_lifetime = "1h"
///
/// [signing]
/// algorithm = "ES384"
/// verification_grace_period = "24h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base issuer URL. The per-realm issuer is `{issuer}/{tenant}/{realm}`.
    pub issuer: String,

    /// Flow interpreter and auth session settings.
    pub flow: FlowConfig,

    /// OAuth 2.0 issuance settings.
    pub oauth: OAuthConfig,

    /// Token signing settings.
    pub signing: SigningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            flow: FlowConfig::default(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// Flow interpreter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// How long an auth session stays resumable after it is created.
    #[serde(with = "humantime_serde")]
    pub session_lifetime: Duration,

    /// Maximum node executions in a single start or resume call.
    pub max_steps_per_request: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            session_lifetime: Duration::from_secs(30 * 60),
            max_steps_per_request: 100,
        }
    }
}

/// OAuth 2.0 configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime. Must stay below ten minutes.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a refresh token alongside every access token.
    pub refresh_tokens_enabled: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(5 * 60),
            access_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            refresh_tokens_enabled: true,
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Algorithm for newly generated keys: RS256, RS384, or ES384.
    pub algorithm: String,

    /// How long a disabled key keeps verifying tokens it signed.
    #[serde(with = "humantime_serde")]
    pub verification_grace_period: Duration,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "ES384".to_string(),
            verification_grace_period: Duration::from_secs(24 * 3600),
        }
    }
}

impl SigningConfig {
    /// Returns the parsed signing algorithm.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unsupported algorithm name.
    pub fn signing_algorithm(&self) -> Result<SigningAlgorithm, ConfigError> {
        SigningAlgorithm::parse(&self.algorithm).ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
                self.algorithm
            ))
        })
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(String),
}

impl From<ConfigError> for crate::AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl AuthConfig {
    /// Parses and validates a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and any error from
    /// [`AuthConfig::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Returns the issuer for a tenant/realm pair.
    #[must_use]
    pub fn realm_issuer(&self, tenant: &str, realm: &str) -> String {
        format!("{}/{}/{}", self.issuer.trim_end_matches('/'), tenant, realm)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is empty or not an absolute URL
    /// - The signing algorithm is not supported
    /// - A lifetime or the step limit is zero
    /// - A lifetime or the grace period exceeds its upper bound
    /// - The authorization code lifetime is ten minutes or more
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        url::Url::parse(&self.issuer).map_err(|e| {
            ConfigError::InvalidValue(format!("issuer '{}' is not a URL: {e}", self.issuer))
        })?;

        self.signing.signing_algorithm()?;

        if self.flow.max_steps_per_request == 0 {
            return Err(ConfigError::InvalidValue(
                "flow.max_steps_per_request must be > 0".to_string(),
            ));
        }

        let lifetimes = [
            ("flow.session_lifetime", self.flow.session_lifetime),
            (
                "oauth.authorization_code_lifetime",
                self.oauth.authorization_code_lifetime,
            ),
            ("oauth.access_token_lifetime", self.oauth.access_token_lifetime),
            (
                "oauth.refresh_token_lifetime",
                self.oauth.refresh_token_lifetime,
            ),
        ];
        for (name, lifetime) in lifetimes {
            if lifetime.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        let bounded = [
            (
                "flow.session_lifetime",
                self.flow.session_lifetime,
                MAX_SESSION_LIFETIME,
            ),
            (
                "oauth.access_token_lifetime",
                self.oauth.access_token_lifetime,
                MAX_ACCESS_TOKEN_LIFETIME,
            ),
            (
                "oauth.refresh_token_lifetime",
                self.oauth.refresh_token_lifetime,
                MAX_REFRESH_TOKEN_LIFETIME,
            ),
            (
                "signing.verification_grace_period",
                self.signing.verification_grace_period,
                MAX_VERIFICATION_GRACE_PERIOD,
            ),
        ];
        for (name, value, max) in bounded {
            if value > max {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must not exceed {}s",
                    max.as_secs()
                )));
            }
        }

        if self.oauth.authorization_code_lifetime >= Duration::from_secs(10 * 60) {
            return Err(ConfigError::InvalidValue(
                "oauth.authorization_code_lifetime must be less than 10 minutes".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:8080");
        assert_eq!(config.flow.session_lifetime, Duration::from_secs(1800));
        assert_eq!(config.flow.max_steps_per_request, 100);
        assert!(config.oauth.refresh_tokens_enabled);
        assert_eq!(config.signing.algorithm, "ES384");
    }

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_relative_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = "id.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_invalid_algorithm_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "HS256".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_valid_algorithms() {
        for alg in ["RS256", "RS384", "ES384"] {
            let mut config = AuthConfig::default();
            config.signing.algorithm = alg.to_string();
            assert!(config.validate().is_ok(), "{alg} should be accepted");
        }
    }

    #[test]
    fn test_zero_step_limit_fails_validation() {
        let mut config = AuthConfig::default();
        config.flow.max_steps_per_request = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_long_code_lifetime_fails_validation() {
        let mut config = AuthConfig::default();
        config.oauth.authorization_code_lifetime = Duration::from_secs(600);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("authorization_code_lifetime"));
    }

    #[test]
    fn test_zero_grace_period_is_allowed() {
        let mut config = AuthConfig::default();
        config.signing.verification_grace_period = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unbounded_lifetimes_fail_validation() {
        let err = AuthConfig::from_toml_str("[oauth]\nrefresh_token_lifetime = \"10000years\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("oauth.refresh_token_lifetime"));

        let err = AuthConfig::from_toml_str("[oauth]\naccess_token_lifetime = \"2days\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("oauth.access_token_lifetime"));

        let err = AuthConfig::from_toml_str("[flow]\nsession_lifetime = \"25h\"\n").unwrap_err();
        assert!(err.to_string().contains("flow.session_lifetime"));

        let err = AuthConfig::from_toml_str("[signing]\nverification_grace_period = \"31days\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("verification_grace_period"));
        assert!(matches!(
            crate::AuthError::from(err),
            crate::AuthError::Configuration { .. }
        ));
    }

    #[test]
    fn test_upper_bounds_are_inclusive() {
        let mut config = AuthConfig::default();
        config.flow.session_lifetime = MAX_SESSION_LIFETIME;
        config.oauth.access_token_lifetime = MAX_ACCESS_TOKEN_LIFETIME;
        config.oauth.refresh_token_lifetime = MAX_REFRESH_TOKEN_LIFETIME;
        config.signing.verification_grace_period = MAX_VERIFICATION_GRACE_PERIOD;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = AuthConfig::from_toml_str(
            r#"
            issuer = "https://id.example.com/"

            [flow]
            session_lifetime = "15m"

            [oauth]
            authorization_code_lifetime = "2m"
            refresh_tokens_enabled = false

            [signing]
            algorithm = "RS256"
            verification_grace_period = "12h"
            "#,
        )
        .unwrap();

        assert_eq!(config.flow.session_lifetime, Duration::from_secs(900));
        assert_eq!(config.flow.max_steps_per_request, 100);
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(120)
        );
        assert!(!config.oauth.refresh_tokens_enabled);
        assert_eq!(
            config.signing.signing_algorithm().unwrap(),
            SigningAlgorithm::RS256
        );
        assert_eq!(
            config.realm_issuer("acme", "staff"),
            "https://id.example.com/acme/staff"
        );
    }

    #[test]
    fn test_from_toml_str_rejects_garbage() {
        let err = AuthConfig::from_toml_str("issuer = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AuthConfig::from_toml_str("").unwrap();
        assert_eq!(config.signing.algorithm, "ES384");
    }
}
