use std::path::Path;

use anyhow::{Context, Result};
use graphiam_auth::AuthConfig;

use crate::cli::OutputFormat;
use crate::output::{print_json, print_success, print_table};

pub fn check_config(path: &Path, format: OutputFormat) -> Result<()> {
    let config = AuthConfig::from_toml_file(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            print_table(["Setting", "Value"], settings(&config));
            print_success(&format!("{} is valid", path.display()));
        }
    }
    Ok(())
}

fn settings(config: &AuthConfig) -> Vec<[String; 2]> {
    let row = |key: &str, value: String| [key.to_string(), value];
    vec![
        row("issuer", config.issuer.clone()),
        row(
            "flow.session_lifetime",
            format!("{:?}", config.flow.session_lifetime),
        ),
        row(
            "flow.max_steps_per_request",
            config.flow.max_steps_per_request.to_string(),
        ),
        row(
            "oauth.authorization_code_lifetime",
            format!("{:?}", config.oauth.authorization_code_lifetime),
        ),
        row(
            "oauth.access_token_lifetime",
            format!("{:?}", config.oauth.access_token_lifetime),
        ),
        row(
            "oauth.refresh_token_lifetime",
            format!("{:?}", config.oauth.refresh_token_lifetime),
        ),
        row(
            "oauth.refresh_tokens_enabled",
            config.oauth.refresh_tokens_enabled.to_string(),
        ),
        row("signing.algorithm", config.signing.algorithm.clone()),
        row(
            "signing.verification_grace_period",
            format!("{:?}", config.signing.verification_grace_period),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_settings_cover_every_section() {
        let rows = settings(&AuthConfig::default());
        let keys: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
        assert!(keys.contains(&"issuer"));
        assert!(keys.contains(&"flow.max_steps_per_request"));
        assert!(keys.contains(&"oauth.authorization_code_lifetime"));
        assert!(keys.contains(&"signing.algorithm"));
    }

    #[test]
    fn test_invalid_file_is_reported_with_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[oauth]\nauthorization_code_lifetime = \"15m\"").unwrap();

        let err = check_config(file.path(), OutputFormat::Json).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }
}
