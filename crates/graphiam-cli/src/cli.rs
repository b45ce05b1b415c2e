use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "graphiam")]
#[command(about = "GraphIAM operator tooling: check configuration, flows and keys")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "GRAPHIAM_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate an engine configuration file
    CheckConfig(CheckConfigArgs),
    /// Load and validate every flow document in a directory
    ValidateFlows(ValidateFlowsArgs),
    /// Manage signing keys
    Keys(KeysArgs),
}

#[derive(clap::Args)]
pub struct CheckConfigArgs {
    /// Path to the TOML configuration file
    pub file: PathBuf,
}

#[derive(clap::Args)]
pub struct ValidateFlowsArgs {
    /// Directory containing *.toml / *.json flow documents
    pub dir: PathBuf,

    /// Node types provided by the deployment, in addition to the built-in ones
    #[arg(long = "node-types", value_delimiter = ',')]
    pub node_types: Vec<String>,
}

#[derive(clap::Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommands,
}

#[derive(Subcommand)]
pub enum KeysCommands {
    /// Generate a signing key pair and print its public JWK
    Generate(GenerateKeyArgs),
}

#[derive(clap::Args)]
pub struct GenerateKeyArgs {
    /// Signing algorithm (RS256, RS384, ES384)
    #[arg(short, long, default_value = "ES384")]
    pub algorithm: String,

    /// Write the PKCS#8 private key PEM to this file
    #[arg(long)]
    pub private_key_out: Option<PathBuf>,
}
