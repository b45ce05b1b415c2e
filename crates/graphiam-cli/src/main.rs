mod cli;
mod commands;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands, KeysCommands};
use output::print_error;

fn main() {
    if let Err(e) = run() {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::CheckConfig(args) => commands::config::check_config(&args.file, format)?,
        Commands::ValidateFlows(args) => commands::flows::validate_flows(args, format)?,
        Commands::Keys(args) => match &args.command {
            KeysCommands::Generate(generate) => commands::keys::generate(generate, format)?,
        },
    }

    Ok(())
}
