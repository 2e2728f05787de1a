//! upload-guard CLI tool

#![forbid(unsafe_code)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::multiple_crate_versions)]

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{CommandContext, QuarantineCommand, StatusCommand, StoreCommand, SweepCommand, ValidateCommand};
use upload_guard::config::UploadConfig;

#[derive(Debug, Parser)]
#[command(name = "upload-guard")]
#[command(version)]
#[command(about = "Validate, store and quarantine untrusted uploads", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./upload-guard.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate files without storing them
    Validate(ValidateCommand),
    /// Validate, store and scan a file
    Store(StoreCommand),
    /// Manage quarantined files
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommand,
    },
    /// Delete stored files older than the retention window
    Sweep(SweepCommand),
    /// Summarize managed storage, or inspect one file
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    upload_guard::observability::init()?;

    let config = UploadConfig::load(cli.config.as_deref())?;
    let ctx = CommandContext::new(config, cli.json);

    match cli.command {
        Commands::Validate(cmd) => cmd.execute(&ctx)?,
        Commands::Store(cmd) => cmd.execute(&ctx).await?,
        Commands::Quarantine { command } => command.execute(&ctx)?,
        Commands::Sweep(cmd) => cmd.execute(&ctx).await?,
        Commands::Status(cmd) => cmd.execute(&ctx)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["upload-guard", "status", "--json", "-c", "guard.toml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("guard.toml")));
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_quarantine_subcommands_parse() {
        let cli = Cli::try_parse_from(["upload-guard", "quarantine", "move", "uploads/images/a.jpg", "--reason", "manual"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Quarantine {
                command: QuarantineCommand::Move { .. }
            }
        ));

        assert!(Cli::try_parse_from(["upload-guard", "quarantine", "reconcile", "a.jpg"]).is_err());
    }

    #[test]
    fn test_validate_requires_a_file() {
        assert!(Cli::try_parse_from(["upload-guard", "validate"]).is_err());
    }
}
