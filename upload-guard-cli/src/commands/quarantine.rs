//! Quarantine management CLI commands

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use console::style;
use serde_json::json;
use upload_guard::storage::{QuarantineManager, QuarantineRecord, ReconcileAction};

use super::{CommandContext, INFO, SUCCESS, WARNING};

/// Quarantine management commands
#[derive(Debug, Subcommand)]
pub enum QuarantineCommand {
    /// Move a managed file into quarantine
    Move {
        /// Path of the stored file
        path: PathBuf,

        /// Reason recorded in the sidecar
        #[arg(short, long, default_value = "manual quarantine")]
        reason: String,
    },

    /// List quarantined files, oldest first
    List,

    /// Permanently delete a quarantined file and its record
    Purge {
        /// Path of the quarantined file
        path: PathBuf,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Resolve a quarantine move interrupted part-way
    Reconcile {
        /// Original managed path
        original: PathBuf,

        /// Intended quarantine path
        quarantined: PathBuf,
    },
}

impl QuarantineCommand {
    /// Execute the quarantine command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The quarantine area cannot be opened
    /// - The path is not eligible for the operation
    /// - Moving or deleting a file fails
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        self.run(ctx, &mut std::io::stdin().lock())
    }

    /// Execute the command, reading any confirmation from `input`
    fn run(&self, ctx: &CommandContext, input: &mut impl BufRead) -> Result<()> {
        let manager = QuarantineManager::from_config(&ctx.config)?;

        match self {
            Self::Move { path, reason } => Self::move_file(ctx, &manager, path, reason),
            Self::List => Self::list(ctx, &manager),
            Self::Purge { path, force } => Self::purge(ctx, &manager, path, *force, input),
            Self::Reconcile { original, quarantined } => {
                Self::reconcile(ctx, &manager, original, quarantined)
            }
        }
    }

    fn move_file(ctx: &CommandContext, manager: &QuarantineManager, path: &Path, reason: &str) -> Result<()> {
        let record = manager.quarantine_path(path, reason)?;

        if ctx.json {
            return CommandContext::print_json(&record);
        }
        println!(
            "{} Quarantined {} -> {}",
            SUCCESS,
            style(record.original_path().display()).bold(),
            style(record.quarantine_path().display()).yellow()
        );
        Ok(())
    }

    fn list(ctx: &CommandContext, manager: &QuarantineManager) -> Result<()> {
        let records = manager.list()?;

        if ctx.json {
            return CommandContext::print_json(&records);
        }

        println!("\n{} Quarantine: {}", INFO, style(manager.root().display()).bold());
        println!("{}", "─".repeat(80));
        if records.is_empty() {
            println!("  {}", style("(No quarantined files)").dim());
        }
        for record in &records {
            print_record(record);
        }
        println!();
        Ok(())
    }

    fn purge(
        ctx: &CommandContext,
        manager: &QuarantineManager,
        path: &Path,
        force: bool,
        input: &mut impl BufRead,
    ) -> Result<()> {
        if !force && !ctx.json {
            println!(
                "{} This will permanently delete {}.",
                style("Warning:").yellow(),
                style(path.display()).bold()
            );
            println!("Are you sure? (y/N): ");

            let mut answer = String::new();
            input
                .read_line(&mut answer)
                .context("Failed to read input")?;

            if !answer.trim().eq_ignore_ascii_case("y") {
                println!("Cancelled.");
                return Ok(());
            }
        }

        manager.purge(path)?;

        if ctx.json {
            return CommandContext::print_json(&json!({ "purged": path }));
        }
        println!("{} Purged {}", SUCCESS, style(path.display()).bold());
        Ok(())
    }

    fn reconcile(
        ctx: &CommandContext,
        manager: &QuarantineManager,
        original: &Path,
        quarantined: &Path,
    ) -> Result<()> {
        let action = manager.reconcile(original, quarantined)?;

        if ctx.json {
            return CommandContext::print_json(&json!({ "action": action }));
        }
        let message = match action {
            ReconcileAction::AlreadyQuarantined => "File is already quarantined; nothing to do",
            ReconcileAction::RemovedOriginal => "Quarantine copy verified; removed the original",
            ReconcileAction::DiscardedPartialCopy => "Quarantine copy was partial; removed it, original kept",
            ReconcileAction::NotQuarantined => "File was never moved; nothing to do",
        };
        let marker = if action == ReconcileAction::DiscardedPartialCopy { WARNING } else { SUCCESS };
        println!("{marker} {message}");
        Ok(())
    }
}

fn print_record(record: &QuarantineRecord) {
    println!(
        "{}  {}",
        style(record.quarantined_at().format("%Y-%m-%d %H:%M:%S")).cyan(),
        style(record.quarantine_path().display()).bold()
    );
    println!("    from:   {}", record.original_path().display());
    println!("    reason: {}", record.reason());
}
