//! Retention sweep command

use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use tracing::info;
use upload_guard::config::UploadConfig;
use upload_guard::jobs::{CancellationToken, RetentionJob};
use upload_guard::storage::{RetentionSweeper, SweepReport};

use super::{CommandContext, INFO, SUCCESS, WARNING};

/// Delete stored files older than the retention window
#[derive(Debug, Args)]
pub struct SweepCommand {
    /// List expired files without deleting them
    #[arg(long, conflicts_with = "schedule")]
    pub dry_run: bool,

    /// Keep running and sweep on `retention_schedule` until interrupted
    #[arg(long)]
    pub schedule: bool,
}

impl SweepCommand {
    /// Execute the sweep command
    ///
    /// # Errors
    ///
    /// Returns an error if the retention schedule is invalid or the sweep task fails.
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if self.schedule {
            return Self::run_scheduled(ctx).await;
        }

        let report = self.sweep_once(&ctx.config).await?;

        if ctx.json {
            return CommandContext::print_json(&report);
        }
        print_report(&report, self.dry_run);
        Ok(())
    }

    async fn sweep_once(&self, config: &UploadConfig) -> Result<SweepReport> {
        let sweeper = RetentionSweeper::from_config(config);
        let dry_run = self.dry_run;
        let report = tokio::task::spawn_blocking(move || {
            if dry_run {
                sweeper.expired_at(SystemTime::now())
            } else {
                sweeper.sweep()
            }
        })
        .await?;
        Ok(report)
    }

    async fn run_scheduled(ctx: &CommandContext) -> Result<()> {
        let job = RetentionJob::from_config(&ctx.config)?;
        let token = CancellationToken::new();

        println!(
            "{} Sweeping {} on {} (Ctrl+C to stop)",
            INFO,
            style(ctx.config.managed_root.display()).bold(),
            style(job.schedule().description()).cyan()
        );

        let handle = tokio::spawn(job.run(token.clone()));
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Shutdown requested");
        token.cancel();

        let runs = handle.await?;
        println!("{SUCCESS} Stopped after {runs} sweep(s)");
        Ok(())
    }
}

fn print_report(report: &SweepReport, dry_run: bool) {
    let verb = if dry_run { "Would delete" } else { "Deleted" };
    for path in &report.deleted {
        println!("  {} {}", style(verb).dim(), path.display());
    }
    for failure in &report.failures {
        println!("  {} {}: {}", WARNING, failure.path.display(), style(&failure.error).red());
    }

    println!(
        "{} {} {} of {} file(s)",
        SUCCESS,
        verb,
        style(report.deleted_count()).cyan(),
        report.scanned
    );
}
