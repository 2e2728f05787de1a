//! Status command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use upload_guard::storage::{FileInfo, FlaggedFile, HeaderScanner, ScanResult, StatusReport};

use super::{CommandContext, FAILURE, INFO, SUCCESS, WARNING};

/// Summarize managed storage, or inspect one file
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Inspect this file instead of the whole managed root
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl StatusCommand {
    /// Execute the status command
    ///
    /// # Errors
    ///
    /// Returns an error if the inspected file cannot be read.
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        if let Some(path) = &self.file {
            let info = FileInfo::inspect(path, &HeaderScanner::new(ctx.config.max_file_size_bytes))?;
            if ctx.json {
                return CommandContext::print_json(&info);
            }
            print_file(&info);
            return Ok(());
        }

        let report = StatusReport::collect(&ctx.config);
        if ctx.json {
            return CommandContext::print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

fn print_file(info: &FileInfo) {
    println!("\n{} {}", INFO, style(&info.name).bold());
    println!("  Path:     {}", info.path.display());
    println!("  Size:     {} bytes", style(info.size).cyan());
    if let Some(modified) = info.modified {
        println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  SHA-256:  {}", style(&info.content_hash).dim());
    match &info.scan {
        ScanResult::Clean => println!("  Scan:     {} {}", SUCCESS, style("clean").green()),
        other => println!("  Scan:     {} {}", FAILURE, style(other).red()),
    }
    println!();
}

fn print_report(report: &StatusReport) {
    println!("\n{} Upload storage status", INFO);
    println!();

    println!("{}", style("Configuration").bold().underlined());
    println!("  Managed root:     {}", report.managed_root.display());
    println!("  Quarantine root:  {}", report.quarantine_root.display());
    println!("  Allowed:          {}", style(report.allowed_extensions.join(", ")).cyan());
    println!("  Size cap:         {} bytes", style(report.max_file_size_bytes).cyan());
    println!("  Retention:        {} s", style(report.retention_window_secs).cyan());
    println!();

    println!("{}", style("Files").bold().underlined());
    println!("  Stored:           {}", style(report.total_files).green());
    println!("  Suspicious:       {}", style(report.suspicious_files.len()).red());
    println!("  Over size cap:    {}", style(report.large_files.len()).yellow());
    println!("  Quarantined:      {}", style(report.quarantined_files).yellow());
    println!();

    print_flagged("Suspicious files", &report.suspicious_files);
    print_flagged("Large files", &report.large_files);

    if !report.errors.is_empty() {
        println!("{}", style("Errors").bold().underlined());
        for error in &report.errors {
            println!("  {WARNING} {error}");
        }
        println!();
    }
}

fn print_flagged(title: &str, files: &[FlaggedFile]) {
    if files.is_empty() {
        return;
    }
    println!("{}", style(title).bold().underlined());
    for file in files {
        println!("  {} ({} bytes): {}", file.path.display(), file.size, file.reason);
    }
    println!();
}
