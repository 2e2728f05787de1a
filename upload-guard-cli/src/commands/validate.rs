//! Validate command

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use upload_guard::config::UploadConfig;
use upload_guard::storage::{UploadCandidate, ValidationOutcome, ValidationPipeline};

use super::{CommandContext, FAILURE, SUCCESS, WARNING};

/// Validate files without storing them
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Files to validate
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Declared content type (guessed from the extension when omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Validate under this filename instead of the file's own name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileVerdict<'a> {
    path: &'a std::path::Path,
    outcome: ValidationOutcome,
}

impl ValidateCommand {
    /// Execute the validate command
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened or any file is rejected.
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let verdicts = self.validate_all(&ctx.config)?;

        if ctx.json {
            CommandContext::print_json(&verdicts)?;
        } else {
            for verdict in &verdicts {
                print_verdict(verdict);
            }
        }

        let rejected = verdicts.iter().filter(|v| !v.outcome.is_valid()).count();
        if rejected > 0 {
            bail!("{rejected} of {} file(s) rejected", verdicts.len());
        }
        Ok(())
    }

    fn validate_all(&self, config: &UploadConfig) -> Result<Vec<FileVerdict<'_>>> {
        let pipeline = ValidationPipeline::from_config(config);
        let mut verdicts = Vec::with_capacity(self.files.len());

        for path in &self.files {
            let mut candidate = UploadCandidate::from_path(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            if let Some(name) = &self.name {
                candidate = candidate.with_filename(name.clone());
            }
            if let Some(content_type) = &self.content_type {
                candidate = candidate.with_content_type(content_type.clone());
            }

            let outcome = pipeline.validate(&mut candidate);
            verdicts.push(FileVerdict { path, outcome });
        }
        Ok(verdicts)
    }
}

fn print_verdict(verdict: &FileVerdict<'_>) {
    let outcome = &verdict.outcome;
    if outcome.is_valid() {
        println!(
            "{} {} {}",
            SUCCESS,
            style(verdict.path.display()).bold(),
            style(outcome.detected_mime().unwrap_or("unknown type")).dim()
        );
    } else {
        println!("{} {}", FAILURE, style(verdict.path.display()).bold().red());
    }

    for error in outcome.errors() {
        println!("    {} {}", style(error.code()).red(), error);
    }
    for warning in outcome.warnings() {
        println!("    {} {}", WARNING, style(warning).yellow());
    }
}
