//! Store command

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use upload_guard::config::UploadConfig;
use upload_guard::service::{UploadDecision, UploadService};
use upload_guard::storage::UploadCandidate;

use super::{CommandContext, FAILURE, SUCCESS, WARNING};

/// Validate, store and scan a file
#[derive(Debug, Args)]
pub struct StoreCommand {
    /// File to store
    pub file: PathBuf,

    /// Subdirectory of the managed root (defaults to `default_subdirectory`)
    #[arg(short, long)]
    pub subdirectory: Option<String>,

    /// Declared content type (guessed from the extension when omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Store under this original filename instead of the file's own name
    #[arg(long)]
    pub name: Option<String>,
}

impl StoreCommand {
    /// Execute the store command
    ///
    /// # Errors
    ///
    /// Returns an error if the file is rejected, or if storage or quarantine fails.
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let decision = self.store(&ctx.config).await?;

        if ctx.json {
            CommandContext::print_json(&decision)?;
        } else {
            print_decision(&decision);
        }

        if let UploadDecision::Rejected { outcome } = &decision {
            bail!("Upload rejected: {}", outcome.error_codes().join(", "));
        }
        Ok(())
    }

    async fn store(&self, config: &UploadConfig) -> Result<UploadDecision> {
        let service = UploadService::from_config(config)?;

        let mut candidate = UploadCandidate::from_path(&self.file)
            .with_context(|| format!("Failed to open {}", self.file.display()))?;
        if let Some(name) = &self.name {
            candidate = candidate.with_filename(name.clone());
        }
        if let Some(content_type) = &self.content_type {
            candidate = candidate.with_content_type(content_type.clone());
        }

        Ok(service
            .process_upload(candidate, self.subdirectory.as_deref())
            .await?)
    }
}

fn print_decision(decision: &UploadDecision) {
    match decision {
        UploadDecision::Stored { file, warnings } => {
            println!("{} Stored {}", SUCCESS, style(file.path().display()).green());
            println!("  Size:    {} bytes", style(file.size()).cyan());
            println!("  Type:    {}", style(file.detected_mime()).cyan());
            println!("  SHA-256: {}", style(file.content_hash()).dim());
            for warning in warnings {
                println!("  {} {}", WARNING, style(warning).yellow());
            }
        }
        UploadDecision::Quarantined { record, warnings } => {
            println!(
                "{} Stored, then quarantined at {}",
                WARNING,
                style(record.quarantine_path().display()).yellow()
            );
            println!("  Reason: {}", record.reason());
            for warning in warnings {
                println!("  {} {}", WARNING, style(warning).yellow());
            }
        }
        UploadDecision::Rejected { outcome } => {
            println!("{} {}", FAILURE, style("Rejected").red().bold());
            for error in outcome.errors() {
                println!("    {} {}", style(error.code()).red(), error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, files_in, jpeg};
    use std::fs;
    use tempfile::tempdir;

    fn command(file: PathBuf) -> StoreCommand {
        StoreCommand {
            file,
            subdirectory: None,
            content_type: None,
            name: None,
        }
    }

    #[tokio::test]
    async fn test_store_writes_into_default_subdirectory() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("Holiday Photo.jpg");
        fs::write(&source, jpeg(128)).unwrap();
        let ctx = context(temp_dir.path(), false);

        command(source.clone()).execute(&ctx).await.unwrap();

        let stored = files_in(&ctx.config.managed_root.join("images"));
        assert_eq!(stored.len(), 1);
        assert_eq!(fs::read(&stored[0]).unwrap(), jpeg(128));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_store_into_subdirectory_reports_json() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("avatar.jpg");
        fs::write(&source, jpeg(64)).unwrap();
        let ctx = context(temp_dir.path(), true);

        let cmd = StoreCommand {
            subdirectory: Some("avatars".to_string()),
            ..command(source)
        };
        let decision = cmd.store(&ctx.config).await.unwrap();

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["status"], "stored");
        assert_eq!(files_in(&ctx.config.managed_root.join("avatars")).len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_upload_fails_and_writes_nothing() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("invoice.jpg");
        fs::write(&source, b"MZ\x90\x00\x03\x00\x00\x00").unwrap();
        let ctx = context(temp_dir.path(), false);

        let err = command(source).execute(&ctx).await.unwrap_err();
        assert!(err.to_string().starts_with("Upload rejected:"), "{err}");
        assert!(err.to_string().contains("malicious_signature"), "{err}");
        assert!(files_in(&ctx.config.managed_root.join("images")).is_empty());
    }

    #[tokio::test]
    async fn test_flagged_upload_is_quarantined() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("banner.jpg");
        let mut data = jpeg(64);
        data.extend_from_slice(b"<?php system($_GET['c']); ?>");
        fs::write(&source, data).unwrap();
        let ctx = context(temp_dir.path(), true);

        let decision = command(source).store(&ctx.config).await.unwrap();

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["status"], "quarantined");
        assert!(files_in(&ctx.config.managed_root.join("images")).is_empty());
        assert_eq!(files_in(&ctx.config.quarantine_root()).len(), 2);
    }
}
