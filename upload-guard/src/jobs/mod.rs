//! Scheduled retention sweeps
//!
//! [`RetentionJob`] runs a [`RetentionSweeper`] on a [`SweepSchedule`] until
//! its [`CancellationToken`] fires. Each sweep runs on the blocking pool.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upload_guard::config::UploadConfig;
//! use upload_guard::jobs::{CancellationToken, RetentionJob};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let job = RetentionJob::from_config(&UploadConfig::default())?;
//! let token = CancellationToken::new();
//!
//! let handle = tokio::spawn(job.run(token.clone()));
//! // ... later, on shutdown
//! token.cancel();
//! let runs = handle.await?;
//! # Ok(())
//! # }
//! ```

mod cancellation;
mod schedule;

pub use cancellation::CancellationToken;
pub use schedule::SweepSchedule;

use crate::config::UploadConfig;
use crate::storage::retention::{RetentionSweeper, SweepReport};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Job errors
#[derive(Debug, Error)]
pub enum JobError {
    /// The schedule expression could not be parsed
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The sweep task panicked or was aborted
    #[error("Sweep task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Periodic retention sweep
#[derive(Debug, Clone)]
pub struct RetentionJob {
    sweeper: Arc<RetentionSweeper>,
    schedule: SweepSchedule,
}

impl RetentionJob {
    /// Creates a job from a sweeper and schedule
    #[must_use]
    pub fn new(sweeper: RetentionSweeper, schedule: SweepSchedule) -> Self {
        Self {
            sweeper: Arc::new(sweeper),
            schedule,
        }
    }

    /// Creates the configured job
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidSchedule`] if `retention_schedule` does not parse.
    pub fn from_config(config: &UploadConfig) -> Result<Self, JobError> {
        Ok(Self::new(
            RetentionSweeper::from_config(config),
            SweepSchedule::cron(&config.retention_schedule)?,
        ))
    }

    /// The job's schedule
    #[must_use]
    pub const fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }

    /// Runs one sweep now
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Task`] if the blocking sweep task fails.
    pub async fn run_once(&self) -> Result<SweepReport, JobError> {
        let sweeper = Arc::clone(&self.sweeper);
        Ok(tokio::task::spawn_blocking(move || sweeper.sweep()).await?)
    }

    /// Sweeps on schedule until cancelled, returning the number of sweeps run
    pub async fn run(self, token: CancellationToken) -> u64 {
        info!(schedule = %self.schedule.description(), "Retention job started");
        let mut runs = 0;

        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                warn!("Schedule has no further runs, stopping retention job");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            match self.run_once().await {
                Ok(report) => {
                    runs += 1;
                    info!(
                        deleted = report.deleted_count(),
                        failures = report.failures.len(),
                        scanned = report.scanned,
                        "Scheduled retention sweep finished"
                    );
                }
                Err(e) => error!(error = %e, "Scheduled retention sweep failed"),
            }
        }

        info!(runs, "Retention job stopped");
        runs
    }
}
