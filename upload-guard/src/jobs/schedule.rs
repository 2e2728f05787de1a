//! Sweep scheduling

use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

use super::JobError;

/// When retention sweeps run
///
/// # Examples
///
/// ```rust
/// use upload_guard::jobs::SweepSchedule;
/// use std::time::Duration;
///
/// // Daily at 03:00 UTC (6 fields: sec min hour day month dayofweek)
/// let nightly = SweepSchedule::cron("0 0 3 * * *").unwrap();
///
/// // Every ten minutes
/// let frequent = SweepSchedule::every(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub enum SweepSchedule {
    /// Cron schedule with a seconds field
    Cron {
        /// Cron expression string
        expression: String,
        /// Parsed cron schedule (boxed to reduce enum size)
        schedule: Box<CronSchedule>,
    },

    /// Fixed interval between runs
    Every(std::time::Duration),
}

impl SweepSchedule {
    /// Create a cron-based schedule
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression is invalid.
    pub fn cron(expression: &str) -> Result<Self, JobError> {
        let schedule = CronSchedule::from_str(expression)
            .map_err(|e| JobError::InvalidSchedule(format!("{expression}: {e}")))?;
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
        })
    }

    /// Create a fixed-interval schedule
    #[must_use]
    pub const fn every(interval: std::time::Duration) -> Self {
        Self::Every(interval)
    }

    /// Next run strictly after `from`
    #[must_use]
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&from).next(),
            Self::Every(interval) => {
                let duration = Duration::from_std(*interval).ok()?;
                from.checked_add_signed(duration)
            }
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Cron { expression, .. } => format!("cron: {expression}"),
            Self::Every(interval) => format!("every {}s", interval.as_secs()),
        }
    }
}
