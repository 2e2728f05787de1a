//! Time-based cleanup of managed storage
//!
//! The sweeper deletes regular files whose modification time is strictly
//! older than the retention window. The quarantine area is never touched,
//! and one failed deletion never stops the sweep.

use crate::config::UploadConfig;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A file the sweeper could not inspect or delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    /// The offending path
    pub path: PathBuf,
    /// What went wrong
    pub error: String,
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,
    /// Files deleted (or, for a dry run, that would be)
    pub deleted: Vec<PathBuf>,
    /// Per-file failures
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// Number of files deleted
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    fn fail(&mut self, path: impl Into<PathBuf>, error: impl ToString) {
        let failure = SweepFailure {
            path: path.into(),
            error: error.to_string(),
        };
        warn!(path = %failure.path.display(), error = %failure.error, "Retention sweep failure");
        self.failures.push(failure);
    }
}

/// Deletes files older than a retention window
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    managed_root: PathBuf,
    excluded: Vec<PathBuf>,
    window: Duration,
}

impl RetentionSweeper {
    /// Creates a sweeper over `managed_root`
    #[must_use]
    pub fn new(managed_root: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            managed_root: managed_root.into(),
            excluded: Vec::new(),
            window,
        }
    }

    /// Excludes a subtree from every sweep
    #[must_use]
    pub fn exclude(mut self, subtree: impl Into<PathBuf>) -> Self {
        self.excluded.push(subtree.into());
        self
    }

    /// Sweeper for the configured root, excluding the quarantine area
    #[must_use]
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.managed_root, config.retention_window()).exclude(config.quarantine_root())
    }

    /// The retention window
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Deletes every expired file as of now
    #[must_use]
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    /// Deletes every file modified strictly before `now - window`
    #[must_use]
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        self.run(now, true)
    }

    /// Reports what [`RetentionSweeper::sweep_at`] would delete, deleting nothing
    #[must_use]
    pub fn expired_at(&self, now: SystemTime) -> SweepReport {
        self.run(now, false)
    }

    fn run(&self, now: SystemTime, delete: bool) -> SweepReport {
        let mut report = SweepReport::default();

        let Some(cutoff) = now.checked_sub(self.window) else {
            debug!("Retention window reaches before the epoch, nothing can expire");
            return report;
        };

        let root = match self.managed_root.canonicalize() {
            Ok(root) => root,
            Err(e) => {
                report.fail(&self.managed_root, e);
                return report;
            }
        };
        let excluded: Vec<PathBuf> = self.excluded.iter().map(|path| resolve(path)).collect();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !excluded.iter().any(|subtree| entry.path().starts_with(subtree)));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                    report.fail(path, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.scanned += 1;

            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(modified)) => modified,
                Ok(Err(e)) => {
                    report.fail(entry.path(), e);
                    continue;
                }
                Err(e) => {
                    report.fail(entry.path(), e);
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            if !delete {
                report.deleted.push(entry.into_path());
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "Deleted expired file");
                    report.deleted.push(entry.into_path());
                }
                Err(e) => report.fail(entry.path(), e),
            }
        }

        info!(
            root = %root.display(),
            scanned = report.scanned,
            deleted = report.deleted_count(),
            failures = report.failures.len(),
            dry_run = !delete,
            "Retention sweep finished"
        );
        report
    }
}

/// Canonical form of a path that may not exist yet
fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn file_aged(path: &Path, now: SystemTime, age: Duration) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
        set_file_mtime(path, FileTime::from_system_time(now - age)).unwrap();
    }

    #[test]
    fn test_window_boundary() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let old = temp.path().join("images/old.jpg");
        let young = temp.path().join("images/young.jpg");
        file_aged(&old, now, DAY * 30 + Duration::from_secs(1));
        file_aged(&young, now, DAY * 30 - Duration::from_secs(1));

        let report = RetentionSweeper::new(temp.path(), DAY * 30).sweep_at(now);

        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted_count(), 1);
        assert!(!old.exists());
        assert!(young.exists());
    }

    #[test]
    fn test_quarantine_is_never_swept() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let quarantined = temp.path().join("quarantine/20240101_000000_evil.jpg");
        let managed = temp.path().join("images/old.jpg");
        file_aged(&quarantined, now, DAY * 365);
        file_aged(&managed, now, DAY * 365);

        let report = RetentionSweeper::new(temp.path(), DAY)
            .exclude(temp.path().join("quarantine"))
            .sweep_at(now);

        assert_eq!(report.scanned, 1);
        assert!(quarantined.exists());
        assert!(!managed.exists());
    }

    #[test]
    fn test_dry_run_deletes_nothing() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let old = temp.path().join("old.jpg");
        file_aged(&old, now, DAY * 2);

        let sweeper = RetentionSweeper::new(temp.path(), DAY);
        let report = sweeper.expired_at(now);

        assert_eq!(report.deleted_count(), 1);
        assert!(old.exists());
    }

    #[test]
    fn test_missing_root_is_reported() {
        let temp = TempDir::new().unwrap();
        let report = RetentionSweeper::new(temp.path().join("missing"), DAY).sweep();

        assert_eq!(report.scanned, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_huge_window_expires_nothing() {
        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        file_aged(&temp.path().join("a.jpg"), now, DAY);

        let report = RetentionSweeper::new(temp.path(), Duration::MAX).sweep_at(now);
        assert_eq!(report.deleted_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failures_do_not_stop_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let locked_dir = temp.path().join("locked");
        let locked = locked_dir.join("old.jpg");
        let free = temp.path().join("free/old.jpg");
        file_aged(&locked, now, DAY * 2);
        file_aged(&free, now, DAY * 2);
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let report = RetentionSweeper::new(temp.path(), DAY).sweep_at(now);
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!free.exists());
        // Root ignores directory permissions, so only assert when the lock held
        if locked.exists() {
            assert_eq!(report.failures.len(), 1);
        }
    }
}
