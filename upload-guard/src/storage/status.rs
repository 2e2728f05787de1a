//! Storage status reporting

use super::hasher::IntegrityHasher;
use super::quarantine::QuarantineManager;
use super::scanning::{HeaderScanner, ScanResult};
use super::types::{StorageError, StorageResult};
use crate::config::UploadConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A managed file singled out by the status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedFile {
    /// Path of the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Why it was flagged
    pub reason: String,
}

/// Overview of managed storage and quarantine
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Managed root
    pub managed_root: PathBuf,
    /// Quarantine root
    pub quarantine_root: PathBuf,
    /// Configured allow-list
    pub allowed_extensions: Vec<String>,
    /// Configured size cap
    pub max_file_size_bytes: u64,
    /// Configured retention window
    pub retention_window_secs: u64,
    /// Regular files under the managed root, quarantine excluded
    pub total_files: usize,
    /// Files the header scan flags
    pub suspicious_files: Vec<FlaggedFile>,
    /// Files above the size cap
    pub large_files: Vec<FlaggedFile>,
    /// Files in quarantine
    pub quarantined_files: usize,
    /// Paths that could not be inspected
    pub errors: Vec<String>,
}

impl StatusReport {
    /// Walks managed storage and builds a report
    ///
    /// Never fails; unreadable entries are listed in `errors`.
    #[must_use]
    pub fn collect(config: &UploadConfig) -> Self {
        let quarantine_root = config.quarantine_root();
        let mut report = Self {
            managed_root: config.managed_root.clone(),
            quarantine_root: quarantine_root.clone(),
            allowed_extensions: config.allowed_extensions.iter().cloned().collect(),
            max_file_size_bytes: config.max_file_size_bytes,
            retention_window_secs: config.retention_window_secs,
            total_files: 0,
            suspicious_files: Vec::new(),
            large_files: Vec::new(),
            quarantined_files: 0,
            errors: Vec::new(),
        };

        let scanner = HeaderScanner::new(config.max_file_size_bytes);
        let excluded = quarantine_root.canonicalize().unwrap_or(quarantine_root);

        let walker = WalkDir::new(&config.managed_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .canonicalize()
                    .map_or(true, |path| !path.starts_with(&excluded))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.total_files += 1;

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            match scanner.scan_path_blocking(entry.path()) {
                ScanResult::Clean => {}
                ScanResult::Suspicious { reason } => report.suspicious_files.push(FlaggedFile {
                    path: entry.path().to_path_buf(),
                    size,
                    reason,
                }),
                ScanResult::Error { message } => report.errors.push(message),
            }

            if size > config.max_file_size_bytes {
                report.large_files.push(FlaggedFile {
                    path: entry.path().to_path_buf(),
                    size,
                    reason: format!("exceeds {} bytes", config.max_file_size_bytes),
                });
            }
        }

        match QuarantineManager::from_config(config).and_then(|manager| manager.count()) {
            Ok(count) => report.quarantined_files = count,
            Err(e) => report.errors.push(e.to_string()),
        }

        report
    }
}

/// Details of a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    /// File name
    pub name: String,
    /// Path as given
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Lowercase hex SHA-256
    pub content_hash: String,
    /// Header scan verdict
    pub scan: ScanResult,
}

impl FileInfo {
    /// Inspects one file
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::HashReadbackFailure`] if the file cannot be read.
    pub fn inspect(path: &Path, scanner: &HeaderScanner) -> StorageResult<Self> {
        let metadata = fs::metadata(path).map_err(|source| StorageError::HashReadbackFailure {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            content_hash: IntegrityHasher::digest_file(path)?,
            scan: scanner.scan_path_blocking(path),
        })
    }
}
