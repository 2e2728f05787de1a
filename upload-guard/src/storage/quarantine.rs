//! Quarantine area for stored files that failed post-storage scanning
//!
//! A quarantined file is moved, never copied: once [`QuarantineManager::quarantine`]
//! returns, the file exists under the quarantine root and no longer exists at
//! its managed path. The move is an atomic rename where possible, with a
//! copy, verify and delete fallback for cross-device moves. A failed fallback
//! removes its partial copy and leaves the original where it was.
//!
//! Each quarantined file gets a plain-text sidecar record next to it:
//!
//! ```text
//! 20261019_031500_photo_1760843700.jpg
//! 20261019_031500_photo_1760843700.jpg.info
//! ```
//!
//! ```text
//! Original path: /var/uploads/images/photo_1760843700.jpg
//! Quarantine time: 2026-10-19T03:15:00.123456+00:00
//! Reason: Suspicious: script marker '<?php' in header
//! ```

use super::allocator::{claim_unique, DEFAULT_MAX_ATTEMPTS};
use super::hasher::IntegrityHasher;
use super::types::{QuarantineError, QuarantineRecord, QuarantineResult, StoredFile};
use crate::config::UploadConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const SIDECAR_SUFFIX: &str = ".info";
const ORIGINAL_PATH_FIELD: &str = "Original path: ";
const QUARANTINE_TIME_FIELD: &str = "Quarantine time: ";
const REASON_FIELD: &str = "Reason: ";

/// Filesystem operations used to relocate files
///
/// Split out so relocation failures can be exercised in tests.
pub trait RelocateOps: fmt::Debug + Send + Sync {
    /// Atomically renames `from` to `to`
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copies `from` to `to`, returning the bytes copied
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Removes a file
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`RelocateOps`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdRelocate;

impl RelocateOps for StdRelocate {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// What [`QuarantineManager::reconcile`] found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Only the quarantined copy exists; nothing to do
    AlreadyQuarantined,
    /// Both existed with identical content; the original was removed
    RemovedOriginal,
    /// Both existed with different content; the partial copy was removed
    DiscardedPartialCopy,
    /// Only the original exists; nothing to do
    NotQuarantined,
}

/// Moves files into an isolated quarantine area
#[derive(Debug)]
pub struct QuarantineManager<O = StdRelocate> {
    root: PathBuf,
    managed_root: PathBuf,
    ops: O,
}

impl QuarantineManager<StdRelocate> {
    /// Opens (creating if needed) a quarantine area for files under `managed_root`
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Unavailable`] if either directory is unusable.
    pub fn new(quarantine_root: impl AsRef<Path>, managed_root: impl AsRef<Path>) -> QuarantineResult<Self> {
        Self::with_ops(quarantine_root, managed_root, StdRelocate)
    }

    /// Opens the quarantine area described by configuration
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Unavailable`] if either directory is unusable.
    pub fn from_config(config: &UploadConfig) -> QuarantineResult<Self> {
        Self::new(config.quarantine_root(), &config.managed_root)
    }
}

impl<O: RelocateOps> QuarantineManager<O> {
    /// Opens a quarantine area with custom relocation operations
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Unavailable`] if either directory is unusable.
    pub fn with_ops(
        quarantine_root: impl AsRef<Path>,
        managed_root: impl AsRef<Path>,
        ops: O,
    ) -> QuarantineResult<Self> {
        let root = open_dir(quarantine_root.as_ref())?;
        let managed_root = open_dir(managed_root.as_ref())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&root, fs::Permissions::from_mode(0o700)) {
                warn!(path = %root.display(), error = %e, "Failed to restrict quarantine permissions");
            }
        }

        Ok(Self {
            root,
            managed_root,
            ops,
        })
    }

    /// The canonical quarantine root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Quarantines a stored file
    ///
    /// # Errors
    ///
    /// See [`QuarantineManager::quarantine_path`].
    pub fn quarantine(&self, file: &StoredFile, reason: &str) -> QuarantineResult<QuarantineRecord> {
        self.quarantine_path(file.path(), reason)
    }

    /// Moves a managed file into quarantine and records why
    ///
    /// # Errors
    ///
    /// - [`QuarantineError::InvalidSource`] if the path is not a regular file
    ///   under the managed root, or is already in quarantine
    /// - [`QuarantineError::MoveFailure`] if the file could not be moved; it
    ///   remains at its original path
    /// - [`QuarantineError::RollbackFailure`] if a partial copy could not be removed
    /// - [`QuarantineError::Lost`] if the file ends up at neither location
    /// - [`QuarantineError::SidecarWrite`] if the file moved but its record
    ///   could not be written
    pub fn quarantine_path(&self, source: &Path, reason: &str) -> QuarantineResult<QuarantineRecord> {
        let source = self.check_source(source)?;
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let now = Utc::now();
        let name = format!("{}_{file_name}", now.format("%Y%m%d_%H%M%S"));
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) if !extension.is_empty() => (stem, Some(extension)),
            _ => (name.as_str(), None),
        };
        let claim = claim_unique(&self.root, stem, extension, DEFAULT_MAX_ATTEMPTS).map_err(|e| {
            QuarantineError::MoveFailure {
                path: source.clone(),
                source: io::Error::other(e),
            }
        })?;
        let (destination, _, placeholder) = claim.into_parts();
        drop(placeholder);

        self.relocate(&source, &destination)?;

        let record = QuarantineRecord::new(source, destination, single_line(reason), now);
        warn!(
            original = %record.original_path().display(),
            quarantine = %record.quarantine_path().display(),
            reason = record.reason(),
            "File quarantined"
        );
        self.write_sidecar(&record)?;
        Ok(record)
    }

    fn check_source(&self, source: &Path) -> QuarantineResult<PathBuf> {
        let invalid = |reason: &str| QuarantineError::InvalidSource {
            path: source.to_path_buf(),
            reason: reason.to_string(),
        };

        let metadata = fs::symlink_metadata(source).map_err(|e| invalid(&e.to_string()))?;
        if !metadata.is_file() {
            return Err(invalid("not a regular file"));
        }

        let canonical = source.canonicalize().map_err(|e| invalid(&e.to_string()))?;
        if canonical.starts_with(&self.root) {
            return Err(invalid("already in quarantine"));
        }
        if !canonical.starts_with(&self.managed_root) {
            return Err(invalid("not under the managed root"));
        }
        Ok(canonical)
    }

    fn relocate(&self, source: &Path, destination: &Path) -> QuarantineResult<()> {
        match self.ops.rename(source, destination) {
            Ok(()) => return self.confirm(source, destination),
            Err(e) => warn!(
                path = %source.display(),
                error = %e,
                "Rename into quarantine failed, falling back to copy"
            ),
        }

        let failure = match self.copy_verified(source, destination) {
            Ok(()) => match self.ops.remove_file(source) {
                Ok(()) => return self.confirm(source, destination),
                Err(e) => e,
            },
            Err(e) => e,
        };

        error!(path = %source.display(), error = %failure, "Quarantine move failed, rolling back");
        self.rollback(destination)?;
        if !source.exists() {
            return Err(QuarantineError::Lost {
                original: source.to_path_buf(),
                quarantine: destination.to_path_buf(),
            });
        }
        Err(QuarantineError::MoveFailure {
            path: source.to_path_buf(),
            source: failure,
        })
    }

    fn copy_verified(&self, source: &Path, destination: &Path) -> io::Result<()> {
        self.ops.copy(source, destination)?;
        let expected = IntegrityHasher::digest_file(source).map_err(io::Error::other)?;
        let copied = IntegrityHasher::digest_file(destination).map_err(io::Error::other)?;
        if expected != copied {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "quarantine copy does not match the original",
            ));
        }
        Ok(())
    }

    fn rollback(&self, destination: &Path) -> QuarantineResult<()> {
        match self.ops.remove_file(destination) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                error!(path = %destination.display(), error = %source, "Failed to remove partial quarantine copy");
                Err(QuarantineError::RollbackFailure {
                    path: destination.to_path_buf(),
                    source,
                })
            }
        }
    }

    fn confirm(&self, source: &Path, destination: &Path) -> QuarantineResult<()> {
        match (destination.is_file(), source.exists()) {
            (true, false) => Ok(()),
            (true, true) => self.reconcile(source, destination).map(|_| ()),
            (false, true) => Err(QuarantineError::MoveFailure {
                path: source.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "file did not reach quarantine"),
            }),
            (false, false) => {
                error!(
                    original = %source.display(),
                    quarantine = %destination.display(),
                    "File missing from both locations after quarantine move"
                );
                Err(QuarantineError::Lost {
                    original: source.to_path_buf(),
                    quarantine: destination.to_path_buf(),
                })
            }
        }
    }

    /// Brings an interrupted move to a consistent state
    ///
    /// Safe to call any number of times. When both copies exist with equal
    /// content the original is removed; when they differ the quarantine copy
    /// is treated as partial and removed.
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Lost`] if neither path exists, or an I/O
    /// error variant if a cleanup step fails.
    pub fn reconcile(&self, original: &Path, quarantined: &Path) -> QuarantineResult<ReconcileAction> {
        let action = match (original.is_file(), quarantined.is_file()) {
            (false, true) => ReconcileAction::AlreadyQuarantined,
            (true, false) => ReconcileAction::NotQuarantined,
            (false, false) => {
                return Err(QuarantineError::Lost {
                    original: original.to_path_buf(),
                    quarantine: quarantined.to_path_buf(),
                })
            }
            (true, true) => {
                let hash_failure = |e| QuarantineError::MoveFailure {
                    path: original.to_path_buf(),
                    source: io::Error::other(e),
                };
                let original_hash = IntegrityHasher::digest_file(original).map_err(hash_failure)?;
                let quarantined_hash = IntegrityHasher::digest_file(quarantined).map_err(hash_failure)?;

                if original_hash == quarantined_hash {
                    self.ops
                        .remove_file(original)
                        .map_err(|source| QuarantineError::MoveFailure {
                            path: original.to_path_buf(),
                            source,
                        })?;
                    ReconcileAction::RemovedOriginal
                } else {
                    self.rollback(quarantined)?;
                    ReconcileAction::DiscardedPartialCopy
                }
            }
        };

        info!(
            original = %original.display(),
            quarantine = %quarantined.display(),
            ?action,
            "Reconciled quarantine move"
        );
        Ok(action)
    }

    fn write_sidecar(&self, record: &QuarantineRecord) -> QuarantineResult<()> {
        let path = sidecar_path(record.quarantine_path());
        let contents = format!(
            "{ORIGINAL_PATH_FIELD}{}\n{QUARANTINE_TIME_FIELD}{}\n{REASON_FIELD}{}\n",
            record.original_path().display(),
            record.quarantined_at().to_rfc3339(),
            record.reason(),
        );
        fs::write(&path, contents).map_err(|source| {
            error!(path = %path.display(), error = %source, "Failed to write quarantine record");
            QuarantineError::SidecarWrite { path, source }
        })
    }

    /// Lists quarantined files that have a readable sidecar, oldest first
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Unavailable`] if the quarantine root cannot be read.
    pub fn list(&self) -> QuarantineResult<Vec<QuarantineRecord>> {
        let unavailable = |source| QuarantineError::Unavailable {
            path: self.root.clone(),
            source,
        };

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if !is_sidecar(&path) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(contents) => match parse_sidecar(&path, &contents) {
                    Some(record) => records.push(record),
                    None => warn!(path = %path.display(), "Skipping malformed quarantine record"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable quarantine record"),
            }
        }

        records.sort_by_key(QuarantineRecord::quarantined_at);
        Ok(records)
    }

    /// Number of quarantined files, sidecars excluded
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::Unavailable`] if the quarantine root cannot be read.
    pub fn count(&self) -> QuarantineResult<usize> {
        let unavailable = |source| QuarantineError::Unavailable {
            path: self.root.clone(),
            source,
        };

        let mut count = 0;
        for entry in fs::read_dir(&self.root).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if path.is_file() && !is_sidecar(&path) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Permanently deletes a quarantined file and its sidecar
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::InvalidSource`] for paths outside the
    /// quarantine root or sidecars themselves, and
    /// [`QuarantineError::PurgeFailure`] if deletion fails.
    pub fn purge(&self, quarantined: &Path) -> QuarantineResult<()> {
        let invalid = |reason: &str| QuarantineError::InvalidSource {
            path: quarantined.to_path_buf(),
            reason: reason.to_string(),
        };

        let canonical = quarantined
            .canonicalize()
            .map_err(|e| invalid(&e.to_string()))?;
        if canonical.parent() != Some(self.root.as_path()) {
            return Err(invalid("not a quarantined file"));
        }
        if is_sidecar(&canonical) {
            return Err(invalid("sidecar records are purged with their file"));
        }

        fs::remove_file(&canonical).map_err(|source| QuarantineError::PurgeFailure {
            path: canonical.clone(),
            source,
        })?;

        let sidecar = sidecar_path(&canonical);
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(QuarantineError::PurgeFailure { path: sidecar, source }),
        }

        info!(path = %canonical.display(), "Purged quarantined file");
        Ok(())
    }
}

fn open_dir(path: &Path) -> QuarantineResult<PathBuf> {
    let unavailable = |source| QuarantineError::Unavailable {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(path).map_err(unavailable)?;
    path.canonicalize().map_err(unavailable)
}

fn single_line(reason: &str) -> String {
    reason.replace(['\r', '\n'], " ")
}

/// Path of the sidecar record for a quarantined file
#[must_use]
pub fn sidecar_path(quarantined: &Path) -> PathBuf {
    let mut path = OsString::from(quarantined.as_os_str());
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
}

/// A sidecar is a `.info` file whose data file sits next to it
fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(SIDECAR_SUFFIX))
        .is_some_and(|data| !data.is_empty() && path.with_file_name(data).is_file())
}

/// Rebuilds a record from a sidecar path and its contents
///
/// Returns `None` if any of the three fields is missing or malformed.
#[must_use]
pub fn parse_sidecar(sidecar: &Path, contents: &str) -> Option<QuarantineRecord> {
    let mut original = None;
    let mut quarantined_at = None;
    let mut reason = None;

    for line in contents.lines() {
        if let Some(value) = line.strip_prefix(ORIGINAL_PATH_FIELD) {
            original = Some(PathBuf::from(value));
        } else if let Some(value) = line.strip_prefix(QUARANTINE_TIME_FIELD) {
            quarantined_at = DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|time| time.with_timezone(&Utc));
        } else if let Some(value) = line.strip_prefix(REASON_FIELD) {
            reason = Some(value.to_string());
        }
    }

    let name = sidecar.file_name()?.to_str()?.strip_suffix(SIDECAR_SUFFIX)?;
    Some(QuarantineRecord::new(
        original?,
        sidecar.with_file_name(name),
        reason?,
        quarantined_at?,
    ))
}
