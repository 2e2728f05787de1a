//! Unique path allocation under the managed root
//!
//! A name is claimed by creating it with `create_new`, so two concurrent
//! writers can never receive the same path. Candidate names follow the
//! pattern `{stem}_{unix_seconds}.{ext}`, then `{stem}_{unix_seconds}_{n}.{ext}`
//! on collision.

use super::filename::FilenameSanitizer;
use super::types::{StorageError, StorageResult};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Default number of names tried before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

const MAX_STEM_CHARS: usize = 128;
const MAX_EXTENSION_CHARS: usize = 16;

/// A path that has been exclusively created on disk
///
/// The file exists and is empty; it belongs to whoever holds the claim.
#[derive(Debug)]
pub struct ClaimedPath {
    path: PathBuf,
    stored_name: String,
    file: File,
}

impl ClaimedPath {
    /// The claimed path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The claimed file name
    #[must_use]
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    pub(crate) fn into_parts(self) -> (PathBuf, String, File) {
        (self.path, self.stored_name, self.file)
    }
}

/// Splits a sanitized name into a bounded stem and lower-cased extension
pub(crate) fn split_name(name: &str) -> (String, Option<String>) {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            (stem, Some(extension))
        }
        _ => (name, None),
    };

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let extension = extension.map(|extension| {
        extension
            .chars()
            .take(MAX_EXTENSION_CHARS)
            .collect::<String>()
            .to_lowercase()
    });
    (stem, extension)
}

/// Joins `name` onto `dir`, refusing anything but a single plain component
fn contained_child(dir: &Path, name: &str) -> StorageResult<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(dir.join(part)),
        _ => Err(StorageError::PathEscape(format!(
            "'{name}' is not a single path component"
        ))),
    }
}

/// Claims the first free name in `dir`
///
/// # Errors
///
/// Returns [`StorageError::PathCollisionExhausted`] once `max_attempts`
/// names have been tried, or [`StorageError::WriteFailure`] for any I/O
/// error other than an existing file.
pub(crate) fn claim_unique(
    dir: &Path,
    stem: &str,
    extension: Option<&str>,
    max_attempts: u32,
) -> StorageResult<ClaimedPath> {
    for attempt in 0..max_attempts {
        let name = match (attempt, extension) {
            (0, Some(extension)) => format!("{stem}.{extension}"),
            (0, None) => stem.to_string(),
            (n, Some(extension)) => format!("{stem}_{n}.{extension}"),
            (n, None) => format!("{stem}_{n}"),
        };
        let path = contained_child(dir, &name)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                debug!(path = %path.display(), attempt, "Claimed storage path");
                return Ok(ClaimedPath {
                    path,
                    stored_name: name,
                    file,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(StorageError::WriteFailure { path, source }),
        }
    }

    Err(StorageError::PathCollisionExhausted {
        base: stem.to_string(),
        attempts: max_attempts,
    })
}

/// Allocates unique destination paths under a managed root
#[derive(Debug, Clone)]
pub struct StorageAllocator {
    root: PathBuf,
    reserved: Vec<PathBuf>,
    max_attempts: u32,
}

impl StorageAllocator {
    /// Opens (creating if needed) a managed root
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRoot`] if the root cannot be created or
    /// is not a directory.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref();
        let invalid = |reason: String| StorageError::InvalidRoot {
            path: root.to_path_buf(),
            reason,
        };

        fs::create_dir_all(root).map_err(|e| invalid(e.to_string()))?;
        let canonical = root.canonicalize().map_err(|e| invalid(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }

        Ok(Self {
            root: canonical,
            reserved: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Sets the number of names tried per allocation
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Excludes an existing subtree (the quarantine area) from allocation
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRoot`] if the subtree does not exist.
    pub fn reserve(mut self, subtree: impl AsRef<Path>) -> StorageResult<Self> {
        let subtree = subtree.as_ref();
        let canonical = subtree
            .canonicalize()
            .map_err(|e| StorageError::InvalidRoot {
                path: subtree.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.reserved.push(canonical);
        Ok(self)
    }

    /// The canonical managed root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves (creating if needed) a subdirectory of the managed root
    ///
    /// Only plain relative components are accepted. The resolved directory
    /// must stay inside the root after symlinks are followed and must not
    /// fall inside a reserved subtree.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathEscape`] for anything that would leave the
    /// root, or [`StorageError::WriteFailure`] if the directory cannot be
    /// created.
    pub fn resolve_subdirectory(&self, subdirectory: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(subdirectory);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::PathEscape(format!(
                "subdirectory '{subdirectory}' is not a plain relative path"
            )));
        }

        let dir = self.root.join(relative);
        fs::create_dir_all(&dir).map_err(|source| StorageError::WriteFailure {
            path: dir.clone(),
            source,
        })?;
        let dir = dir.canonicalize().map_err(|source| StorageError::WriteFailure {
            path: dir.clone(),
            source,
        })?;

        if !dir.starts_with(&self.root) {
            return Err(StorageError::PathEscape(format!(
                "subdirectory '{subdirectory}' resolves outside the managed root"
            )));
        }
        if self.reserved.iter().any(|reserved| dir.starts_with(reserved)) {
            return Err(StorageError::PathEscape(format!(
                "subdirectory '{subdirectory}' is reserved"
            )));
        }

        Ok(dir)
    }

    /// Claims a unique path for an upload
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathEscape`] for a bad subdirectory,
    /// [`StorageError::PathCollisionExhausted`] when every candidate name is
    /// taken, or [`StorageError::WriteFailure`] on I/O failure.
    pub fn claim(&self, subdirectory: &str, original_name: &str) -> StorageResult<ClaimedPath> {
        let dir = self.resolve_subdirectory(subdirectory)?;
        let base = FilenameSanitizer::storage_name(original_name);
        let (stem, extension) = split_name(&base);
        let stamp = Utc::now().timestamp();

        claim_unique(
            &dir,
            &format!("{stem}_{stamp}"),
            extension.as_deref(),
            self.max_attempts,
        )
    }
}
