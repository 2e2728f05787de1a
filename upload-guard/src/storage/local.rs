//! Local filesystem storage implementation

use super::allocator::StorageAllocator;
use super::hasher::{IntegrityHasher, HASH_CHUNK_SIZE};
use super::pipeline::AdmittedUpload;
use super::traits::FileStorage;
use super::types::{StorageError, StorageResult, StoredFile, UploadCandidate};
use crate::config::UploadConfig;
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Local filesystem storage backend
///
/// Files land at `{root}/{subdirectory}/{stem}_{unix_seconds}[_{n}].{ext}`.
/// The final name is claimed before any content is written; content goes
/// to a hidden staging file next to it, is synced and hashed, and is then
/// renamed over the claimed name. A failed store removes both.
///
/// ```text
/// /var/uploads/
/// ├── images/
/// │   ├── photo_1760870400.jpg
/// │   └── photo_1760870400_1.jpg
/// └── quarantine/
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    allocator: StorageAllocator,
}

impl LocalFileStorage {
    /// Creates storage over an allocator
    #[must_use]
    pub const fn new(allocator: StorageAllocator) -> Self {
        Self { allocator }
    }

    /// Creates storage from configuration
    ///
    /// Creates the managed root and the quarantine area, and reserves the
    /// quarantine area so uploads can never be allocated inside it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRoot`] if either directory is unusable.
    pub fn from_config(config: &UploadConfig) -> StorageResult<Self> {
        let quarantine_root = config.quarantine_root();
        fs::create_dir_all(&quarantine_root).map_err(|e| StorageError::InvalidRoot {
            path: quarantine_root.clone(),
            reason: e.to_string(),
        })?;

        let allocator = StorageAllocator::new(&config.managed_root)?
            .with_max_attempts(config.max_allocation_attempts)
            .reserve(&quarantine_root)?;
        Ok(Self::new(allocator))
    }

    /// The canonical managed root
    #[must_use]
    pub fn root(&self) -> &Path {
        self.allocator.root()
    }

    /// Stores an admitted upload on the calling thread
    ///
    /// # Errors
    ///
    /// See [`FileStorage::store`].
    pub fn store_blocking(&self, upload: AdmittedUpload, subdirectory: &str) -> StorageResult<StoredFile> {
        let (mut candidate, outcome) = upload.into_parts();
        let claim = self.allocator.claim(subdirectory, candidate.filename())?;
        let (path, stored_name, placeholder) = claim.into_parts();
        drop(placeholder);

        let staging = staging_path(&path, &stored_name);
        let result = write_staged(&mut candidate, &staging).and_then(|size| {
            let hash = IntegrityHasher::digest_file(&staging)?;
            fs::rename(&staging, &path).map_err(|source| StorageError::WriteFailure {
                path: path.clone(),
                source,
            })?;
            Ok((size, hash))
        });

        match result {
            Ok((size, hash)) => {
                let stored = StoredFile::new(
                    candidate.filename(),
                    stored_name,
                    path,
                    size,
                    outcome.detected_mime(),
                    hash,
                );
                info!(
                    path = %stored.path().display(),
                    size = stored.size(),
                    sha256 = stored.content_hash(),
                    "Stored upload"
                );
                Ok(stored)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Store failed, removing partial output");
                discard(&staging);
                discard(&path);
                Err(e)
            }
        }
    }
}

fn staging_path(path: &Path, stored_name: &str) -> PathBuf {
    path.with_file_name(format!(".{stored_name}.part"))
}

fn write_staged(candidate: &mut UploadCandidate, staging: &Path) -> StorageResult<u64> {
    let write_failure = |source| StorageError::WriteFailure {
        path: staging.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .map_err(write_failure)?;

    let mut writer = BufWriter::with_capacity(HASH_CHUNK_SIZE, file);
    let written = candidate.copy_to(&mut writer).map_err(write_failure)?;
    let file = writer
        .into_inner()
        .map_err(|e| write_failure(e.into_error()))?;
    file.sync_all().map_err(write_failure)?;

    Ok(written)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
    }
}

fn join_failure(path: &Path, error: tokio::task::JoinError) -> StorageError {
    StorageError::WriteFailure {
        path: path.to_path_buf(),
        source: io::Error::other(error),
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, upload: AdmittedUpload, subdirectory: &str) -> StorageResult<StoredFile> {
        let storage = self.clone();
        let subdirectory = subdirectory.to_string();
        tokio::task::spawn_blocking(move || storage.store_blocking(upload, &subdirectory))
            .await
            .map_err(|e| join_failure(self.root(), e))?
    }

    async fn delete(&self, file: &StoredFile) -> StorageResult<()> {
        if !file.path().starts_with(self.root()) {
            return Err(StorageError::PathEscape(format!(
                "{} is not under the managed root",
                file.path().display()
            )));
        }

        match tokio::fs::remove_file(file.path()).await {
            Ok(()) => {
                info!(path = %file.path().display(), "Deleted stored file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::WriteFailure {
                path: file.path().to_path_buf(),
                source,
            }),
        }
    }

    async fn exists(&self, file: &StoredFile) -> StorageResult<bool> {
        tokio::fs::try_exists(file.path())
            .await
            .map_err(|source| StorageError::HashReadbackFailure {
                path: file.path().to_path_buf(),
                source,
            })
    }

    async fn verify(&self, file: &StoredFile) -> StorageResult<bool> {
        let owned = file.clone();
        tokio::task::spawn_blocking(move || IntegrityHasher::verify(&owned))
            .await
            .map_err(|e| join_failure(file.path(), e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ValidationPipeline;
    use std::io::{Cursor, Read, Seek, SeekFrom};
    use tempfile::TempDir;

    fn jpeg(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        data.resize(len, 0x42);
        data
    }

    fn admit(filename: &str, data: Vec<u8>) -> AdmittedUpload {
        ValidationPipeline::default()
            .admit(UploadCandidate::new(filename, "image/jpeg", data))
            .unwrap()
    }

    fn storage(temp: &TempDir) -> LocalFileStorage {
        LocalFileStorage::new(StorageAllocator::new(temp.path()).unwrap())
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_store_and_verify() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let data = jpeg(4096);

        let stored = storage.store(admit("photo.jpg", data.clone()), "images").await.unwrap();

        assert_eq!(stored.original_name(), "photo.jpg");
        assert_eq!(stored.size(), 4096);
        assert_eq!(stored.detected_mime(), "image/jpeg");
        assert_eq!(stored.content_hash(), IntegrityHasher::digest_bytes(&data));
        assert_eq!(fs::read(stored.path()).unwrap(), data);
        assert!(stored.path().starts_with(storage.root().join("images")));
        assert!(storage.verify(&stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_name_twice_gets_distinct_paths() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let first = storage.store(admit("pic.jpg", jpeg(100)), "images").await.unwrap();
        let second = storage.store(admit("pic.jpg", jpeg(200)), "images").await.unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(fs::read(first.path()).unwrap().len(), 100);
        assert_eq!(fs::read(second.path()).unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_no_staging_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let stored = storage.store(admit("photo.jpg", jpeg(64)), "images").await.unwrap();
        assert_eq!(entries(&storage.root().join("images")), vec![stored.stored_name().to_string()]);
    }

    /// Reports a fixed length but runs dry early
    struct ShortSource {
        inner: Cursor<Vec<u8>>,
        reported: u64,
    }

    impl Read for ShortSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for ShortSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            match pos {
                SeekFrom::End(0) => Ok(self.reported),
                other => self.inner.seek(other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_write_cleans_up() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let source = ShortSource {
            inner: Cursor::new(jpeg(64)),
            reported: 128,
        };
        let candidate = UploadCandidate::from_reader("photo.jpg", "image/jpeg", source).unwrap();
        let admitted = ValidationPipeline::default().admit(candidate).unwrap();

        let err = storage.store(admitted, "images").await.unwrap_err();
        assert!(matches!(err, StorageError::WriteFailure { .. }));
        assert!(entries(&storage.root().join("images")).is_empty());
    }

    #[tokio::test]
    async fn test_store_rejects_escaping_subdirectory() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let err = storage.store(admit("photo.jpg", jpeg(64)), "../elsewhere").await.unwrap_err();
        assert!(matches!(err, StorageError::PathEscape(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let stored = storage.store(admit("photo.jpg", jpeg(64)), "images").await.unwrap();
        assert!(storage.exists(&stored).await.unwrap());

        storage.delete(&stored).await.unwrap();
        assert!(!storage.exists(&stored).await.unwrap());
        storage.delete(&stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_refuses_foreign_paths() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);
        let foreign = StoredFile::new("x", "x", PathBuf::from("/etc/hostname"), 1, None, "00");

        assert!(matches!(
            storage.delete(&foreign).await.unwrap_err(),
            StorageError::PathEscape(_)
        ));
    }

    #[test]
    fn test_from_config_reserves_quarantine() {
        let temp = TempDir::new().unwrap();
        let config = UploadConfig {
            managed_root: temp.path().join("uploads"),
            ..UploadConfig::default()
        };

        let storage = LocalFileStorage::from_config(&config).unwrap();
        assert!(config.quarantine_root().is_dir());

        let err = storage
            .store_blocking(admit("photo.jpg", jpeg(64)), "quarantine")
            .unwrap_err();
        assert!(matches!(err, StorageError::PathEscape(_)));
    }
}
