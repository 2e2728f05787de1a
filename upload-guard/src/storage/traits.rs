//! File storage trait definitions

use super::pipeline::AdmittedUpload;
use super::types::{StorageResult, StoredFile};
use async_trait::async_trait;

/// Abstraction over managed upload storage
///
/// Storage only accepts an [`AdmittedUpload`], so nothing reaches disk
/// without first passing validation.
///
/// # Implementation Requirements
///
/// Implementations must:
/// - Never overwrite an existing file
/// - Only return a [`StoredFile`] whose path is inside managed storage
/// - Leave nothing behind when a store fails part-way
///
/// # Examples
///
/// ```rust,no_run
/// use upload_guard::storage::{FileStorage, LocalFileStorage, StorageAllocator, UploadCandidate, ValidationPipeline};
///
/// # async fn example() -> anyhow::Result<()> {
/// let storage = LocalFileStorage::new(StorageAllocator::new("/var/uploads")?);
/// let pipeline = ValidationPipeline::default();
///
/// let candidate = UploadCandidate::new("avatar.png", "image/png", vec![/* ... */]);
/// if let Ok(admitted) = pipeline.admit(candidate) {
///     let stored = storage.store(admitted, "images").await?;
///     assert!(storage.verify(&stored).await?);
///     storage.delete(&stored).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Writes an admitted upload under `subdirectory` and hashes it
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The subdirectory would leave managed storage
    /// - No unique name could be allocated
    /// - Writing or reading back the file fails
    async fn store(&self, upload: AdmittedUpload, subdirectory: &str) -> StorageResult<StoredFile>;

    /// Deletes a stored file; deleting a missing file succeeds
    ///
    /// # Errors
    ///
    /// Returns an error if the file is outside managed storage or cannot be removed.
    async fn delete(&self, file: &StoredFile) -> StorageResult<()>;

    /// Checks whether a stored file is still present
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried.
    async fn exists(&self, file: &StoredFile) -> StorageResult<bool>;

    /// Re-hashes a stored file and compares it with its recorded hash
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    async fn verify(&self, file: &StoredFile) -> StorageResult<bool>;
}
