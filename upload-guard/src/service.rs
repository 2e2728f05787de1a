//! Upload service
//!
//! Ties the pieces together: validate, store, deep scan, and quarantine
//! whatever the scan does not clear.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::UploadConfig;
use crate::error::UploadGuardError;
use crate::storage::{
    DeepScanner, FileStorage, HeaderScanner, LocalFileStorage, QuarantineManager, QuarantineRecord,
    ScanResult, StoredFile, UploadCandidate, ValidationOutcome, ValidationPipeline, Warning,
};

/// What happened to an upload
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadDecision {
    /// Validation failed; nothing was written
    Rejected {
        /// The failing outcome
        outcome: ValidationOutcome,
    },

    /// Stored and scanned clean
    Stored {
        /// The stored file
        file: StoredFile,
        /// Advisory warnings from validation
        warnings: Vec<Warning>,
    },

    /// Stored, then moved to quarantine by the deep scan
    Quarantined {
        /// Where the file went and why
        record: QuarantineRecord,
        /// Advisory warnings from validation
        warnings: Vec<Warning>,
    },
}

impl UploadDecision {
    /// Returns true if the file is in managed storage
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    /// The stored file, if the upload was accepted
    #[must_use]
    pub const fn stored_file(&self) -> Option<&StoredFile> {
        match self {
            Self::Stored { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// Validates, stores and scans uploads
///
/// # Examples
///
/// ```rust,no_run
/// use upload_guard::config::UploadConfig;
/// use upload_guard::service::UploadService;
/// use upload_guard::storage::UploadCandidate;
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = UploadService::from_config(&UploadConfig::default())?;
///
/// let candidate = UploadCandidate::from_path("/tmp/incoming/photo.jpg")?;
/// let decision = service.process_upload(candidate, None).await?;
/// println!("{}", serde_json::to_string_pretty(&decision)?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct UploadService<S = LocalFileStorage, D = HeaderScanner> {
    pipeline: Arc<ValidationPipeline>,
    storage: S,
    scanner: D,
    quarantine: Arc<QuarantineManager>,
    default_subdirectory: String,
}

impl UploadService {
    /// Builds the standard service from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the managed root or quarantine root is unusable.
    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadGuardError> {
        let storage = LocalFileStorage::from_config(config)?;
        let quarantine = QuarantineManager::from_config(config)?;

        Ok(Self::new(
            ValidationPipeline::from_config(config),
            storage,
            HeaderScanner::new(config.max_file_size_bytes),
            quarantine,
            config.default_subdirectory.clone(),
        ))
    }
}

impl<S: FileStorage, D: DeepScanner> UploadService<S, D> {
    /// Assembles a service from its parts
    pub fn new(
        pipeline: ValidationPipeline,
        storage: S,
        scanner: D,
        quarantine: QuarantineManager,
        default_subdirectory: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            storage,
            scanner,
            quarantine: Arc::new(quarantine),
            default_subdirectory: default_subdirectory.into(),
        }
    }

    /// The validation pipeline
    #[must_use]
    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.pipeline
    }

    /// The quarantine area
    #[must_use]
    pub fn quarantine(&self) -> &QuarantineManager {
        &self.quarantine
    }

    /// Runs one upload through validation, storage and the deep scan
    ///
    /// A rejected candidate is `Ok(UploadDecision::Rejected)`. If the scan
    /// flags the file but quarantine fails, the file stays at its stored path
    /// and the quarantine error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or quarantine fails.
    pub async fn process_upload(
        &self,
        candidate: UploadCandidate,
        subdirectory: Option<&str>,
    ) -> Result<UploadDecision, UploadGuardError> {
        let pipeline = Arc::clone(&self.pipeline);
        let admitted = match tokio::task::spawn_blocking(move || pipeline.admit(candidate)).await? {
            Ok(admitted) => admitted,
            Err(outcome) => return Ok(UploadDecision::Rejected { outcome }),
        };

        let warnings = admitted.outcome().warnings().to_vec();
        let subdirectory = subdirectory.unwrap_or(&self.default_subdirectory);
        let file = self.storage.store(admitted, subdirectory).await?;

        let verdict = match self.scanner.scan(&file).await {
            Ok(verdict) => verdict,
            Err(e) => ScanResult::Error {
                message: e.to_string(),
            },
        };

        if verdict.is_clean() {
            info!(path = %file.path().display(), hash = %file.content_hash(), "Upload stored");
            return Ok(UploadDecision::Stored { file, warnings });
        }

        warn!(path = %file.path().display(), verdict = %verdict, "Deep scan flagged stored file");
        let quarantine = Arc::clone(&self.quarantine);
        let reason = verdict.to_string();
        let flagged = file.clone();
        let record = tokio::task::spawn_blocking(move || quarantine.quarantine(&flagged, &reason))
            .await?
            .inspect_err(|e| {
                error!(path = %file.path().display(), error = %e, "Failed to quarantine flagged upload");
            })?;

        Ok(UploadDecision::Quarantined { record, warnings })
    }

    /// Deletes a stored file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is outside managed storage or cannot be removed.
    pub async fn delete(&self, file: &StoredFile) -> Result<(), UploadGuardError> {
        Ok(self.storage.delete(file).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::scanning::MockDeepScanner;
    use crate::storage::traits::MockFileStorage;
    use crate::storage::{NoOpScanner, StorageError};
    use std::io;
    use tempfile::TempDir;

    fn jpeg(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        data.resize(len, 0);
        data
    }

    fn config(temp: &TempDir) -> UploadConfig {
        UploadConfig {
            managed_root: temp.path().to_path_buf(),
            ..UploadConfig::default()
        }
    }

    fn service_with<D: DeepScanner>(config: &UploadConfig, scanner: D) -> UploadService<LocalFileStorage, D> {
        UploadService::new(
            ValidationPipeline::from_config(config),
            LocalFileStorage::from_config(config).unwrap(),
            scanner,
            QuarantineManager::from_config(config).unwrap(),
            "images",
        )
    }

    #[tokio::test]
    async fn test_clean_upload_is_stored() {
        let temp = TempDir::new().unwrap();
        let service = UploadService::from_config(&config(&temp)).unwrap();

        let decision = service
            .process_upload(UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(64)), None)
            .await
            .unwrap();

        let file = decision.stored_file().unwrap();
        assert!(file.path().exists());
        assert!(file.path().parent().unwrap().ends_with("images"));
    }

    #[tokio::test]
    async fn test_rejected_upload_never_reaches_storage() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let mut storage = MockFileStorage::new();
        storage.expect_store().never();

        let service = UploadService::new(
            ValidationPipeline::from_config(&config),
            storage,
            NoOpScanner::new(),
            QuarantineManager::from_config(&config).unwrap(),
            "images",
        );

        let decision = service
            .process_upload(UploadCandidate::new("../../etc/passwd.jpg", "image/jpeg", jpeg(64)), None)
            .await
            .unwrap();

        match decision {
            UploadDecision::Rejected { outcome } => assert!(outcome.has_error("directory_traversal")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let mut storage = MockFileStorage::new();
        storage.expect_store().times(1).returning(|_, _| {
            Err(StorageError::PathCollisionExhausted {
                base: "photo.jpg".to_string(),
                attempts: 3,
            })
        });

        let service = UploadService::new(
            ValidationPipeline::from_config(&config),
            storage,
            NoOpScanner::new(),
            QuarantineManager::from_config(&config).unwrap(),
            "images",
        );

        let err = service
            .process_upload(UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(64)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadGuardError::Storage(StorageError::PathCollisionExhausted { .. })));
    }

    #[tokio::test]
    async fn test_suspicious_upload_is_quarantined() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let mut scanner = MockDeepScanner::new();
        scanner.expect_scan().times(1).returning(|_| {
            Ok(ScanResult::Suspicious {
                reason: "test signature".to_string(),
            })
        });
        let service = service_with(&config, scanner);

        let decision = service
            .process_upload(UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(64)), Some("avatars"))
            .await
            .unwrap();

        let UploadDecision::Quarantined { record, .. } = decision else {
            panic!("expected quarantine");
        };
        assert!(record.quarantine_path().exists());
        assert!(!record.original_path().exists());
        assert!(record.reason().contains("test signature"));
        assert_eq!(service.quarantine().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scanner_failure_counts_as_unsafe() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let mut scanner = MockDeepScanner::new();
        scanner.expect_scan().returning(|file| {
            Err(StorageError::HashReadbackFailure {
                path: file.path().to_path_buf(),
                source: io::Error::other("scanner offline"),
            })
        });
        let service = service_with(&config, scanner);

        let decision = service
            .process_upload(UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(64)), None)
            .await
            .unwrap();

        assert!(matches!(decision, UploadDecision::Quarantined { .. }));
    }

    #[tokio::test]
    async fn test_warnings_are_carried_through() {
        let temp = TempDir::new().unwrap();
        let service = service_with(&config(&temp), NoOpScanner::new());

        let decision = service
            .process_upload(UploadCandidate::new("shell.php.jpg", "image/jpeg", jpeg(64)), None)
            .await
            .unwrap();

        let UploadDecision::Stored { warnings, .. } = decision else {
            panic!("expected stored");
        };
        assert!(warnings.iter().any(|w| w.code() == "double_extension"));
    }

    #[tokio::test]
    async fn test_decision_serializes_with_status_tag() {
        let temp = TempDir::new().unwrap();
        let service = service_with(&config(&temp), NoOpScanner::new());

        let decision = service
            .process_upload(UploadCandidate::new("a.jpg", "image/jpeg", Vec::new()), None)
            .await
            .unwrap();

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["status"], "rejected");
    }

    #[tokio::test]
    async fn test_delete_removes_stored_file() {
        let temp = TempDir::new().unwrap();
        let service = service_with(&config(&temp), NoOpScanner::new());

        let decision = service
            .process_upload(UploadCandidate::new("photo.png", "image/png", png()), None)
            .await
            .unwrap();
        let file = decision.stored_file().unwrap().clone();

        service.delete(&file).await.unwrap();
        assert!(!file.path().exists());
    }

    fn png() -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.resize(64, 0);
        data
    }
}
