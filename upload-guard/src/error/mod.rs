//! Error types and error handling

use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::storage::{QuarantineError, StorageError};

/// Top-level error for the upload service
///
/// Validation failures are not errors here; they come back as a rejected
/// [`crate::service::UploadDecision`].
#[derive(Debug, Error)]
pub enum UploadGuardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Quarantine error
    #[error(transparent)]
    Quarantine(#[from] QuarantineError),

    /// Scheduled job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_is_transparent() {
        let inner = StorageError::PathEscape("../etc".to_string());
        let message = inner.to_string();
        let err = UploadGuardError::from(inner);
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn test_config_error_is_prefixed() {
        let err = UploadGuardError::from(ConfigError::Invalid("sniff_bytes too small".to_string()));
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
