//! upload-guard: validation, storage and quarantine for untrusted uploads
//!
//! Every upload is treated as hostile until proven otherwise:
//!
//! - **Validation** checks the filename, size, extension and a bounded
//!   content prefix before anything touches disk
//! - **Storage** writes only admitted uploads, under collision-free names
//!   inside a single managed root, and records a SHA-256 of what was written
//! - **Quarantine** moves files a post-write scan flags into an isolated
//!   area with a provenance sidecar
//! - **Retention** deletes stored files older than a configured window
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use upload_guard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     upload_guard::observability::init()?;
//!
//!     let config = UploadConfig::load(None)?;
//!     let service = UploadService::from_config(&config)?;
//!
//!     let candidate = UploadCandidate::from_path("incoming/photo.jpg")?;
//!     match service.process_upload(candidate, None).await? {
//!         UploadDecision::Stored { file, .. } => println!("stored at {}", file.path().display()),
//!         UploadDecision::Quarantined { record, .. } => println!("quarantined: {}", record.reason()),
//!         UploadDecision::Rejected { outcome } => println!("rejected: {:?}", outcome.error_codes()),
//!     }
//!
//!     Ok(())
//! }
//! ```

// Lint configuration is handled at the workspace level in Cargo.toml
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod jobs;
pub mod observability;
pub mod service;
pub mod storage;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use upload_guard::prelude::*;
    //! ```

    // Configuration
    pub use crate::config::{ConfigError, UploadConfig};

    // Error types
    pub use crate::error::UploadGuardError;

    // Service
    pub use crate::service::{UploadDecision, UploadService};

    // Validation
    pub use crate::storage::{
        AdmittedUpload, ExtensionPolicy, UploadCandidate, ValidationError, ValidationOutcome,
        ValidationPipeline, Validator, Warning,
    };

    // Storage and quarantine
    pub use crate::storage::{
        DeepScanner, FileStorage, HeaderScanner, IntegrityHasher, LocalFileStorage, QuarantineError,
        QuarantineManager, QuarantineRecord, RetentionSweeper, ScanResult, StorageAllocator,
        StorageError, StoredFile,
    };

    // Scheduled sweeps
    pub use crate::jobs::{CancellationToken, JobError, RetentionJob, SweepSchedule};
}
