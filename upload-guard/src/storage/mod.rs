//! Upload validation, storage and quarantine
//!
//! An upload moves through these stages:
//!
//! 1. [`ValidationPipeline`] checks the candidate's filename, size,
//!    extension and content prefix, producing a [`ValidationOutcome`].
//! 2. A passing candidate becomes an [`AdmittedUpload`], the only thing
//!    [`FileStorage::store`] accepts.
//! 3. [`LocalFileStorage`] claims a unique path with [`StorageAllocator`],
//!    writes the content and hashes it with [`IntegrityHasher`].
//! 4. A [`DeepScanner`] inspects the stored file; anything not clean is
//!    moved aside by [`QuarantineManager`].
//! 5. [`RetentionSweeper`] deletes managed files past the retention window.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upload_guard::storage::{FileStorage, LocalFileStorage, StorageAllocator, UploadCandidate, ValidationPipeline};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = ValidationPipeline::default();
//! let storage = LocalFileStorage::new(StorageAllocator::new("/var/uploads")?);
//!
//! let candidate = UploadCandidate::from_path("/tmp/incoming/photo.jpg")?;
//! match pipeline.admit(candidate) {
//!     Ok(admitted) => {
//!         let stored = storage.store(admitted, "images").await?;
//!         println!("Stored at {}", stored.path().display());
//!     }
//!     Err(outcome) => println!("Rejected: {:?}", outcome.error_codes()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod filename;
pub mod hasher;
pub mod local;
pub mod pipeline;
pub mod policy;
pub mod quarantine;
pub mod retention;
pub mod scanning;
pub mod status;
pub mod traits;
pub mod types;
pub mod validation;

pub use allocator::{ClaimedPath, StorageAllocator};
pub use filename::{FilenameSanitizer, TraversalGuard};
pub use hasher::IntegrityHasher;
pub use local::LocalFileStorage;
pub use pipeline::{AdmittedUpload, CandidateView, Findings, SizeLimits, ValidationPipeline, Validator};
pub use policy::{ExtensionClass, ExtensionPolicy, PolicyBuilder};
pub use quarantine::{QuarantineManager, ReconcileAction, RelocateOps, StdRelocate};
pub use retention::{RetentionSweeper, SweepFailure, SweepReport};
pub use scanning::{DeepScanner, HeaderScanner, NoOpScanner, ScanResult, SignatureScanner};
pub use status::{FileInfo, FlaggedFile, StatusReport};
pub use traits::FileStorage;
pub use types::{
    CandidateSource, QuarantineError, QuarantineRecord, QuarantineResult, StorageError, StorageResult,
    StoredFile, SuspiciousPattern, UploadCandidate, ValidationError, ValidationOutcome, Warning,
};
pub use validation::ContentSniffer;
