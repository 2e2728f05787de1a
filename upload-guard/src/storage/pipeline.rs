//! Validation pipeline
//!
//! The pipeline runs every validator against a candidate and merges their
//! findings into one [`ValidationOutcome`]. Validators never short-circuit
//! each other, so a rejected candidate reports all of its problems at once.
//!
//! Validation is a pure function of the candidate's filename, declared
//! content type, size and content prefix. It has no filesystem side
//! effects, and validating the same candidate twice yields equal outcomes.
//!
//! Storage only accepts an [`AdmittedUpload`], which can only be obtained
//! from [`ValidationPipeline::admit`] with a valid outcome.
//!
//! # Examples
//!
//! ```rust
//! use upload_guard::storage::{UploadCandidate, ValidationPipeline};
//!
//! let pipeline = ValidationPipeline::default();
//!
//! let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
//! jpeg.resize(64, 0);
//! let mut candidate = UploadCandidate::new("photo.jpg", "image/jpeg", jpeg);
//! assert!(pipeline.validate(&mut candidate).is_valid());
//!
//! let outcome = pipeline.validate_bytes("../../etc/passwd", "text/plain", b"root:x:0:0");
//! assert!(outcome.has_error("directory_traversal"));
//! ```

use super::filename::{FilenameSanitizer, TraversalGuard};
use super::policy::{extension_of, ExtensionPolicy};
use super::scanning::SignatureScanner;
use super::types::{UploadCandidate, ValidationError, ValidationOutcome, Warning};
use super::validation::ContentSniffer;
use crate::config::UploadConfig;
use std::fmt;
use tracing::{debug, info, warn};

/// Default size cap in bytes
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Everything a validator may look at
#[derive(Debug, Clone, Copy)]
pub struct CandidateView<'a> {
    /// Declared (untrusted) filename
    pub filename: &'a str,
    /// Declared (advisory) content type
    pub declared_content_type: &'a str,
    /// Measured size in bytes
    pub size: u64,
    /// Bounded content prefix
    pub prefix: &'a [u8],
    /// MIME type matched from the prefix
    pub detected_mime: Option<&'static str>,
}

impl<'a> CandidateView<'a> {
    /// Builds a view, detecting the MIME type from `prefix`
    #[must_use]
    pub fn new(filename: &'a str, declared_content_type: &'a str, size: u64, prefix: &'a [u8]) -> Self {
        Self {
            filename,
            declared_content_type,
            size,
            prefix,
            detected_mime: ContentSniffer::detect_mime(prefix),
        }
    }

    /// Lower-cased extension of the filename
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        extension_of(self.filename)
    }
}

/// Errors and warnings produced by one validator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    /// Terminal errors
    pub errors: Vec<ValidationError>,
    /// Advisories
    pub warnings: Vec<Warning>,
}

impl Findings {
    /// Findings holding only errors
    #[must_use]
    pub const fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            errors,
            warnings: Vec::new(),
        }
    }

    /// Records an error
    pub fn error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Records a warning
    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

/// One stage of the validation pipeline
pub trait Validator: fmt::Debug + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Inspects a candidate
    fn check(&self, candidate: &CandidateView<'_>) -> Findings;
}

/// Rejects empty files and files above the size cap
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    max_file_size: u64,
}

impl SizeLimits {
    /// Creates limits with the given cap in bytes
    #[must_use]
    pub const fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl Validator for SizeLimits {
    fn name(&self) -> &'static str {
        "size"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        let mut findings = Findings::default();
        if candidate.size == 0 {
            findings.error(ValidationError::EmptyFile);
        } else if candidate.size > self.max_file_size {
            findings.error(ValidationError::FileTooLarge {
                size: candidate.size,
                max: self.max_file_size,
            });
        }
        findings
    }
}

/// Ordered set of validators
#[derive(Debug)]
pub struct ValidationPipeline {
    sniffer: ContentSniffer,
    validators: Vec<Box<dyn Validator>>,
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::standard(
            FilenameSanitizer::default(),
            DEFAULT_MAX_FILE_SIZE,
            ExtensionPolicy::default(),
            ContentSniffer::default(),
        )
    }
}

impl ValidationPipeline {
    /// Builds the standard pipeline from configuration
    #[must_use]
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::standard(
            FilenameSanitizer::new(config.max_filename_length),
            config.max_file_size_bytes,
            ExtensionPolicy::new(&config.allowed_extensions),
            ContentSniffer::new(config.sniff_bytes),
        )
    }

    fn standard(
        sanitizer: FilenameSanitizer,
        max_file_size: u64,
        policy: ExtensionPolicy,
        sniffer: ContentSniffer,
    ) -> Self {
        Self::with_validators(
            sniffer,
            vec![
                Box::new(sanitizer),
                Box::new(SizeLimits::new(max_file_size)),
                Box::new(policy),
                Box::new(sniffer),
                Box::new(SignatureScanner),
                Box::new(TraversalGuard),
            ],
        )
    }

    /// Builds a pipeline from an explicit validator list
    ///
    /// `sniffer` decides how much of the content prefix validators see.
    #[must_use]
    pub fn with_validators(sniffer: ContentSniffer, validators: Vec<Box<dyn Validator>>) -> Self {
        Self {
            sniffer,
            validators,
        }
    }

    /// Validator names, in run order
    #[must_use]
    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|validator| validator.name()).collect()
    }

    /// Validates a candidate
    ///
    /// Reads at most the sniffing prefix from the candidate's source. A
    /// source that cannot be read is validated as if its prefix were empty
    /// and carries a warning.
    pub fn validate(&self, candidate: &mut UploadCandidate) -> ValidationOutcome {
        let mut warnings = Vec::new();
        let prefix = match self.sniffer.sniff(candidate) {
            Ok(prefix) => prefix,
            Err(e) => {
                warn!(filename = ?candidate.filename(), error = %e, "Failed to read content prefix");
                warnings.push(Warning::ContentUnreadable {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        self.evaluate(
            candidate.filename(),
            candidate.content_type(),
            candidate.size(),
            &prefix,
            warnings,
        )
    }

    /// Validates an in-memory upload
    #[must_use]
    pub fn validate_bytes(&self, filename: &str, content_type: &str, data: &[u8]) -> ValidationOutcome {
        let prefix = &data[..data.len().min(self.sniffer.prefix_len())];
        self.evaluate(filename, content_type, data.len() as u64, prefix, Vec::new())
    }

    fn evaluate(
        &self,
        filename: &str,
        content_type: &str,
        size: u64,
        prefix: &[u8],
        mut warnings: Vec<Warning>,
    ) -> ValidationOutcome {
        let view = CandidateView::new(filename, content_type, size, prefix);

        let mut errors = Vec::new();
        for validator in &self.validators {
            let findings = validator.check(&view);
            if !findings.errors.is_empty() {
                debug!(
                    validator = validator.name(),
                    errors = findings.errors.len(),
                    "Validator rejected candidate"
                );
            }
            errors.extend(findings.errors);
            warnings.extend(findings.warnings);
        }

        let outcome = ValidationOutcome::new(errors, warnings, view.detected_mime, size);
        if outcome.is_valid() {
            info!(
                filename = ?filename,
                size,
                detected_mime = view.detected_mime.unwrap_or("unknown"),
                warnings = outcome.warnings().len(),
                "Upload candidate accepted"
            );
        } else {
            warn!(
                filename = ?filename,
                size,
                errors = ?outcome.error_codes(),
                "Upload candidate rejected"
            );
        }
        outcome
    }

    /// Validates a candidate and, if it passes, returns an admission token
    ///
    /// # Errors
    ///
    /// Returns the failing [`ValidationOutcome`] when the candidate is invalid.
    pub fn admit(&self, mut candidate: UploadCandidate) -> Result<AdmittedUpload, ValidationOutcome> {
        let outcome = self.validate(&mut candidate);
        if outcome.is_valid() {
            Ok(AdmittedUpload { candidate, outcome })
        } else {
            Err(outcome)
        }
    }
}

/// A candidate that passed validation
///
/// Only [`ValidationPipeline::admit`] creates these, so holding one proves
/// the candidate was validated.
#[derive(Debug)]
pub struct AdmittedUpload {
    candidate: UploadCandidate,
    outcome: ValidationOutcome,
}

impl AdmittedUpload {
    /// The passing outcome, including any warnings
    #[must_use]
    pub const fn outcome(&self) -> &ValidationOutcome {
        &self.outcome
    }

    /// Declared filename
    #[must_use]
    pub fn filename(&self) -> &str {
        self.candidate.filename()
    }

    pub(crate) fn into_parts(self) -> (UploadCandidate, ValidationOutcome) {
        (self.candidate, self.outcome)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(candidate: UploadCandidate, outcome: ValidationOutcome) -> Self {
        Self { candidate, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read, Seek, SeekFrom};

    fn jpeg(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        data.resize(len, 0);
        data
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(
            ValidationPipeline::default().validator_names(),
            vec!["filename", "size", "extension", "content", "signature", "traversal"]
        );
    }

    #[test]
    fn test_valid_jpeg() {
        let pipeline = ValidationPipeline::default();
        let mut candidate = UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(2048));

        let outcome = pipeline.validate(&mut candidate);
        assert!(outcome.is_valid(), "{:?}", outcome.errors());
        assert_eq!(outcome.detected_mime(), Some("image/jpeg"));
        assert_eq!(outcome.size(), 2048);
    }

    #[test]
    fn test_errors_accumulate_across_validators() {
        let outcome = ValidationPipeline::default().validate_bytes("../evil.exe", "", b"MZ\x90\x00");
        let codes = outcome.error_codes();

        assert!(codes.contains(&"suspicious_pattern"));
        assert!(codes.contains(&"dangerous_extension"));
        assert!(codes.contains(&"extension_not_allowed"));
        assert!(codes.contains(&"malicious_signature"));
        assert!(codes.contains(&"directory_traversal"));
    }

    #[test]
    fn test_size_limits() {
        let pipeline = ValidationPipeline::default();

        let outcome = pipeline.validate_bytes("empty.jpg", "image/jpeg", &[]);
        assert_eq!(outcome.error_codes(), vec!["empty_file"]);

        let big = jpeg(usize::try_from(DEFAULT_MAX_FILE_SIZE).unwrap() + 1);
        let outcome = pipeline.validate_bytes("big.jpg", "image/jpeg", &big);
        assert_eq!(outcome.error_codes(), vec!["file_too_large"]);

        let exact = jpeg(usize::try_from(DEFAULT_MAX_FILE_SIZE).unwrap());
        assert!(pipeline.validate_bytes("exact.jpg", "image/jpeg", &exact).is_valid());
    }

    #[test]
    fn test_validate_is_repeatable() {
        let pipeline = ValidationPipeline::default();
        let mut candidate = UploadCandidate::new("shell.php.jpg", "image/png", jpeg(600));

        let first = pipeline.validate(&mut candidate);
        let second = pipeline.validate(&mut candidate);
        assert_eq!(first, second);
        assert!(first.has_warning("double_extension"));
        assert!(first.has_warning("declared_type_mismatch"));
    }

    #[test]
    fn test_admit() {
        let pipeline = ValidationPipeline::default();

        let admitted = pipeline
            .admit(UploadCandidate::new("photo.jpg", "image/jpeg", jpeg(100)))
            .unwrap();
        assert_eq!(admitted.filename(), "photo.jpg");
        assert!(admitted.outcome().is_valid());

        let rejected = pipeline
            .admit(UploadCandidate::new("photo.gif", "image/gif", b"GIF89a".to_vec()))
            .unwrap_err();
        assert!(rejected.has_error("extension_not_allowed"));
    }

    #[derive(Debug)]
    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    impl Seek for BrokenSource {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_unreadable_source_warns() {
        let mut candidate = UploadCandidate::from_reader("photo.jpg", "image/jpeg", BrokenSource).unwrap();
        let outcome = ValidationPipeline::default().validate(&mut candidate);

        // Seek reports a zero length, so the size check fires too
        assert!(outcome.has_error("empty_file"));
        assert!(outcome.has_warning("content_unreadable"));
    }

    #[derive(Debug)]
    struct RejectEverything;

    impl Validator for RejectEverything {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn check(&self, _candidate: &CandidateView<'_>) -> Findings {
            Findings::from_errors(vec![ValidationError::EmptyFilename])
        }
    }

    #[test]
    fn test_custom_validators() {
        let pipeline =
            ValidationPipeline::with_validators(ContentSniffer::default(), vec![Box::new(RejectEverything)]);
        assert_eq!(pipeline.validator_names(), vec!["reject"]);
        assert!(!pipeline.validate_bytes("photo.jpg", "image/jpeg", &jpeg(10)).is_valid());
    }
}
