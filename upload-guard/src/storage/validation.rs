//! Content sniffing with magic number checking
//!
//! The declared content type of an upload is never trusted. This module
//! reads a bounded prefix of the content and matches it against known image
//! signatures at offset zero. When a signature matches and the extension
//! carries an expectation that disagrees, the upload is rejected.
//!
//! Content that matches no signature is not rejected here; it only produces
//! a warning, optionally labelled with a best-effort guess from `infer`.
//!
//! # Examples
//!
//! ```rust
//! use upload_guard::storage::validation::ContentSniffer;
//!
//! assert_eq!(ContentSniffer::detect_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
//! assert_eq!(ContentSniffer::detect_mime(b"GIF89a"), Some("image/gif"));
//! assert_eq!(ContentSniffer::detect_mime(b"plain text"), None);
//! ```

use super::pipeline::{CandidateView, Findings, Validator};
use super::policy::expected_mime_types;
use super::types::{UploadCandidate, ValidationError, Warning};
use std::io;

/// Default number of prefix bytes read for sniffing
pub const DEFAULT_SNIFF_BYTES: usize = 1024;

/// Smallest prefix the sniffer will read
pub const MIN_SNIFF_BYTES: usize = 512;

const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Signatures checked at offset zero, first match wins
const MAGIC_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (PNG_SIGNATURE, "image/png"),
    (b"GIF8", "image/gif"),
    (b"BM", "image/bmp"),
    (b"RIFF", "image/webp"),
];

/// Declared types that carry no information
const GENERIC_CONTENT_TYPES: &[&str] = &["", "application/octet-stream"];

/// Detects content types from magic bytes
#[derive(Debug, Clone, Copy)]
pub struct ContentSniffer {
    prefix_len: usize,
}

impl Default for ContentSniffer {
    fn default() -> Self {
        Self::new(DEFAULT_SNIFF_BYTES)
    }
}

impl ContentSniffer {
    /// Creates a sniffer reading `prefix_len` bytes, raised to [`MIN_SNIFF_BYTES`]
    #[must_use]
    pub fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len: prefix_len.max(MIN_SNIFF_BYTES),
        }
    }

    /// Number of prefix bytes read
    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Reads the sniffing prefix of a candidate
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised by the candidate's source.
    pub fn sniff(&self, candidate: &mut UploadCandidate) -> io::Result<Vec<u8>> {
        candidate.read_prefix(self.prefix_len)
    }

    /// Matches the prefix against known signatures
    #[must_use]
    pub fn detect_mime(prefix: &[u8]) -> Option<&'static str> {
        MAGIC_SIGNATURES
            .iter()
            .find(|(signature, _)| prefix.starts_with(signature))
            .map(|(_, mime)| *mime)
    }

    /// Best-effort label for content no signature matched
    #[must_use]
    pub fn content_hint(prefix: &[u8]) -> Option<String> {
        infer::get(prefix).map(|kind| kind.mime_type().to_string())
    }
}

impl Validator for ContentSniffer {
    fn name(&self) -> &'static str {
        "content"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        let mut findings = Findings::default();

        let Some(detected) = candidate.detected_mime else {
            if !candidate.prefix.is_empty() {
                findings.warn(Warning::UnrecognizedContent {
                    hint: Self::content_hint(candidate.prefix),
                });
            }
            return findings;
        };

        if let Some(extension) = candidate.extension() {
            let expected = expected_mime_types(&extension);
            if !expected.is_empty() && !expected.contains(&detected) {
                findings.error(ValidationError::ContentExtensionMismatch {
                    detected,
                    extension,
                });
            }
        }

        let declared = candidate
            .declared_content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !GENERIC_CONTENT_TYPES.contains(&declared.as_str()) && declared != detected {
            findings.warn(Warning::DeclaredTypeMismatch { declared, detected });
        }

        findings
    }
}
