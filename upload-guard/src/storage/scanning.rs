//! Signature scanning for uploaded content
//!
//! Two layers live here:
//!
//! - [`SignatureScanner`] runs inside the validation pipeline. It rejects
//!   content that starts with an executable header and looks for script
//!   markers in the sniffed prefix.
//! - [`DeepScanner`] runs after a file has been stored. A non-clean verdict
//!   sends the file to quarantine. [`HeaderScanner`] is the built-in
//!   implementation; [`NoOpScanner`] always reports clean.
//!
//! # Examples
//!
//! ```rust
//! use upload_guard::storage::scanning::SignatureScanner;
//!
//! assert_eq!(SignatureScanner::executable_signature(b"MZ\x90\x00"), Some("PE"));
//! assert_eq!(SignatureScanner::find_script_marker(b"<SCRIPT>alert(1)"), Some("<script"));
//! ```

use super::pipeline::{CandidateView, Findings, Validator};
use super::types::{StorageResult, StoredFile, ValidationError, Warning};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Executable headers rejected at offset zero
pub const EXECUTABLE_SIGNATURES: &[(&str, &[u8])] = &[
    ("PE", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
];

/// Script markers, matched case-insensitively
pub const SCRIPT_MARKERS: &[&str] = &[
    "<script",
    "javascript:",
    "vbscript:",
    "<?php",
    "<%",
    "onload=",
    "onerror=",
];

/// Reported for a `#!` at the start of a line
const SHEBANG_MARKER: &str = "#!";

/// Extensions whose content is treated as text
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "html", "htm", "xml", "svg"];

/// Bytes read from a stored file by [`HeaderScanner`]
pub const DEEP_SCAN_HEADER_BYTES: usize = 1024;

/// Markers the post-storage scan flags anywhere in the header
const DEEP_SCAN_MARKERS: &[&str] = &["<script", "javascript:", "vbscript:", "<?php"];

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Prefix checks for executables and embedded scripts
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureScanner;

impl SignatureScanner {
    /// Name of the executable format the prefix starts with, if any
    #[must_use]
    pub fn executable_signature(prefix: &[u8]) -> Option<&'static str> {
        EXECUTABLE_SIGNATURES
            .iter()
            .find(|(_, magic)| prefix.starts_with(magic))
            .map(|(name, _)| *name)
    }

    /// First script marker found in the prefix, if any
    #[must_use]
    pub fn find_script_marker(prefix: &[u8]) -> Option<&'static str> {
        let lower = prefix.to_ascii_lowercase();

        if let Some(marker) = SCRIPT_MARKERS
            .iter()
            .copied()
            .find(|marker| contains_subslice(&lower, marker.as_bytes()))
        {
            return Some(marker);
        }

        let shebang = SHEBANG_MARKER.as_bytes();
        (lower.starts_with(shebang) || contains_subslice(&lower, b"\n#!")).then_some(SHEBANG_MARKER)
    }

    /// Returns true if files with this extension are treated as text
    #[must_use]
    pub fn is_text_extension(extension: &str) -> bool {
        TEXT_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
    }
}

impl Validator for SignatureScanner {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        let mut findings = Findings::default();

        if let Some(signature) = Self::executable_signature(candidate.prefix) {
            findings.error(ValidationError::MaliciousSignature { signature });
        }

        if let Some(marker) = Self::find_script_marker(candidate.prefix) {
            let is_text = candidate
                .extension()
                .is_some_and(|extension| Self::is_text_extension(&extension));
            if is_text {
                findings.error(ValidationError::EmbeddedScript { marker });
            } else {
                findings.warn(Warning::ScriptMarker { marker });
            }
        }

        findings
    }
}

/// Verdict of a post-storage scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ScanResult {
    /// Nothing suspicious found
    Clean,

    /// The file looks dangerous
    Suspicious {
        /// What was found
        reason: String,
    },

    /// The scan could not complete; treated as unsafe
    Error {
        /// Error message
        message: String,
    },
}

impl ScanResult {
    /// Returns true only for [`ScanResult::Clean`]
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "Clean"),
            Self::Suspicious { reason } => write!(f, "Suspicious: {reason}"),
            Self::Error { message } => write!(f, "Scan error: {message}"),
        }
    }
}

/// Post-storage scanner
///
/// Runs against a file already written to managed storage. Implementations
/// report I/O trouble as [`ScanResult::Error`]; the `Err` arm is reserved for
/// a scanner that cannot run at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeepScanner: Send + Sync {
    /// Scans a stored file
    ///
    /// # Errors
    ///
    /// Returns error if the scanner itself is unusable
    async fn scan(&self, file: &StoredFile) -> StorageResult<ScanResult>;

    /// Returns the name of the scanner implementation
    fn name(&self) -> &'static str;

    /// Checks if the scanner is available and functional
    async fn is_available(&self) -> bool;
}

/// Scanner that always reports clean
#[derive(Debug, Clone, Default)]
pub struct NoOpScanner;

impl NoOpScanner {
    /// Creates a new no-op scanner
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeepScanner for NoOpScanner {
    async fn scan(&self, _file: &StoredFile) -> StorageResult<ScanResult> {
        Ok(ScanResult::Clean)
    }

    fn name(&self) -> &'static str {
        "NoOp Scanner"
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Header-based scanner for stored files
///
/// Reads the first [`DEEP_SCAN_HEADER_BYTES`] of a file and flags
/// executable signatures or script markers found anywhere in them, as well
/// as files more than twice the configured size cap.
#[derive(Debug, Clone, Copy)]
pub struct HeaderScanner {
    max_file_size: u64,
}

impl HeaderScanner {
    /// Creates a scanner for the given size cap
    #[must_use]
    pub const fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Judges a header and file size
    #[must_use]
    pub fn assess(&self, header: &[u8], size: u64) -> ScanResult {
        if let Some((name, _)) = EXECUTABLE_SIGNATURES
            .iter()
            .find(|(_, magic)| contains_subslice(header, magic))
        {
            return ScanResult::Suspicious {
                reason: format!("{name} executable signature in header"),
            };
        }

        let lower = header.to_ascii_lowercase();
        if let Some(marker) = DEEP_SCAN_MARKERS
            .iter()
            .find(|marker| contains_subslice(&lower, marker.as_bytes()))
        {
            return ScanResult::Suspicious {
                reason: format!("script marker '{marker}' in header"),
            };
        }

        if size > self.max_file_size.saturating_mul(2) {
            return ScanResult::Suspicious {
                reason: format!("unusually large file ({size} bytes)"),
            };
        }

        ScanResult::Clean
    }

    /// Scans a file on disk
    pub async fn scan_path(&self, path: &Path) -> ScanResult {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => return scan_error(path, &e),
        };
        let size = match file.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) => return scan_error(path, &e),
        };

        let mut header = Vec::with_capacity(DEEP_SCAN_HEADER_BYTES);
        if let Err(e) = file
            .take(DEEP_SCAN_HEADER_BYTES as u64)
            .read_to_end(&mut header)
            .await
        {
            return scan_error(path, &e);
        }

        self.assess(&header, size)
    }

    /// Scans a file on disk without an async runtime
    #[must_use]
    pub fn scan_path_blocking(&self, path: &Path) -> ScanResult {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) => return scan_error(path, &e),
        };
        let size = match file.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => return scan_error(path, &e),
        };

        let mut header = Vec::with_capacity(DEEP_SCAN_HEADER_BYTES);
        if let Err(e) = file
            .take(DEEP_SCAN_HEADER_BYTES as u64)
            .read_to_end(&mut header)
        {
            return scan_error(path, &e);
        }

        self.assess(&header, size)
    }
}

fn scan_error(path: &Path, error: &std::io::Error) -> ScanResult {
    ScanResult::Error {
        message: format!("cannot read {}: {error}", path.display()),
    }
}

#[async_trait]
impl DeepScanner for HeaderScanner {
    async fn scan(&self, file: &StoredFile) -> StorageResult<ScanResult> {
        Ok(self.scan_path(file.path()).await)
    }

    fn name(&self) -> &'static str {
        "Header Scanner"
    }

    async fn is_available(&self) -> bool {
        true
    }
}
