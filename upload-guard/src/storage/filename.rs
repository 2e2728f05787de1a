//! Filename checks for untrusted upload names
//!
//! Two validators live here:
//!
//! - [`FilenameSanitizer`] rejects names that are empty, too long, contain
//!   control characters, use reserved device names or match suspicious
//!   patterns. It also derives the on-disk storage name.
//! - [`TraversalGuard`] rejects names carrying directory traversal tokens,
//!   including their percent-encoded forms. It has no configuration and
//!   cannot be relaxed.
//!
//! # Examples
//!
//! ```rust
//! use upload_guard::storage::filename::{FilenameSanitizer, TraversalGuard};
//!
//! let sanitizer = FilenameSanitizer::default();
//! assert!(sanitizer.check("holiday.jpg").is_empty());
//! assert!(!sanitizer.check("CON.jpg").is_empty());
//!
//! assert!(TraversalGuard::detects("..%2F..%2Fetc%2Fpasswd"));
//! assert_eq!(FilenameSanitizer::storage_name("my photo (1).jpg"), "my_photo_1_.jpg");
//! ```

use super::pipeline::{CandidateView, Findings, Validator};
use super::types::{SuspiciousPattern, ValidationError, Warning};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum filename length in characters
pub const DEFAULT_MAX_FILENAME_LENGTH: usize = 255;

/// Names longer than this produce a warning
pub const LONG_FILENAME_WARNING: usize = 200;

/// Storage name used when sanitization leaves nothing behind
pub const FALLBACK_STORAGE_NAME: &str = "file";

/// Windows device names, matched against the upper-cased stem
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Traversal tokens, compared against the lower-cased raw filename
const TRAVERSAL_TOKENS: &[&str] = &[
    "../",
    "..\\",
    "....//",
    "%2e%2e%2f",
    "%2e%2e%5c",
    "%2e%2e/",
    "%2e%2e\\",
    "..%2f",
    "..%5c",
];

static UNSAFE_CHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("Invalid regex"));
static REPEATED_UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}").expect("Invalid regex"));
static REPEATED_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("Invalid regex"));

/// Returns the last path component of a raw filename
///
/// Both `/` and `\` count as separators, whatever the host platform.
pub(crate) fn final_component(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Validates filename shape and derives safe storage names
#[derive(Debug, Clone, Copy)]
pub struct FilenameSanitizer {
    max_length: usize,
}

impl Default for FilenameSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILENAME_LENGTH)
    }
}

impl FilenameSanitizer {
    /// Creates a sanitizer with the given maximum length in characters
    #[must_use]
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Maximum accepted length in characters
    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    /// Returns every filename error, in check order
    ///
    /// An empty name short-circuits; every other check runs so the caller
    /// sees all problems at once.
    #[must_use]
    pub fn check(&self, filename: &str) -> Vec<ValidationError> {
        if filename.is_empty() {
            return vec![ValidationError::EmptyFilename];
        }

        let mut errors = Vec::new();

        let length = filename.chars().count();
        if length > self.max_length {
            errors.push(ValidationError::FilenameTooLong {
                length,
                max: self.max_length,
            });
        }

        if Self::has_control_characters(filename) {
            errors.push(ValidationError::ControlCharacters);
        }

        if let Some(name) = Self::reserved_name(filename) {
            errors.push(ValidationError::ReservedName { name });
        }

        errors.extend(
            SuspiciousPattern::ALL
                .into_iter()
                .filter(|pattern| pattern.matches(filename))
                .map(|pattern| ValidationError::SuspiciousPattern { pattern }),
        );

        errors
    }

    /// NUL and other control characters, excluding tab, newline and carriage return
    fn has_control_characters(filename: &str) -> bool {
        filename
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    }

    /// Returns the upper-cased stem if it is a reserved device name
    fn reserved_name(filename: &str) -> Option<String> {
        let base = final_component(filename);
        let stem = base.split_once('.').map_or(base, |(stem, _)| stem);
        let upper = stem.trim_end().to_ascii_uppercase();
        RESERVED_NAMES.contains(&upper.as_str()).then_some(upper)
    }

    /// Derives the on-disk base name from an untrusted filename
    ///
    /// Only `[A-Za-z0-9_.-]` survive; anything else becomes `_`. Runs of
    /// underscores and dots collapse, and leading or trailing separators are
    /// trimmed. Never returns an empty string or a name containing a path
    /// separator.
    #[must_use]
    pub fn storage_name(filename: &str) -> String {
        let base = final_component(filename);
        let replaced = UNSAFE_CHARACTERS.replace_all(base, "_");
        let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
        let collapsed = REPEATED_DOTS.replace_all(&collapsed, ".");
        let trimmed = collapsed.trim_matches(|c| c == '_' || c == '.' || c == '-');

        if trimmed.is_empty() {
            FALLBACK_STORAGE_NAME.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl Validator for FilenameSanitizer {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        let mut findings = Findings::from_errors(Self::check(self, candidate.filename));

        let length = candidate.filename.chars().count();
        if length > LONG_FILENAME_WARNING {
            findings.warn(Warning::UnusuallyLongFilename { length });
        }

        findings
    }
}

/// Rejects filenames carrying directory traversal tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalGuard;

impl TraversalGuard {
    /// Returns true if the raw filename contains any traversal token
    #[must_use]
    pub fn detects(filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        TRAVERSAL_TOKENS.iter().any(|token| lower.contains(token))
    }
}

impl Validator for TraversalGuard {
    fn name(&self) -> &'static str {
        "traversal"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        if Self::detects(candidate.filename) {
            Findings::from_errors(vec![ValidationError::DirectoryTraversal])
        } else {
            Findings::default()
        }
    }
}
