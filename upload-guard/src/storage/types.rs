//! Core types for the upload pipeline

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Byte source backing an [`UploadCandidate`]
///
/// Any seekable reader qualifies: an in-memory buffer, a spooled temp file,
/// or a plain file on disk.
pub trait CandidateSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> CandidateSource for T {}

/// An upload that has been received but not yet validated
///
/// Everything the client sent is untrusted: the filename is an arbitrary
/// string and the content type is advisory only. The candidate is never
/// persisted itself; it only lives for the duration of validation.
///
/// # Examples
///
/// ```rust
/// use upload_guard::storage::UploadCandidate;
///
/// let candidate = UploadCandidate::new("photo.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF]);
/// assert_eq!(candidate.size(), 3);
/// ```
pub struct UploadCandidate {
    filename: String,
    content_type: String,
    size: u64,
    source: Box<dyn CandidateSource>,
}

impl UploadCandidate {
    /// Creates a candidate backed by an in-memory buffer
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            source: Box::new(Cursor::new(data)),
        }
    }

    /// Creates a candidate from a seekable reader
    ///
    /// The size is measured by seeking to the end; the reader's position is
    /// restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the reader cannot be seeked.
    pub fn from_reader<R>(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        mut reader: R,
    ) -> io::Result<Self>
    where
        R: Read + Seek + Send + 'static,
    {
        let position = reader.stream_position()?;
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(position))?;

        Ok(Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            source: Box::new(reader),
        })
    }

    /// Opens a file on disk as a candidate
    ///
    /// The declared filename is the file's own name and the declared content
    /// type is guessed from its extension. Both remain untrusted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or measured.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file = std::fs::File::open(path)?;
        Self::from_reader(filename, content_type, file)
    }

    /// Replaces the declared filename
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Replaces the declared content type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Declared (untrusted) filename
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Declared (advisory) content type
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Measured size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Reads at most `limit` bytes from the start of the source
    ///
    /// The read position is restored afterwards, even when the read fails.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the source cannot be seeked or read.
    pub fn read_prefix(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let position = self.source.stream_position()?;
        self.source.seek(SeekFrom::Start(0))?;

        let capacity = usize::try_from(self.size).map_or(limit, |size| size.min(limit));
        let mut prefix = Vec::with_capacity(capacity);
        let read = {
            let mut limited = (&mut self.source).take(limit as u64);
            limited.read_to_end(&mut prefix)
        };

        self.source.seek(SeekFrom::Start(position))?;
        read?;
        Ok(prefix)
    }

    /// Copies exactly the measured number of bytes into `writer`
    ///
    /// Fails if the source turns out shorter or longer than measured, so a
    /// source that changed after validation is never stored.
    pub(crate) fn copy_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<u64> {
        self.source.seek(SeekFrom::Start(0))?;

        let copied = {
            let mut limited = (&mut self.source).take(self.size);
            io::copy(&mut limited, writer)?
        };
        if copied != self.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {copied} of {} bytes", self.size),
            ));
        }

        let mut extra = [0_u8; 1];
        if self.source.read(&mut extra)? != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "source grew after it was measured",
            ));
        }

        Ok(copied)
    }
}

impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCandidate")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Suspicious filename patterns rejected by the filename sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousPattern {
    /// Two or more consecutive dots
    DoubleDot,
    /// One of `< > : " | ? *`
    ReservedCharacter,
    /// Whitespace at the start of the name
    LeadingWhitespace,
    /// Whitespace at the end of the name
    TrailingWhitespace,
    /// Two consecutive underscores
    DoubleUnderscore,
}

impl SuspiciousPattern {
    /// Every pattern, in the order they are checked
    pub const ALL: [Self; 5] = [
        Self::DoubleDot,
        Self::ReservedCharacter,
        Self::LeadingWhitespace,
        Self::TrailingWhitespace,
        Self::DoubleUnderscore,
    ];

    const RESERVED_CHARACTERS: &'static [char] = &['<', '>', ':', '"', '|', '?', '*'];

    /// Returns true if `filename` exhibits this pattern
    #[must_use]
    pub fn matches(self, filename: &str) -> bool {
        match self {
            Self::DoubleDot => filename.contains(".."),
            Self::ReservedCharacter => filename.contains(Self::RESERVED_CHARACTERS),
            Self::LeadingWhitespace => filename.starts_with(char::is_whitespace),
            Self::TrailingWhitespace => filename.ends_with(char::is_whitespace),
            Self::DoubleUnderscore => filename.contains("__"),
        }
    }
}

impl fmt::Display for SuspiciousPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::DoubleDot => "consecutive dots",
            Self::ReservedCharacter => "reserved character",
            Self::LeadingWhitespace => "leading whitespace",
            Self::TrailingWhitespace => "trailing whitespace",
            Self::DoubleUnderscore => "double underscore",
        };
        f.write_str(description)
    }
}

/// A terminal validation failure
///
/// Validation errors are values carried inside a [`ValidationOutcome`]; they
/// never cause a filesystem side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    /// The filename is empty
    #[error("Filename is empty")]
    EmptyFilename,

    /// The filename exceeds the configured maximum length
    #[error("Filename too long ({length} characters, max {max})")]
    FilenameTooLong {
        /// Length in characters
        length: usize,
        /// Configured maximum
        max: usize,
    },

    /// The filename contains NUL or other control characters
    #[error("Filename contains control characters")]
    ControlCharacters,

    /// The filename stem is a reserved device name
    #[error("Filename uses reserved name: {name}")]
    ReservedName {
        /// The reserved stem, upper-cased
        name: String,
    },

    /// The filename matches a suspicious pattern
    #[error("Filename contains suspicious pattern: {pattern}")]
    SuspiciousPattern {
        /// Which pattern matched
        pattern: SuspiciousPattern,
    },

    /// The filename has no extension
    #[error("File has no extension")]
    MissingExtension,

    /// The extension is an executable or script type
    #[error("File extension '{extension}' is not allowed for security reasons")]
    DangerousExtension {
        /// Lower-cased extension
        extension: String,
    },

    /// The extension is not in the configured allow-list
    #[error("File extension '{extension}' is not allowed. Allowed: {}", .allowed.join(", "))]
    ExtensionNotAllowed {
        /// Lower-cased extension
        extension: String,
        /// The configured allow-list
        allowed: Vec<String>,
    },

    /// The detected content type contradicts the extension
    #[error("File content ({detected}) doesn't match extension ({extension})")]
    ContentExtensionMismatch {
        /// MIME type detected from magic bytes
        detected: &'static str,
        /// Lower-cased extension
        extension: String,
    },

    /// The content starts with an executable header
    #[error("File contains a {signature} executable header")]
    MaliciousSignature {
        /// Name of the executable format
        signature: &'static str,
    },

    /// A text file contains a script marker
    #[error("File contains embedded script marker '{marker}'")]
    EmbeddedScript {
        /// The marker found
        marker: &'static str,
    },

    /// The raw filename contains a directory traversal token
    #[error("Filename contains directory traversal patterns")]
    DirectoryTraversal,

    /// The file has no content
    #[error("File is empty")]
    EmptyFile,

    /// The file exceeds the configured size cap
    #[error("File size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    FileTooLarge {
        /// Measured size
        size: u64,
        /// Configured maximum
        max: u64,
    },
}

impl ValidationError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyFilename => "empty_filename",
            Self::FilenameTooLong { .. } => "filename_too_long",
            Self::ControlCharacters => "control_characters",
            Self::ReservedName { .. } => "reserved_name",
            Self::SuspiciousPattern { .. } => "suspicious_pattern",
            Self::MissingExtension => "missing_extension",
            Self::DangerousExtension { .. } => "dangerous_extension",
            Self::ExtensionNotAllowed { .. } => "extension_not_allowed",
            Self::ContentExtensionMismatch { .. } => "content_extension_mismatch",
            Self::MaliciousSignature { .. } => "malicious_signature",
            Self::EmbeddedScript { .. } => "embedded_script",
            Self::DirectoryTraversal => "directory_traversal",
            Self::EmptyFile => "empty_file",
            Self::FileTooLarge { .. } => "file_too_large",
        }
    }
}

/// A non-fatal advisory produced during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Warning {
    /// A dangerous extension hides before the final one (`shell.php.jpg`)
    DoubleExtension {
        /// The hidden extension
        hidden: String,
    },
    /// The filename is unusually long
    UnusuallyLongFilename {
        /// Length in characters
        length: usize,
    },
    /// No known magic signature matched the content
    UnrecognizedContent {
        /// Best-effort content label, if any
        hint: Option<String>,
    },
    /// The declared content type disagrees with the detected one
    DeclaredTypeMismatch {
        /// What the client claimed
        declared: String,
        /// What the magic bytes say
        detected: &'static str,
    },
    /// A script marker appeared in a non-text file
    ScriptMarker {
        /// The marker found
        marker: &'static str,
    },
    /// The content prefix could not be read for sniffing
    ContentUnreadable {
        /// The I/O error message
        reason: String,
    },
}

impl Warning {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DoubleExtension { .. } => "double_extension",
            Self::UnusuallyLongFilename { .. } => "unusually_long_filename",
            Self::UnrecognizedContent { .. } => "unrecognized_content",
            Self::DeclaredTypeMismatch { .. } => "declared_type_mismatch",
            Self::ScriptMarker { .. } => "script_marker",
            Self::ContentUnreadable { .. } => "content_unreadable",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleExtension { hidden } => {
                write!(f, "Filename has double extension pattern (hidden .{hidden})")
            }
            Self::UnusuallyLongFilename { length } => {
                write!(f, "Filename is unusually long ({length} characters)")
            }
            Self::UnrecognizedContent { hint: Some(hint) } => {
                write!(f, "Content matched no known image signature (looks like {hint})")
            }
            Self::UnrecognizedContent { hint: None } => {
                write!(f, "Content matched no known image signature")
            }
            Self::DeclaredTypeMismatch { declared, detected } => {
                write!(f, "Declared content type {declared} but content is {detected}")
            }
            Self::ScriptMarker { marker } => write!(f, "Content contains script marker '{marker}'"),
            Self::ContentUnreadable { reason } => write!(f, "Content could not be sniffed: {reason}"),
        }
    }
}

/// The complete decision for one candidate
///
/// `is_valid` is true exactly when `errors` is empty. Warnings never affect
/// validity. Fields are read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    is_valid: bool,
    errors: Vec<ValidationError>,
    warnings: Vec<Warning>,
    detected_mime: Option<&'static str>,
    size: u64,
}

impl ValidationOutcome {
    pub(crate) fn new(
        errors: Vec<ValidationError>,
        warnings: Vec<Warning>,
        detected_mime: Option<&'static str>,
        size: u64,
    ) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            detected_mime,
            size,
        }
    }

    /// Whether the candidate may be stored
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Every error, in pipeline order
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Every warning, in pipeline order
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// MIME type detected from magic bytes, if any matched
    #[must_use]
    pub const fn detected_mime(&self) -> Option<&'static str> {
        self.detected_mime
    }

    /// Measured size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Error codes, in pipeline order
    #[must_use]
    pub fn error_codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(ValidationError::code).collect()
    }

    /// Returns true if any error carries `code`
    #[must_use]
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|error| error.code() == code)
    }

    /// Returns true if any warning carries `code`
    #[must_use]
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|warning| warning.code() == code)
    }
}

/// A file that has been validated, written and hashed
///
/// Only the storage layer constructs these, and only from a path it claimed
/// itself, so `path` is always strictly inside the managed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    original_name: String,
    stored_name: String,
    path: PathBuf,
    size: u64,
    detected_mime: String,
    content_hash: String,
    created_at: DateTime<Utc>,
}

impl StoredFile {
    pub(crate) fn new(
        original_name: impl Into<String>,
        stored_name: impl Into<String>,
        path: PathBuf,
        size: u64,
        detected_mime: Option<&str>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            stored_name: stored_name.into(),
            path,
            size,
            detected_mime: detected_mime.unwrap_or("unknown").to_string(),
            content_hash: content_hash.into(),
            created_at: Utc::now(),
        }
    }

    /// The filename the client declared
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// The sanitized, unique name on disk
    #[must_use]
    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    /// Absolute path under the managed root
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Detected MIME type, or `unknown`
    #[must_use]
    pub fn detected_mime(&self) -> &str {
        &self.detected_mime
    }

    /// Lowercase hex SHA-256 of the content
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// When the file was stored
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for StoredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoredFile(name={}, path={}, size={}, sha256={})",
            self.stored_name,
            self.path.display(),
            self.size,
            self.content_hash
        )
    }
}

/// Provenance of a quarantined file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineRecord {
    original_path: PathBuf,
    quarantine_path: PathBuf,
    reason: String,
    quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub(crate) fn new(
        original_path: PathBuf,
        quarantine_path: PathBuf,
        reason: impl Into<String>,
        quarantined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            original_path,
            quarantine_path,
            reason: reason.into(),
            quarantined_at,
        }
    }

    /// Where the file lived in managed storage
    #[must_use]
    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    /// Where the file lives now
    #[must_use]
    pub fn quarantine_path(&self) -> &Path {
        &self.quarantine_path
    }

    /// Why it was quarantined
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// When it was quarantined
    #[must_use]
    pub const fn quarantined_at(&self) -> DateTime<Utc> {
        self.quarantined_at
    }
}

/// Errors raised while writing to managed storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing the file (or creating its directory) failed
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailure {
        /// Path being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Every candidate name was already taken
    #[error("Could not allocate a unique name for '{base}' after {attempts} attempts")]
    PathCollisionExhausted {
        /// Base name being allocated
        base: String,
        /// Attempts made
        attempts: u32,
    },

    /// The written file could not be read back for hashing
    #[error("Failed to read back {} for hashing: {source}", .path.display())]
    HashReadbackFailure {
        /// Path being hashed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A name or subdirectory would resolve outside managed storage
    #[error("Path escapes managed storage: {0}")]
    PathEscape(String),

    /// The managed root is missing or unusable
    #[error("Invalid storage root {}: {reason}", .path.display())]
    InvalidRoot {
        /// The configured root
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while moving files into (or out of) quarantine
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// The file could not be moved; it remains at its original path
    #[error("Failed to move {} into quarantine: {source}", .path.display())]
    MoveFailure {
        /// Original path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A partial quarantine copy could not be removed
    #[error("Failed to roll back partial quarantine copy {}: {source}", .path.display())]
    RollbackFailure {
        /// The partial copy left behind
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file is reachable at neither location
    #[error("File lost during quarantine: neither {} nor {} exists", .original.display(), .quarantine.display())]
    Lost {
        /// Original path
        original: PathBuf,
        /// Intended quarantine path
        quarantine: PathBuf,
    },

    /// The file was quarantined but its sidecar record was not written
    #[error("Failed to write quarantine record {}: {source}", .path.display())]
    SidecarWrite {
        /// Sidecar path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The path is not a managed file eligible for quarantine or purge
    #[error("Refusing to touch {}: {reason}", .path.display())]
    InvalidSource {
        /// The offending path
        path: PathBuf,
        /// Why it was refused
        reason: String,
    },

    /// The quarantine area cannot be created or read
    #[error("Quarantine area {} unavailable: {source}", .path.display())]
    Unavailable {
        /// Quarantine root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An operator purge could not delete a quarantined file
    #[error("Failed to purge {}: {source}", .path.display())]
    PurgeFailure {
        /// Quarantined path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Result type for quarantine operations
pub type QuarantineResult<T> = Result<T, QuarantineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_size() {
        let candidate = UploadCandidate::new("test.jpg", "image/jpeg", vec![1, 2, 3, 4, 5]);
        assert_eq!(candidate.size(), 5);
        assert_eq!(candidate.filename(), "test.jpg");
        assert_eq!(candidate.content_type(), "image/jpeg");
    }

    #[test]
    fn test_from_reader_restores_position() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.set_position(4);

        let mut candidate = UploadCandidate::from_reader("digits.txt", "text/plain", cursor).unwrap();
        assert_eq!(candidate.size(), 10);

        // Prefix always starts at offset zero regardless of the current position
        assert_eq!(candidate.read_prefix(3).unwrap(), b"012");
    }

    #[test]
    fn test_read_prefix_is_bounded_and_repeatable() {
        let mut candidate = UploadCandidate::new("big.bin", "", vec![7; 4096]);

        let first = candidate.read_prefix(512).unwrap();
        let second = candidate.read_prefix(512).unwrap();
        assert_eq!(first.len(), 512);
        assert_eq!(first, second);

        let mut sink = Vec::new();
        assert_eq!(candidate.copy_to(&mut sink).unwrap(), 4096);
        assert_eq!(sink.len(), 4096);
    }

    #[test]
    fn test_read_prefix_shorter_than_limit() {
        let mut candidate = UploadCandidate::new("tiny.jpg", "image/jpeg", vec![0xFF, 0xD8]);
        assert_eq!(candidate.read_prefix(1024).unwrap(), vec![0xFF, 0xD8]);
    }

    #[test]
    fn test_copy_detects_growth() {
        let cursor = Cursor::new(b"abc".to_vec());
        let mut candidate = UploadCandidate::from_reader("a.txt", "text/plain", cursor).unwrap();
        // Pretend the measurement was taken before the source grew
        candidate.size = 2;

        let mut sink = Vec::new();
        let err = candidate.copy_to(&mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_copy_detects_truncation() {
        let mut candidate = UploadCandidate::new("a.txt", "text/plain", b"abc".to_vec());
        candidate.size = 10;

        let mut sink = Vec::new();
        let err = candidate.copy_to(&mut sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_from_path_guesses_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picture.png");
        std::fs::write(&path, b"data").unwrap();

        let candidate = UploadCandidate::from_path(&path).unwrap();
        assert_eq!(candidate.filename(), "picture.png");
        assert_eq!(candidate.content_type(), "image/png");
        assert_eq!(candidate.size(), 4);
    }

    #[test]
    fn test_outcome_validity_tracks_errors() {
        let valid = ValidationOutcome::new(
            vec![],
            vec![Warning::UnusuallyLongFilename { length: 201 }],
            Some("image/png"),
            10,
        );
        assert!(valid.is_valid());
        assert!(valid.has_warning("unusually_long_filename"));

        let invalid = ValidationOutcome::new(vec![ValidationError::EmptyFile], vec![], None, 0);
        assert!(!invalid.is_valid());
        assert_eq!(invalid.error_codes(), vec!["empty_file"]);
    }

    #[test]
    fn test_error_messages() {
        let err = ValidationError::ExtensionNotAllowed {
            extension: "gif".to_string(),
            allowed: vec!["jpg".to_string(), "png".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "File extension 'gif' is not allowed. Allowed: jpg, png"
        );

        let err = ValidationError::SuspiciousPattern {
            pattern: SuspiciousPattern::DoubleUnderscore,
        };
        assert_eq!(err.to_string(), "Filename contains suspicious pattern: double underscore");
    }

    #[test]
    fn test_error_serializes_with_code() {
        let json = serde_json::to_value(ValidationError::FileTooLarge { size: 11, max: 10 }).unwrap();
        assert_eq!(json["code"], "file_too_large");
        assert_eq!(json["size"], 11);
    }

    #[test]
    fn test_suspicious_patterns() {
        assert!(SuspiciousPattern::DoubleDot.matches("a..b.jpg"));
        assert!(SuspiciousPattern::ReservedCharacter.matches("a|b.jpg"));
        assert!(SuspiciousPattern::LeadingWhitespace.matches(" a.jpg"));
        assert!(SuspiciousPattern::TrailingWhitespace.matches("a.jpg "));
        assert!(SuspiciousPattern::DoubleUnderscore.matches("a__b.jpg"));
        assert!(!SuspiciousPattern::ALL.iter().any(|p| p.matches("holiday_photo-01.jpg")));
    }
}
