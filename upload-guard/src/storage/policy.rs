//! Extension policy for uploads
//!
//! The policy combines a configurable allow-list with a fixed deny-list of
//! executable and script extensions. The deny-list always wins: adding
//! `php` to the allow-list does not make `shell.php` acceptable.
//!
//! # Examples
//!
//! ```rust
//! use upload_guard::storage::policy::{ExtensionClass, ExtensionPolicy};
//!
//! let policy = ExtensionPolicy::builder()
//!     .allow("jpg")
//!     .allow("png")
//!     .build();
//!
//! assert_eq!(policy.classify("JPG"), ExtensionClass::Allowed);
//! assert_eq!(policy.classify("exe"), ExtensionClass::Dangerous);
//! assert_eq!(policy.classify("gif"), ExtensionClass::Unknown);
//! ```

use super::filename::final_component;
use super::pipeline::{CandidateView, Findings, Validator};
use super::types::{ValidationError, Warning};
use std::collections::BTreeSet;

/// Extensions that are never accepted
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "sh", "bat", "cmd", "com", "scr", "vbs", "js", "jar", "php", "asp", "aspx", "jsp",
    "py", "pl", "phar",
];

/// Script extensions that only raise a warning when hidden before the final one
///
/// Hidden deny-listed extensions warn as well; see [`ExtensionPolicy::check`].
pub const HIDDEN_SCRIPT_EXTENSIONS: &[&str] = &["rb"];

/// Allow-list used when none is configured
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// How the policy treats an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionClass {
    /// In the allow-list and not in the deny-list
    Allowed,
    /// In the deny-list
    Dangerous,
    /// Neither allowed nor dangerous
    Unknown,
}

/// Returns the lower-cased extension of a filename, if it has one
///
/// Only the final path component is considered. A name whose only dot is
/// the leading one (`.bashrc`) or which ends in a dot has no extension.
#[must_use]
pub fn extension_of(filename: &str) -> Option<String> {
    let name = final_component(filename);
    match name.rfind('.') {
        None | Some(0) => None,
        Some(index) => {
            let extension = &name[index + 1..];
            (!extension.is_empty()).then(|| extension.to_lowercase())
        }
    }
}

/// Returns true if the extension is in the deny-list
#[must_use]
pub fn is_dangerous(extension: &str) -> bool {
    let lower = extension.to_ascii_lowercase();
    DANGEROUS_EXTENSIONS.contains(&lower.as_str())
}

/// MIME types a file with this extension is expected to sniff as
///
/// Returns an empty slice for extensions with no expectation, in which case
/// content never contradicts the extension.
#[must_use]
pub fn expected_mime_types(extension: &str) -> &'static [&'static str] {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "bmp" => &["image/bmp", "image/x-ms-bmp"],
        "webp" => &["image/webp"],
        _ => &[],
    }
}

/// Allow-list of extensions plus the fixed deny-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    allowed: BTreeSet<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS.iter().copied())
    }
}

impl ExtensionPolicy {
    /// Creates a policy from an allow-list
    ///
    /// Entries are lower-cased and stripped of leading dots.
    #[must_use]
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed.into_iter().filter_map(normalize).collect(),
        }
    }

    /// Starts building a policy with an empty allow-list
    #[must_use]
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// The allow-list, sorted
    #[must_use]
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed.iter().cloned().collect()
    }

    /// Classifies an extension; the deny-list takes precedence
    #[must_use]
    pub fn classify(&self, extension: &str) -> ExtensionClass {
        let lower = extension.trim_start_matches('.').to_lowercase();
        if is_dangerous(&lower) {
            ExtensionClass::Dangerous
        } else if self.allowed.contains(&lower) {
            ExtensionClass::Allowed
        } else {
            ExtensionClass::Unknown
        }
    }

    /// Checks a filename's extension
    #[must_use]
    pub fn check(&self, filename: &str) -> Findings {
        let mut findings = Findings::default();

        let Some(extension) = extension_of(filename) else {
            findings.error(ValidationError::MissingExtension);
            return findings;
        };

        if is_dangerous(&extension) {
            findings.error(ValidationError::DangerousExtension {
                extension: extension.clone(),
            });
        }

        if !self.allowed.contains(&extension) {
            findings.error(ValidationError::ExtensionNotAllowed {
                extension,
                allowed: self.allowed_extensions(),
            });
        }

        if let Some(hidden) = Self::hidden_extension(filename) {
            findings.warn(Warning::DoubleExtension { hidden });
        }

        findings
    }

    /// A dangerous or script extension sitting before the final one
    fn hidden_extension(filename: &str) -> Option<String> {
        let name = final_component(filename);
        let (inner, _) = name.rsplit_once('.')?;
        extension_of(inner).filter(|extension| {
            is_dangerous(extension) || HIDDEN_SCRIPT_EXTENSIONS.contains(&extension.as_str())
        })
    }
}

impl Validator for ExtensionPolicy {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn check(&self, candidate: &CandidateView<'_>) -> Findings {
        Self::check(self, candidate.filename)
    }
}

fn normalize(extension: impl AsRef<str>) -> Option<String> {
    let trimmed = extension.as_ref().trim().trim_start_matches('.');
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Builder for [`ExtensionPolicy`]
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    allowed: BTreeSet<String>,
}

impl PolicyBuilder {
    /// Creates a builder with an empty allow-list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows one extension
    #[must_use]
    pub fn allow(mut self, extension: impl AsRef<str>) -> Self {
        self.allowed.extend(normalize(extension));
        self
    }

    /// Allows several extensions
    #[must_use]
    pub fn allow_all<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed.extend(extensions.into_iter().filter_map(normalize));
        self
    }

    /// Builds the policy
    #[must_use]
    pub fn build(self) -> ExtensionPolicy {
        ExtensionPolicy {
            allowed: self.allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("dir.d/noext"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("noext"), None);
    }

    #[test]
    fn test_default_allow_list() {
        let policy = ExtensionPolicy::default();
        assert_eq!(policy.allowed_extensions(), vec!["bmp", "jpeg", "jpg", "png"]);
        assert!(policy.check("photo.jpg").errors.is_empty());
        assert!(policy.check("PHOTO.PNG").errors.is_empty());
    }

    #[test]
    fn test_missing_extension() {
        let findings = ExtensionPolicy::default().check("photo");
        assert_eq!(findings.errors, vec![ValidationError::MissingExtension]);
    }

    #[test]
    fn test_not_allowed() {
        let findings = ExtensionPolicy::default().check("anim.gif");
        assert_eq!(findings.errors.len(), 1);
        assert_eq!(findings.errors[0].code(), "extension_not_allowed");
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        let policy = ExtensionPolicy::builder().allow("php").allow("jpg").build();
        assert_eq!(policy.classify("php"), ExtensionClass::Dangerous);

        let findings = policy.check("shell.php");
        assert_eq!(
            findings.errors,
            vec![ValidationError::DangerousExtension {
                extension: "php".to_string()
            }]
        );
    }

    #[test]
    fn test_dangerous_and_not_allowed() {
        let codes: Vec<_> = ExtensionPolicy::default()
            .check("malware.EXE")
            .errors
            .iter()
            .map(ValidationError::code)
            .collect();
        assert_eq!(codes, vec!["dangerous_extension", "extension_not_allowed"]);
    }

    #[test]
    fn test_double_extension_warning() {
        let findings = ExtensionPolicy::default().check("shell.php.jpg");
        assert!(findings.errors.is_empty());
        assert_eq!(
            findings.warnings,
            vec![Warning::DoubleExtension {
                hidden: "php".to_string()
            }]
        );

        for (name, hidden) in [("exploit.rb.png", "rb"), ("tool.pl.gif", "pl"), ("page.ASP.bmp", "asp")] {
            assert_eq!(
                ExtensionPolicy::default().check(name).warnings,
                vec![Warning::DoubleExtension {
                    hidden: hidden.to_string()
                }],
                "{name}"
            );
        }
        assert!(ExtensionPolicy::default()
            .check("exploit.rb.png")
            .errors
            .is_empty());

        assert!(ExtensionPolicy::default()
            .check("holiday.2024.jpg")
            .warnings
            .is_empty());
    }

    #[test]
    fn test_builder_normalizes() {
        let policy = ExtensionPolicy::builder()
            .allow(".PNG")
            .allow_all([" jpg ", ""])
            .build();
        assert_eq!(policy.allowed_extensions(), vec!["jpg", "png"]);
    }

    #[test]
    fn test_expected_mime_types() {
        assert_eq!(expected_mime_types("JPEG"), &["image/jpeg"]);
        assert_eq!(expected_mime_types("bmp"), &["image/bmp", "image/x-ms-bmp"]);
        assert!(expected_mime_types("txt").is_empty());
    }
}
