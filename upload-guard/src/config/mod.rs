//! Configuration management for upload-guard
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `UPLOAD_GUARD_` prefix, `__` for nesting)
//! 2. An explicit TOML file, or `./upload-guard.toml` if present
//! 3. Hardcoded defaults (fallback)
//!
//! Example: `UPLOAD_GUARD_MAX_FILE_SIZE_BYTES=5242880`
//!
//! # Example Configuration
//!
//! ```toml
//! # upload-guard.toml
//! managed_root = "/var/uploads"
//! default_subdirectory = "images"
//! allowed_extensions = ["jpg", "jpeg", "png", "bmp"]
//! max_file_size_bytes = 10485760
//! retention_window_secs = 2592000
//! retention_schedule = "0 0 3 * * *"
//! ```
//!
//! # Usage
//!
//! ```rust
//! use upload_guard::config::UploadConfig;
//!
//! let config = UploadConfig::default();
//! assert_eq!(config.max_file_size_bytes, 10 * 1024 * 1024);
//! assert!(config.quarantine_root().ends_with("quarantine"));
//! ```

use crate::jobs::SweepSchedule;
use crate::storage::allocator::DEFAULT_MAX_ATTEMPTS;
use crate::storage::filename::DEFAULT_MAX_FILENAME_LENGTH;
use crate::storage::pipeline::DEFAULT_MAX_FILE_SIZE;
use crate::storage::policy::{is_dangerous, DEFAULT_ALLOWED_EXTENSIONS};
use crate::storage::validation::{DEFAULT_SNIFF_BYTES, MIN_SNIFF_BYTES};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "UPLOAD_GUARD_";

/// Config file picked up from the working directory when none is given
pub const LOCAL_CONFIG_FILE: &str = "upload-guard.toml";

/// Name of the quarantine directory under the managed root
pub const QUARANTINE_DIR: &str = "quarantine";

const DAY_SECS: u64 = 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A source could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Defaults could not be serialized
    #[error("Failed to encode default configuration: {0}")]
    Defaults(#[from] toml::ser::Error),
}

/// Upload pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory that holds every stored upload
    pub managed_root: PathBuf,

    /// Quarantine area; `<managed_root>/quarantine` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_root: Option<PathBuf>,

    /// Subdirectory used when the caller gives none
    pub default_subdirectory: String,

    /// Allow-list of extensions, lower-cased
    pub allowed_extensions: BTreeSet<String>,

    /// Size cap in bytes
    pub max_file_size_bytes: u64,

    /// Maximum filename length in characters
    pub max_filename_length: usize,

    /// Content prefix read for sniffing
    pub sniff_bytes: usize,

    /// Files older than this are deleted by retention sweeps
    pub retention_window_secs: u64,

    /// Cron expression (with seconds) for scheduled sweeps
    pub retention_schedule: String,

    /// Names tried per allocation before giving up
    pub max_allocation_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            managed_root: PathBuf::from("uploads"),
            quarantine_root: None,
            default_subdirectory: "images".to_string(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            retention_window_secs: 30 * DAY_SECS,
            retention_schedule: "0 0 3 * * *".to_string(),
            max_allocation_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl UploadConfig {
    /// Loads configuration from defaults, a TOML file and the environment
    ///
    /// With `path` set, that file is merged (a missing file is ignored, as
    /// figment does); otherwise `./upload-guard.toml` is merged if present.
    /// Validation warnings are logged.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - The configuration file contains invalid TOML
    /// - A value has the wrong type
    /// - A value fails [`UploadConfig::validate`]
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use upload_guard::config::UploadConfig;
    /// use std::path::Path;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = UploadConfig::load(Some(Path::new("/etc/upload-guard.toml")))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        match path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let local = Path::new(LOCAL_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let mut config: Self = figment.extract().map_err(Box::new)?;
        config.normalize();
        for warning in config.validate()? {
            warn!(%warning, "Configuration warning");
        }
        Ok(config)
    }

    /// Lower-cases the allow-list and strips leading dots
    pub fn normalize(&mut self) {
        self.allowed_extensions = std::mem::take(&mut self.allowed_extensions)
            .into_iter()
            .map(|extension| extension.trim().trim_start_matches('.').to_lowercase())
            .filter(|extension| !extension.is_empty())
            .collect();
    }

    /// Checks value ranges and returns advisory warnings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero size cap, filename length
    /// or allocation bound, a sniffing prefix below 512 bytes, or an
    /// unparsable retention schedule.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid("max_file_size_bytes must be positive".into()));
        }
        if self.max_filename_length == 0 {
            return Err(ConfigError::Invalid("max_filename_length must be positive".into()));
        }
        if self.max_allocation_attempts == 0 {
            return Err(ConfigError::Invalid("max_allocation_attempts must be positive".into()));
        }
        if self.sniff_bytes < MIN_SNIFF_BYTES {
            return Err(ConfigError::Invalid(format!(
                "sniff_bytes must be at least {MIN_SNIFF_BYTES}, got {}",
                self.sniff_bytes
            )));
        }
        SweepSchedule::cron(&self.retention_schedule)
            .map_err(|e| ConfigError::Invalid(format!("retention_schedule: {e}")))?;

        let mut warnings = Vec::new();
        if self.allowed_extensions.is_empty() {
            warnings.push("allowed_extensions is empty; every upload will be rejected".to_string());
        }
        for extension in self.allowed_extensions.iter().filter(|e| is_dangerous(e)) {
            warnings.push(format!(
                "allowed extension '{extension}' is on the deny-list and can never be accepted"
            ));
        }
        Ok(warnings)
    }

    /// Effective quarantine root
    #[must_use]
    pub fn quarantine_root(&self) -> PathBuf {
        self.quarantine_root
            .clone()
            .unwrap_or_else(|| self.managed_root.join(QUARANTINE_DIR))
    }

    /// Retention window as a duration
    #[must_use]
    pub const fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = UploadConfig::default();
        assert_eq!(config.managed_root, PathBuf::from("uploads"));
        assert_eq!(config.quarantine_root(), PathBuf::from("uploads/quarantine"));
        assert_eq!(config.default_subdirectory, "images");
        assert_eq!(config.max_file_size_bytes, 10_485_760);
        assert_eq!(config.max_filename_length, 255);
        assert_eq!(config.sniff_bytes, 1024);
        assert_eq!(config.retention_window(), Duration::from_secs(30 * 86_400));
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = UploadConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, UploadConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                managed_root = "/srv/uploads"
                quarantine_root = "/srv/quarantine"
                allowed_extensions = [".PNG", "gif"]
                max_file_size_bytes = 2048
                "#,
            )?;

            let config = UploadConfig::load(Some(Path::new("custom.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.managed_root, PathBuf::from("/srv/uploads"));
            assert_eq!(config.quarantine_root(), PathBuf::from("/srv/quarantine"));
            assert_eq!(
                config.allowed_extensions.iter().map(String::as_str).collect::<Vec<_>>(),
                vec!["gif", "png"]
            );
            assert_eq!(config.max_file_size_bytes, 2048);
            assert_eq!(config.sniff_bytes, DEFAULT_SNIFF_BYTES);
            Ok(())
        });
    }

    #[test]
    fn test_local_file_is_picked_up() {
        Jail::expect_with(|jail| {
            jail.create_file(LOCAL_CONFIG_FILE, "default_subdirectory = \"avatars\"")?;
            let config = UploadConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.default_subdirectory, "avatars");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "max_file_size_bytes = 2048")?;
            jail.set_env("UPLOAD_GUARD_MAX_FILE_SIZE_BYTES", "4096");
            jail.set_env("UPLOAD_GUARD_RETENTION_WINDOW_SECS", "60");

            let config = UploadConfig::load(Some(Path::new("custom.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.max_file_size_bytes, 4096);
            assert_eq!(config.retention_window(), Duration::from_secs(60));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("UPLOAD_GUARD_SNIFF_BYTES", "100");
            let err = UploadConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            Ok(())
        });

        let config = UploadConfig {
            max_file_size_bytes: 0,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());

        let config = UploadConfig {
            retention_schedule: "not a schedule".to_string(),
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        Jail::expect_with(|jail| {
            jail.create_file("broken.toml", "max_file_size_bytes = \"lots\"")?;
            let err = UploadConfig::load(Some(Path::new("broken.toml"))).unwrap_err();
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = UploadConfig {
            allowed_extensions: ["jpg", "php"].iter().map(ToString::to_string).collect(),
            ..UploadConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("php"));

        config.allowed_extensions.clear();
        assert_eq!(config.validate().unwrap().len(), 1);
    }
}
