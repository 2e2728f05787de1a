//! CLI command implementations

pub mod quarantine;
pub mod status;
pub mod store;
pub mod sweep;
pub mod validate;

pub use quarantine::QuarantineCommand;
pub use status::StatusCommand;
pub use store::StoreCommand;
pub use sweep::SweepCommand;
pub use validate::ValidateCommand;

use anyhow::Result;
use console::Emoji;
use serde::Serialize;
use upload_guard::config::UploadConfig;

pub static SUCCESS: Emoji = Emoji("✓", "√");
pub static FAILURE: Emoji = Emoji("✗", "x");
pub static WARNING: Emoji = Emoji("⚠", "!");
pub static INFO: Emoji = Emoji("ℹ", "i");

/// State shared by every command
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Loaded configuration
    pub config: UploadConfig,
    /// Emit JSON instead of styled text
    pub json: bool,
}

impl CommandContext {
    /// Create a new context
    pub const fn new(config: UploadConfig, json: bool) -> Self {
        Self { config, json }
    }

    /// Print a value as pretty JSON on stdout
    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
