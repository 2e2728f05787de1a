//! Structured logging
//!
//! Every component logs through `tracing`; this module installs the
//! subscriber for binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for debug builds
pub const DEBUG_FILTER: &str = "info,upload_guard=debug";

/// Default filter for release builds
pub const RELEASE_FILTER: &str = "info";

/// Initialize logging
///
/// `RUST_LOG` overrides the default filter. Debug builds log in pretty
/// format, release builds log JSON lines.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use upload_guard::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Upload guard started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    init_with_default(default_filter())
}

/// Initialize logging with an explicit fallback filter
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_default(fallback: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?;
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

/// Fallback filter for the current build profile
#[must_use]
pub const fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        DEBUG_FILTER
    } else {
        RELEASE_FILTER
    }
}
