//! Run log backend: `tracing` events written to the log destination.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "metacrawler=info";
const DEBUG_LOG_FILTER: &str = "metacrawler=debug";

/// Install the process-wide subscriber writing to `log_path`.
///
/// The file is truncated. `RUST_LOG` takes precedence over `debug`.
pub fn init_logging(log_path: &Path, debug: bool) -> Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }

    let file = File::create(log_path)
        .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            DEBUG_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .context("Logging was already initialized")?;

    tracing::info!("Logging to {}", log_path.display());
    Ok(())
}
