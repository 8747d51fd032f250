use crate::error::{CrawlerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shutdown flag shared between the Ctrl+C handler and the crawl loop.
///
/// The driver checks it between items, so the item in progress always
/// finishes and both outputs are closed before the run ends.
#[derive(Debug, Clone)]
pub struct GracefulShutdown {
    running: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}

impl GracefulShutdown {
    /// Install the process-wide Ctrl+C handler. May only succeed once per process.
    pub fn new() -> Result<Self> {
        let shutdown = Self::detached();

        let running = shutdown.running.clone();
        let interrupted = shutdown.interrupted.clone();

        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);

            if !interrupted.swap(true, Ordering::SeqCst) {
                eprintln!("\n🛑 Stopping after the current file... (press Ctrl+C again to force exit)");
            } else {
                eprintln!("\n💀 Force stopping, output may be incomplete");
                std::process::exit(130);
            }
        })
        .map_err(|e| CrawlerError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(shutdown)
    }

    /// A flag with no signal handler behind it; only `request_shutdown` trips it.
    pub fn detached() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn check_shutdown(&self) -> Result<()> {
        if !self.is_running() {
            return Err(CrawlerError::Cancelled);
        }
        Ok(())
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
