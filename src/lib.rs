pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod record;
pub mod scanner;
pub mod sinks;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, CrawlMode, OutputConfig, OverviewConfig, RunParameters, ScanConfig};
pub use error::{CrawlerError, Result, UserFriendlyError};

// Core functionality re-exports
pub use formats::{detect_format, FormatHandler, Handler};
pub use paths::PathNormalizer;
pub use pipeline::{CrawlReport, PipelineDriver, ProgressReporter, RunOutcome, SilentReporter};
pub use record::{DiscoveredItem, ErrorRecord, Extent, FileInfo, FormatTag, Geometry, Record, Stage};
pub use scanner::{Crawl, DatasetScanner, FileFilter, ScanStatistics};
pub use sinks::{CsvSink, FieldSchema, GeoJsonSink, OutputSink, SinkRecord};
pub use ui::{ConsoleReporter, GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;
use tokio::task;

/// Main library interface: one configured crawl of one directory.
pub struct MetaCrawler {
    config: Config,
    params: RunParameters,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl MetaCrawler {
    /// Create a crawler and install the Ctrl+C handler.
    pub fn new(
        config: Config,
        params: RunParameters,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
    ) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        Ok(Self::with_shutdown(config, params, output_formatter, GracefulShutdown::new()?))
    }

    /// Create a crawler around an existing shutdown flag. No signal handler is installed.
    pub fn with_shutdown(
        config: Config,
        params: RunParameters,
        output_formatter: OutputFormatter,
        shutdown: GracefulShutdown,
    ) -> Self {
        let progress_manager = ProgressManager::new(output_formatter.mode() == OutputMode::Human && !output_formatter.is_quiet());

        Self {
            config,
            params,
            output_formatter,
            progress_manager,
            shutdown,
        }
    }

    /// Create a crawler from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let params = cli_args.run_parameters()?;
        let output_mode = match cli_args.output_format {
            crate::cli::OutputFormat::Human => OutputMode::Human,
            crate::cli::OutputFormat::Json => OutputMode::Json,
            crate::cli::OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, params, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Run the crawl on a blocking worker thread.
    ///
    /// Per-item failures are collected in the report; only an unusable root
    /// or output destination, or a cancellation before start, is an `Err`.
    pub async fn crawl(&self) -> Result<CrawlReport> {
        self.shutdown.check_shutdown()?;

        self.output_formatter
            .start_operation(&format!("Crawling {}", self.params.root.display()));

        let config = self.config.clone();
        let params = self.params.clone();
        let shutdown = self.shutdown.clone();
        let reporter = ConsoleReporter::new(self.output_formatter.clone(), self.progress_manager.clone());

        let report = task::spawn_blocking(move || {
            let result = PipelineDriver::new(&config, &params, &reporter, &shutdown).run();
            reporter.finish();
            result
        })
        .await
        .map_err(|e| CrawlerError::Config {
            message: format!("Crawl task failed: {}", e),
        })??;

        Ok(report)
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config).map_err(CrawlerError::Io)?;
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Check if shutdown has been requested
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    /// Request graceful shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &CrawlerError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
