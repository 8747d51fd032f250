use crate::config::{CliOverrides, Config, CrawlMode, RunParameters};
use crate::error::{CrawlerError, Result};
use crate::paths::ensure_extension;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

pub const TABULAR_EXTENSIONS: &[&str] = &["csv"];
pub const GEOMETRY_EXTENSIONS: &[&str] = &["geojson", "json"];
pub const LOG_EXTENSIONS: &[&str] = &["log", "txt"];

#[derive(Parser, Debug)]
#[command(name = "metacrawler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inventory the metadata and extents of a directory of geospatial imagery")]
#[command(
    long_about = "MetaCrawler walks a directory tree of raster imagery, extracts metadata and \
                  spatial extents from every dataset it recognises, and writes one CSV row and one \
                  GeoJSON feature per dataset. Files that cannot be read are logged and skipped."
)]
#[command(before_help = "🌍 MetaCrawler - Imagery Metadata Crawler")]
#[command(after_help = "EXAMPLES:\n  \
    metacrawler -d /mnt/imagery -x inventory -s inventory -l crawl\n  \
    metacrawler -d /mnt/imagery -x out/inventory.csv -s out/extents.geojson -l out/crawl.log -o\n  \
    metacrawler -d /mnt/imagery -x files -s files -l files --nomd\n  \
    metacrawler --generate-config")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Directory to crawl
    #[arg(short = 'd', long = "dir", required_unless_present = "generate_config")]
    pub directory: Option<PathBuf>,

    /// Tabular output (.csv is appended if missing)
    #[arg(short = 'x', long = "xls", required_unless_present = "generate_config")]
    pub tabular: Option<PathBuf>,

    /// Geometry output (.geojson is appended if missing)
    #[arg(short = 's', long = "shp", required_unless_present = "generate_config")]
    pub geometry: Option<PathBuf>,

    /// Log file (.log is appended unless it ends in .log or .txt)
    #[arg(short = 'l', long = "log", required_unless_present = "generate_config")]
    pub log: Option<PathBuf>,

    /// Generate quicklook and thumbnail images
    #[arg(short = 'o', long = "ovs")]
    pub overviews: bool,

    /// Record basic file info only, no metadata or extents
    #[arg(long)]
    pub nomd: bool,

    /// Write debug messages to the log
    #[arg(long)]
    pub debug: bool,

    /// Formats to crawl (comma-separated)
    #[arg(short, long, help = "Formats to crawl (e.g., world_image,envi,ascii_grid)")]
    pub formats: Option<String>,

    /// Directories to skip
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Record unrecognized files with basic info instead of skipping them
    #[arg(long)]
    pub include_unrecognized: bool,

    /// Quicklook width in pixels
    #[arg(long)]
    pub quicklook_width: Option<u32>,

    /// Thumbnail width in pixels
    #[arg(long)]
    pub thumbnail_width: Option<u32>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Validate parameters and show the plan without crawling")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_formats(self.formats.clone())
            .with_exclude(self.exclude.clone())
            .with_include_unrecognized(self.include_unrecognized.then_some(true))
            .with_quicklook_width(self.quicklook_width)
            .with_thumbnail_width(self.thumbnail_width)
    }

    /// Destinations with their extensions settled, plus the run flags.
    pub fn run_parameters(&self) -> Result<RunParameters> {
        let root = required(&self.directory, "--dir")?;
        let tabular = required(&self.tabular, "--xls")?;
        let geometry = required(&self.geometry, "--shp")?;
        let log = required(&self.log, "--log")?;

        Ok(RunParameters {
            root: root.to_path_buf(),
            tabular_path: ensure_extension(tabular, TABULAR_EXTENSIONS),
            geometry_path: ensure_extension(geometry, GEOMETRY_EXTENSIONS),
            log_path: ensure_extension(log, LOG_EXTENSIONS),
            mode: CrawlMode::from_nomd(self.nomd),
            overviews: self.overviews,
            debug: self.debug,
        })
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

fn required<'a>(value: &'a Option<PathBuf>, flag: &str) -> Result<&'a Path> {
    value.as_deref().ok_or_else(|| CrawlerError::Config {
        message: format!("{} is required", flag),
    })
}
