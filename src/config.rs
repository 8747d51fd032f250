use crate::error::{CrawlerError, Result};
use crate::record::FormatTag;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub overviews: OverviewConfig,
    pub output: OutputConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub formats: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_depth: usize,
    pub follow_links: bool,
    pub include_unrecognized: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverviewConfig {
    pub quicklook_width: u32,
    pub thumbnail_width: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PathConfig {
    pub substitutions: Vec<PathSubstitution>,
}

/// Prefix rewrite applied to paths written into output records.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathSubstitution {
    pub from: String,
    pub to: String,
}

impl ScanConfig {
    /// Formats named in `formats`, unknown names dropped.
    pub fn enabled_formats(&self) -> Vec<FormatTag> {
        self.formats
            .iter()
            .filter_map(|name| FormatTag::from_name(name))
            .collect()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            formats: FormatTag::all().iter().map(|f| f.name().to_string()).collect(),
            exclude_dirs: vec![
                ".git".to_string(),
                ".svn".to_string(),
                "$RECYCLE.BIN".to_string(),
                "System Volume Information".to_string(),
            ],
            exclude_patterns: vec![
                r".*\.qlk\.jpg$".to_string(),
                r".*\.thm\.jpg$".to_string(),
            ],
            max_depth: 64,
            follow_links: false,
            include_unrecognized: false,
        }
    }
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            quicklook_width: 800,
            thumbnail_width: 150,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CrawlerError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CrawlerError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| CrawlerError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["metacrawler.toml", ".metacrawler.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref formats) = cli_args.formats {
            self.scan.formats = formats
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(ref exclude) = cli_args.exclude {
            self.scan.exclude_dirs.extend(exclude.clone());
        }

        if let Some(include) = cli_args.include_unrecognized {
            self.scan.include_unrecognized = include;
        }

        if let Some(width) = cli_args.quicklook_width {
            self.overviews.quicklook_width = width;
        }

        if let Some(width) = cli_args.thumbnail_width {
            self.overviews.thumbnail_width = width;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan.formats.is_empty() {
            return Err(CrawlerError::Config {
                message: "At least one format must be enabled".to_string(),
            });
        }

        for name in &self.scan.formats {
            if FormatTag::from_name(name).is_none() {
                return Err(CrawlerError::Config {
                    message: format!(
                        "Unknown format '{}' (expected one of: {})",
                        name,
                        FormatTag::all()
                            .iter()
                            .map(|f| f.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            }
        }

        if self.scan.max_depth == 0 {
            return Err(CrawlerError::Config {
                message: "Maximum directory depth must be greater than 0".to_string(),
            });
        }

        for pattern in &self.scan.exclude_patterns {
            regex::Regex::new(pattern).map_err(|e| CrawlerError::Config {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
        }

        if self.overviews.quicklook_width == 0 || self.overviews.thumbnail_width == 0 {
            return Err(CrawlerError::Config {
                message: "Overview widths must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.paths.substitutions.push(PathSubstitution {
            from: "/mnt/imagery".to_string(),
            to: "//fileserver/imagery".to_string(),
        });
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub formats: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub include_unrecognized: Option<bool>,
    pub quicklook_width: Option<u32>,
    pub thumbnail_width: Option<u32>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formats(mut self, formats: Option<String>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_exclude(mut self, exclude: Option<Vec<String>>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_include_unrecognized(mut self, include: Option<bool>) -> Self {
        self.include_unrecognized = include;
        self
    }

    pub fn with_quicklook_width(mut self, width: Option<u32>) -> Self {
        self.quicklook_width = width;
        self
    }

    pub fn with_thumbnail_width(mut self, width: Option<u32>) -> Self {
        self.thumbnail_width = width;
        self
    }
}

/// Everything one crawl needs besides the configuration file.
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub root: PathBuf,
    pub tabular_path: PathBuf,
    pub geometry_path: PathBuf,
    pub log_path: PathBuf,
    pub mode: CrawlMode,
    pub overviews: bool,
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Basic file info only.
    Walk,
    /// Full metadata and extent extraction.
    Crawl,
}

impl CrawlMode {
    pub fn from_nomd(nomd: bool) -> Self {
        if nomd {
            CrawlMode::Walk
        } else {
            CrawlMode::Crawl
        }
    }
}
