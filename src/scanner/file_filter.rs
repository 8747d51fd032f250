use crate::config::ScanConfig;
use crate::error::{CrawlerError, Result};
use crate::formats::detect_format;
use crate::record::FormatTag;
use regex::Regex;
use std::path::Path;

pub struct FileFilter {
    formats: Vec<FormatTag>,
    exclude_dirs: Vec<String>,
    exclude_patterns: Vec<Regex>,
}

impl FileFilter {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| CrawlerError::Config {
                    message: format!("Invalid exclude pattern '{}': {}", pattern, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            formats: config.enabled_formats(),
            exclude_dirs: config.exclude_dirs.clone(),
            exclude_patterns,
        })
    }

    /// Format of `path` if it is the primary file of an enabled format.
    pub fn recognized_format(&self, path: &Path) -> Option<FormatTag> {
        detect_format(path).filter(|format| self.formats.contains(format))
    }

    pub fn is_excluded_file(&self, path: &Path) -> bool {
        self.matches_any_pattern(&path.to_string_lossy())
    }

    pub fn should_traverse_directory(&self, path: &Path) -> bool {
        if let Some(dir_name) = path.file_name().and_then(|s| s.to_str()) {
            let dir_name_lower = dir_name.to_lowercase();

            if self
                .exclude_dirs
                .iter()
                .any(|exclude| exclude.to_lowercase() == dir_name_lower)
            {
                return false;
            }

            if self.matches_any_pattern(&path.to_string_lossy()) {
                return false;
            }

            // Hidden directories never hold survey data.
            if dir_name.starts_with('.') && dir_name != "." && dir_name != ".." {
                return false;
            }
        }

        true
    }

    pub fn matches_any_pattern(&self, text: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(text))
    }

    pub fn formats(&self) -> &[FormatTag] {
        &self.formats
    }
}
