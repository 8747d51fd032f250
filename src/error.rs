use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read {path}: {message}")]
    Enumeration { path: String, message: String },

    #[error("Could not extract from {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("Overview generation is not supported for {format}")]
    OverviewUnsupported { format: String },

    #[error("Could not prepare output {path}: {message}")]
    SinkOpen { path: String, message: String },

    #[error("Could not write record to {path}: {message}")]
    SinkWrite { path: String, message: String },

    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

impl CrawlerError {
    pub fn extraction<P: std::fmt::Display, M: Into<String>>(path: P, message: M) -> Self {
        CrawlerError::Extraction {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn sink_write<P: std::fmt::Display, M: Into<String>>(path: P, message: M) -> Self {
        CrawlerError::SinkWrite {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Errors that stop a run before any item is processed. The pipeline
    /// reports these through its `ProgressReporter` before returning them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlerError::SinkOpen { .. } | CrawlerError::InvalidPath { .. })
    }

    /// Render the error and every `source()` below it, one per line.
    pub fn detail(&self) -> String {
        let mut detail = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        detail
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for CrawlerError {
    fn user_message(&self) -> String {
        match self {
            CrawlerError::SinkOpen { path, message } => {
                format!("Aborted: could not prepare output {} ({})", path, message)
            }
            CrawlerError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            CrawlerError::InvalidPath { path } => {
                format!("Invalid path: {}", path)
            }
            CrawlerError::Cancelled => "Extraction was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            CrawlerError::SinkOpen { .. } => Some(
                "Close any program holding the output file open, or choose a different destination.".to_string()
            ),
            CrawlerError::Config { .. } => Some(
                "Check your configuration file syntax, or regenerate one with --generate-config.".to_string()
            ),
            CrawlerError::InvalidPath { .. } => Some(
                "Make sure the directory to crawl exists and is readable.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CrawlerError {
    fn from(error: toml::de::Error) -> Self {
        CrawlerError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrawlerError>;
