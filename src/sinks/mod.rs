//! Destinations for extracted records.
//!
//! Both sinks take records one at a time and commit each before returning,
//! so an interrupted crawl leaves every record written so far readable.

pub mod geometry;
pub mod tabular;

pub use geometry::GeoJsonSink;
pub use tabular::CsvSink;

use crate::error::{CrawlerError, Result};
use crate::record::{Geometry, Record, FIELDS, REQUIRED_FIELDS};
use std::path::Path;

/// One record as handed to a sink.
#[derive(Debug, Clone, Copy)]
pub struct SinkRecord<'a> {
    pub attributes: &'a Record,
    pub geometry: Option<&'a Geometry>,
}

impl<'a> SinkRecord<'a> {
    pub fn attributes(attributes: &'a Record) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(attributes: &'a Record, geometry: &'a Geometry) -> Self {
        Self {
            attributes,
            geometry: Some(geometry),
        }
    }
}

pub trait OutputSink {
    /// Persist one record. On error nothing of the record is written.
    fn write_record(&mut self, record: SinkRecord<'_>) -> Result<()>;

    /// Flush and release the destination. Later writes fail.
    fn close(&mut self) -> Result<()>;

    fn records_written(&self) -> usize;

    fn path(&self) -> &Path;
}

/// Fixed field set a sink stores; unknown record keys are dropped.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<String>,
    required: Vec<String>,
}

impl FieldSchema {
    pub fn standard() -> Self {
        Self {
            fields: FIELDS.iter().map(|f| f.to_string()).collect(),
            required: REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn validate(&self, path: &Path, record: &Record) -> Result<()> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| record.get(field).map_or(true, str::is_empty))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CrawlerError::sink_write(
                path.display(),
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        Ok(())
    }

    /// Values in field order, empty where the record has none.
    pub fn row<'r>(&self, record: &'r Record) -> Vec<&'r str> {
        self.fields
            .iter()
            .map(|field| record.get(field).unwrap_or(""))
            .collect()
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// Make room for a fresh output file at `path`.
///
/// An existing file is removed when `overwrite` is set; any failure to do so
/// is a [`CrawlerError::SinkOpen`], since continuing would mix old and new
/// records.
pub fn prepare_destination(path: &Path, overwrite: bool) -> Result<()> {
    let sink_open = |message: String| CrawlerError::SinkOpen {
        path: path.display().to_string(),
        message,
    };

    if path.exists() || path.symlink_metadata().is_ok() {
        if !overwrite {
            return Err(sink_open("destination already exists".to_string()));
        }
        std::fs::remove_file(path).map_err(|e| sink_open(format!("unable to delete existing file: {}", e)))?;
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| sink_open(format!("unable to create directory: {}", e)))?;
        }
    }

    Ok(())
}
