//! Data carried between the scanner, the format handlers and the sinks.

use crate::error::CrawlerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// Every field a sink knows how to store, in tabular column order.
pub const FIELDS: &[&str] = &[
    "filename",
    "filepath",
    "filelist",
    "guid",
    "format",
    "filesize",
    "datemodified",
    "cols",
    "rows",
    "bands",
    "datatype",
    "cellx",
    "celly",
    "nodata",
    "interleave",
    "byteorder",
    "srs",
    "description",
    "ulx",
    "uly",
    "lrx",
    "lry",
    "quicklook",
    "thumbnail",
];

/// Fields no record may be written without.
pub const REQUIRED_FIELDS: &[&str] = &["filename", "filepath", "guid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    WorldImage,
    Envi,
    AsciiGrid,
    Unrecognized,
}

impl FormatTag {
    pub fn name(&self) -> &'static str {
        match self {
            FormatTag::WorldImage => "world_image",
            FormatTag::Envi => "envi",
            FormatTag::AsciiGrid => "ascii_grid",
            FormatTag::Unrecognized => "unrecognized",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "world_image" => Some(FormatTag::WorldImage),
            "envi" => Some(FormatTag::Envi),
            "ascii_grid" => Some(FormatTag::AsciiGrid),
            _ => None,
        }
    }

    pub fn all() -> &'static [FormatTag] {
        &[FormatTag::WorldImage, FormatTag::Envi, FormatTag::AsciiGrid]
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One file found by the scanner, classified but not yet opened.
#[derive(Debug, Clone)]
pub struct DiscoveredItem {
    pub path: PathBuf,
    pub format: FormatTag,
    pub size: u64,
    pub modified: SystemTime,
}

impl DiscoveredItem {
    pub fn new(path: PathBuf, format: FormatTag, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            format,
            size,
            modified,
        }
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// The minimum every readable item yields.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub filepath: String,
    pub filelist: Vec<String>,
    pub guid: Uuid,
    pub format: FormatTag,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileInfo {
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("filename", &self.filename);
        record.insert("filepath", &self.filepath);
        record.insert("filelist", self.filelist.join(","));
        record.insert("guid", self.guid.to_string());
        record.insert("format", self.format.name());
        record.insert("filesize", self.size.to_string());
        let modified: chrono::DateTime<chrono::Utc> = self.modified.into();
        record.insert("datemodified", modified.to_rfc3339());
        record
    }
}

/// Open field-name to value mapping handed to the sinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every field of `other` into `self`, replacing existing values.
    pub fn merge(&mut self, other: &Record) {
        for (key, value) in other.iter() {
            self.fields.insert(key.to_string(), value.to_string());
        }
    }

    /// Copy fields of `other` that `self` does not have yet.
    pub fn fill_missing(&mut self, other: &Record) {
        for (key, value) in other.iter() {
            self.fields
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    /// Closed exterior ring, first and last coordinates equal.
    Polygon { ring: Vec<(f64, f64)> },
}

impl Geometry {
    /// Polygon from the four corners of a (possibly rotated) pixel grid.
    pub fn from_corners(ul: (f64, f64), ur: (f64, f64), lr: (f64, f64), ll: (f64, f64)) -> Self {
        Geometry::Polygon {
            ring: vec![ul, ur, lr, ll, ul],
        }
    }

    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        match self {
            Geometry::Point { x, y } => vec![(*x, *y)],
            Geometry::Polygon { ring } => ring.clone(),
        }
    }
}

/// Spatial footprint plus the attributes that travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    pub geometry: Geometry,
    pub attributes: Record,
}

impl Extent {
    /// Extent of a north-up grid given its upper-left corner and cell sizes.
    pub fn from_grid(ulx: f64, uly: f64, cellx: f64, celly: f64, cols: u64, rows: u64) -> Self {
        let lrx = ulx + cellx * cols as f64;
        let lry = uly - celly * rows as f64;
        let geometry = Geometry::from_corners((ulx, uly), (lrx, uly), (lrx, lry), (ulx, lry));
        Self::with_bounds(geometry, (ulx, uly), (lrx, lry))
    }

    pub fn with_bounds(geometry: Geometry, ul: (f64, f64), lr: (f64, f64)) -> Self {
        let mut attributes = Record::new();
        attributes.insert("ulx", ul.0.to_string());
        attributes.insert("uly", ul.1.to_string());
        attributes.insert("lrx", lr.0.to_string());
        attributes.insert("lry", lr.1.to_string());
        Self {
            geometry,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Enumerate,
    BasicInfo,
    Metadata,
    Extent,
    Overview,
    TabularWrite,
    GeometryWrite,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Enumerate => "enumeration",
            Stage::BasicInfo => "file info",
            Stage::Metadata => "metadata extraction",
            Stage::Extent => "extent extraction",
            Stage::Overview => "overview generation",
            Stage::TabularWrite => "tabular write",
            Stage::GeometryWrite => "geometry write",
        };
        f.write_str(name)
    }
}

/// A failed stage, kept for the end-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub stage: Stage,
    pub message: String,
    pub detail: String,
}

impl ErrorRecord {
    pub fn new(path: PathBuf, stage: Stage, error: &CrawlerError) -> Self {
        Self {
            path,
            stage,
            message: error.to_string(),
            detail: error.detail(),
        }
    }

    pub fn summary_line(&self) -> String {
        format!("{}: {} failed: {}", self.path.display(), self.stage, self.message)
    }
}
