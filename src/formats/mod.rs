//! Per-format extraction.
//!
//! Each supported imagery family has a handler implementing [`FormatHandler`].
//! The set is closed: [`Handler`] wraps one variant per [`FormatTag`] and
//! dispatches statically, with [`Handler::BasicOnly`] covering items no
//! handler claims.

pub mod ascii_grid;
pub mod envi;
pub mod overview;
pub mod world_image;

pub use ascii_grid::AsciiGridHandler;
pub use envi::EnviHandler;
pub use world_image::{WorldFile, WorldImageHandler};

use crate::error::{CrawlerError, Result};
use crate::paths::PathNormalizer;
use crate::record::{DiscoveredItem, Extent, FileInfo, FormatTag, Record};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Sidecars any raster may carry regardless of format.
const COMMON_SIDECAR_SUFFIXES: &[&str] = &[".aux.xml", ".ovr", ".xml"];

/// Format of `path` by extension. A `.hdr` must also carry the ENVI signature.
pub fn detect_format(path: &Path) -> Option<FormatTag> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "tif" | "tiff" | "jpg" | "jpeg" | "png" | "gif" | "bmp" => Some(FormatTag::WorldImage),
        "hdr" if envi::has_envi_signature(path) => Some(FormatTag::Envi),
        "asc" => Some(FormatTag::AsciiGrid),
        _ => None,
    }
}

/// Case-insensitive view of the files in one directory.
#[derive(Debug, Default)]
pub struct SiblingIndex {
    by_name: HashMap<String, PathBuf>,
}

impl SiblingIndex {
    pub fn read(dir: &Path) -> std::io::Result<Self> {
        let mut index = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                index.insert(entry.path());
            }
        }
        Ok(index)
    }

    pub fn from_paths<'a, I: IntoIterator<Item = &'a PathBuf>>(paths: I) -> Self {
        let mut index = Self::default();
        for path in paths {
            index.insert(path.clone());
        }
        index
    }

    fn insert(&mut self, path: PathBuf) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.by_name.insert(name.to_lowercase(), path);
        }
    }

    pub fn find(&self, file_name: &str) -> Option<&PathBuf> {
        self.by_name.get(&file_name.to_lowercase())
    }
}

/// Capability every format family provides.
pub trait FormatHandler {
    fn format(&self) -> FormatTag;

    /// File names (not paths) that belong to the dataset whose primary
    /// file is `file_name`.
    fn sidecar_names(&self, file_name: &str) -> Vec<String>;

    fn metadata(&self, item: &DiscoveredItem) -> Result<Record>;

    fn extent(&self, item: &DiscoveredItem) -> Result<Extent>;

    fn overview(&self, item: &DiscoveredItem, target: &Path, width: u32) -> Result<PathBuf>;
}

/// Names shared by every format: `<name>.aux.xml`, `<stem>.prj` and so on.
pub fn common_sidecar_names(file_name: &str) -> Vec<String> {
    let mut names: Vec<String> = COMMON_SIDECAR_SUFFIXES
        .iter()
        .map(|suffix| format!("{}{}", file_name, suffix))
        .collect();
    let stem = file_stem(file_name);
    names.push(format!("{}.prj", stem));
    names.push(format!("{}.aux.xml", stem));
    names
}

pub fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Read the WKT of a `.prj` sidecar, if the dataset has one.
pub fn read_prj(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let dir = path.parent()?;
    let index = SiblingIndex::read(dir).ok()?;
    let prj = index.find(&format!("{}.prj", file_stem(file_name)))?;
    let text = std::fs::read_to_string(prj).ok()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Handler {
    WorldImage(WorldImageHandler),
    Envi(EnviHandler),
    AsciiGrid(AsciiGridHandler),
    /// No handler claims the item; only file info is recorded.
    BasicOnly,
}

impl Handler {
    pub fn for_format(format: FormatTag) -> Self {
        match format {
            FormatTag::WorldImage => Handler::WorldImage(WorldImageHandler),
            FormatTag::Envi => Handler::Envi(EnviHandler),
            FormatTag::AsciiGrid => Handler::AsciiGrid(AsciiGridHandler),
            FormatTag::Unrecognized => Handler::BasicOnly,
        }
    }

    pub fn is_basic_only(&self) -> bool {
        matches!(self, Handler::BasicOnly)
    }

    fn handler(&self) -> Option<&dyn FormatHandler> {
        match self {
            Handler::WorldImage(h) => Some(h),
            Handler::Envi(h) => Some(h),
            Handler::AsciiGrid(h) => Some(h),
            Handler::BasicOnly => None,
        }
    }

    /// Existing sidecar files for `path`, sorted, the primary excluded.
    pub fn sidecars(&self, path: &Path, index: &SiblingIndex) -> Vec<PathBuf> {
        let Some(handler) = self.handler() else {
            return Vec::new();
        };
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Vec::new();
        };

        let mut found: Vec<PathBuf> = handler
            .sidecar_names(file_name)
            .iter()
            .filter_map(|name| index.find(name))
            .filter(|candidate| candidate.as_path() != path)
            .cloned()
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// File info for any readable item.
    pub fn basic_info(&self, item: &DiscoveredItem, normalizer: &PathNormalizer) -> Result<FileInfo> {
        let stat = std::fs::metadata(&item.path)?;
        if !stat.is_file() {
            return Err(CrawlerError::InvalidPath {
                path: format!("{} is not a regular file", item.path.display()),
            });
        }
        // Opening proves the file is readable, not just listed.
        std::fs::File::open(&item.path)?;

        let filename = item
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let sidecars = match item.path.parent() {
            Some(dir) => {
                let index = SiblingIndex::read(dir)?;
                self.sidecars(&item.path, &index)
            }
            None => Vec::new(),
        };

        let mut filelist = vec![normalizer.normalize(&item.path)];
        filelist.extend(normalizer.normalize_all(&sidecars));

        Ok(FileInfo {
            filename,
            filepath: normalizer.normalize(&item.path),
            filelist,
            guid: Uuid::new_v4(),
            format: item.format,
            size: stat.len(),
            modified: stat.modified().unwrap_or(item.modified),
        })
    }

    pub fn metadata(&self, item: &DiscoveredItem) -> Result<Record> {
        match self.handler() {
            Some(handler) => handler.metadata(item),
            None => Err(no_handler(item)),
        }
    }

    pub fn extent(&self, item: &DiscoveredItem) -> Result<Extent> {
        match self.handler() {
            Some(handler) => handler.extent(item),
            None => Err(no_handler(item)),
        }
    }

    pub fn overview(&self, item: &DiscoveredItem, target: &Path, width: u32) -> Result<PathBuf> {
        match self.handler() {
            Some(handler) => handler.overview(item, target, width),
            None => Err(no_handler(item)),
        }
    }
}

fn no_handler(item: &DiscoveredItem) -> CrawlerError {
    CrawlerError::extraction(item.path.display(), "no handler for unrecognized format")
}

pub(crate) fn parse_number<T: std::str::FromStr>(
    path: &Path,
    field: &str,
    value: Option<&str>,
) -> Result<T> {
    let value = value.ok_or_else(|| {
        CrawlerError::extraction(path.display(), format!("missing '{}'", field))
    })?;
    value.trim().parse::<T>().map_err(|_| {
        CrawlerError::extraction(
            path.display(),
            format!("invalid '{}' value: {}", field, value.trim()),
        )
    })
}
