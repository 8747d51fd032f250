use super::{common_sidecar_names, file_stem, overview, read_prj, FormatHandler, SiblingIndex};
use crate::error::{CrawlerError, Result};
use crate::record::{DiscoveredItem, Extent, FormatTag, Geometry, Record};
use image::{ColorType, ImageDecoder, ImageReader};
use std::path::{Path, PathBuf};

/// Plain raster images georeferenced by an ESRI world file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldImageHandler;

/// Affine transform from pixel centers to map coordinates.
///
/// Line order in the file: A, D, B, E, C, F, with
/// `x = A*col + B*row + C` and `y = D*col + E*row + F`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    pub a: f64,
    pub d: f64,
    pub b: f64,
    pub e: f64,
    pub c: f64,
    pub f: f64,
}

impl WorldFile {
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let values: Vec<f64> = text
            .split_whitespace()
            .map(|token| token.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| CrawlerError::extraction(path.display(), format!("invalid world file: {}", e)))?;

        if values.len() != 6 {
            return Err(CrawlerError::extraction(
                path.display(),
                format!("world file has {} values, expected 6", values.len()),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CrawlerError::extraction(path.display(), "world file contains non-finite values"));
        }

        Ok(Self {
            a: values[0],
            d: values[1],
            b: values[2],
            e: values[3],
            c: values[4],
            f: values[5],
        })
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Outer corners of a `cols` x `rows` grid.
    pub fn extent(&self, cols: u32, rows: u32) -> Extent {
        let right = cols as f64 - 0.5;
        let bottom = rows as f64 - 0.5;
        let ul = self.apply(-0.5, -0.5);
        let ur = self.apply(right, -0.5);
        let lr = self.apply(right, bottom);
        let ll = self.apply(-0.5, bottom);
        Extent::with_bounds(Geometry::from_corners(ul, ur, lr, ll), ul, lr)
    }

    pub fn is_rotated(&self) -> bool {
        self.b != 0.0 || self.d != 0.0
    }
}

/// World-file extensions for an image extension: `.tfw`, `.tifw`, then `.wld`.
fn world_file_extensions(extension: &str) -> Vec<String> {
    let extension = extension.to_lowercase();
    let mut candidates = Vec::new();
    let chars: Vec<char> = extension.chars().collect();
    if chars.len() >= 2 {
        candidates.push(format!("{}{}w", chars[0], chars[chars.len() - 1]));
    }
    candidates.push(format!("{}w", extension));
    candidates.push("wld".to_string());
    candidates
}

impl WorldImageHandler {
    fn find_world_file(&self, path: &Path) -> Result<PathBuf> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let index = SiblingIndex::read(dir)?;

        world_file_extensions(extension)
            .iter()
            .map(|ext| format!("{}.{}", file_stem(file_name), ext))
            .find_map(|name| index.find(&name).cloned())
            .ok_or_else(|| CrawlerError::extraction(path.display(), "no world file found"))
    }

    fn read_world_file(&self, path: &Path) -> Result<WorldFile> {
        let world_path = self.find_world_file(path)?;
        let text = std::fs::read_to_string(&world_path)?;
        WorldFile::parse(&world_path, &text)
    }
}

fn datatype_name(color: ColorType) -> &'static str {
    match color {
        ColorType::Rgb32F | ColorType::Rgba32F => "Float32",
        _ if color.bytes_per_pixel() / color.channel_count().max(1) >= 2 => "UInt16",
        _ => "Byte",
    }
}

impl FormatHandler for WorldImageHandler {
    fn format(&self) -> FormatTag {
        FormatTag::WorldImage
    }

    fn sidecar_names(&self, file_name: &str) -> Vec<String> {
        let stem = file_stem(file_name);
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let mut names: Vec<String> = world_file_extensions(extension)
            .iter()
            .map(|ext| format!("{}.{}", stem, ext))
            .collect();
        names.extend(common_sidecar_names(file_name));
        names
    }

    fn metadata(&self, item: &DiscoveredItem) -> Result<Record> {
        let decoder = ImageReader::open(&item.path)?
            .with_guessed_format()?
            .into_decoder()?;
        let (cols, rows) = decoder.dimensions();
        let color = decoder.color_type();

        let mut record = Record::new();
        record.insert("cols", cols.to_string());
        record.insert("rows", rows.to_string());
        record.insert("bands", color.channel_count().to_string());
        record.insert("datatype", datatype_name(color));

        if let Ok(world) = self.read_world_file(&item.path) {
            record.insert("cellx", world.a.abs().to_string());
            record.insert("celly", world.e.abs().to_string());
        }
        if let Some(srs) = read_prj(&item.path) {
            record.insert("srs", srs);
        }

        Ok(record)
    }

    fn extent(&self, item: &DiscoveredItem) -> Result<Extent> {
        let world = self.read_world_file(&item.path)?;
        let (cols, rows) = image::image_dimensions(&item.path)?;
        Ok(world.extent(cols, rows))
    }

    fn overview(&self, item: &DiscoveredItem, target: &Path, width: u32) -> Result<PathBuf> {
        let image = image::open(&item.path)?;
        overview::write_overview(&image, target, width)
    }
}
