use super::{common_sidecar_names, file_stem, overview, parse_number, read_prj, FormatHandler, SiblingIndex};
use crate::error::{CrawlerError, Result};
use crate::record::{DiscoveredItem, Extent, FormatTag, Record};
use image::{DynamicImage, GrayImage};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Binary data files that may accompany an ENVI `.hdr`, tried in order.
const DATA_EXTENSIONS: &[&str] = &["img", "dat", "bsq", "bil", "bip", "raw"];

/// Bytes read when checking a `.hdr` for the `ENVI` signature.
const SIGNATURE_PREFIX: u64 = 4096;

/// True when the first non-blank line of `path` is `ENVI`. Other `.hdr`
/// files (ESRI BIL headers, binary junk) are not ENVI headers.
pub fn has_envi_signature(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    BufReader::new(file.take(SIGNATURE_PREFIX))
        .lines()
        .map_while(|line| line.ok())
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim() == "ENVI")
}

/// ENVI raster described by a text `.hdr` beside a raw data file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnviHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bsq,
    Bil,
    Bip,
}

impl Interleave {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "bsq" => Some(Interleave::Bsq),
            "bil" => Some(Interleave::Bil),
            "bip" => Some(Interleave::Bip),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Interleave::Bsq => "BSQ",
            Interleave::Bil => "BIL",
            Interleave::Bip => "BIP",
        }
    }
}

/// Georeferencing from the `map info` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MapInfo {
    pub projection: String,
    pub ref_x: f64,
    pub ref_y: f64,
    pub easting: f64,
    pub northing: f64,
    pub cellx: f64,
    pub celly: f64,
    pub zone: Option<String>,
    pub hemisphere: Option<String>,
    pub datum: Option<String>,
}

impl MapInfo {
    fn parse(path: &Path, value: &str) -> Result<Self> {
        let inner = value.trim().trim_start_matches('{').trim_end_matches('}');
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() < 7 {
            return Err(CrawlerError::extraction(path.display(), "incomplete 'map info'"));
        }

        let number = |index: usize, field: &str| parse_number::<f64>(path, field, parts.get(index).copied());
        let projection = parts[0].to_string();
        let is_utm = projection.eq_ignore_ascii_case("UTM");
        let datum_index = if is_utm { 9 } else { 7 };

        Ok(Self {
            ref_x: number(1, "map info reference x")?,
            ref_y: number(2, "map info reference y")?,
            easting: number(3, "map info easting")?,
            northing: number(4, "map info northing")?,
            cellx: number(5, "map info pixel size x")?,
            celly: number(6, "map info pixel size y")?,
            zone: if is_utm { parts.get(7).map(|s| s.to_string()) } else { None },
            hemisphere: if is_utm { parts.get(8).map(|s| s.to_string()) } else { None },
            datum: parts
                .get(datum_index)
                .filter(|s| !s.contains('='))
                .map(|s| s.to_string()),
            projection,
        })
    }

    /// Upper-left corner of the upper-left pixel. Reference pixels are 1-based.
    pub fn upper_left(&self) -> (f64, f64) {
        (
            self.easting - (self.ref_x - 1.0) * self.cellx,
            self.northing + (self.ref_y - 1.0) * self.celly,
        )
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![self.projection.clone()];
        if let Some(zone) = &self.zone {
            parts.push(format!("zone {}", zone));
        }
        if let Some(hemisphere) = &self.hemisphere {
            parts.push(hemisphere.clone());
        }
        if let Some(datum) = &self.datum {
            parts.push(datum.clone());
        }
        parts.join(" ")
    }
}

/// Dimensions and georeferencing. Enough to compute a footprint without
/// validating the rest of the header.
#[derive(Debug, Clone)]
pub struct EnviGrid {
    pub samples: u32,
    pub lines: u32,
    pub map_info: Option<MapInfo>,
}

impl EnviGrid {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        Self::from_entries(path, &parse_entries(path, text)?)
    }

    fn from_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| entries.get(key).map(String::as_str);
        let map_info = match get("map info") {
            Some(value) => Some(MapInfo::parse(path, value)?),
            None => None,
        };

        Ok(Self {
            samples: parse_number(path, "samples", get("samples"))?,
            lines: parse_number(path, "lines", get("lines"))?,
            map_info,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnviHeader {
    pub samples: u32,
    pub lines: u32,
    pub bands: u32,
    pub data_type: u32,
    pub interleave: Interleave,
    pub byte_order: u32,
    pub header_offset: u64,
    pub description: Option<String>,
    pub map_info: Option<MapInfo>,
    pub coordinate_system: Option<String>,
    pub nodata: Option<String>,
}

impl EnviHeader {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let entries = parse_entries(path, text)?;
        let grid = EnviGrid::from_entries(path, &entries)?;
        let get = |key: &str| entries.get(key).map(String::as_str);

        let interleave = match get("interleave") {
            Some(value) => Interleave::parse(value).ok_or_else(|| {
                CrawlerError::extraction(path.display(), format!("unknown interleave '{}'", value))
            })?,
            None => Interleave::Bsq,
        };

        Ok(Self {
            samples: grid.samples,
            lines: grid.lines,
            bands: parse_number(path, "bands", get("bands"))?,
            data_type: parse_number(path, "data type", get("data type"))?,
            interleave,
            byte_order: get("byte order").map_or(Ok(0), |v| parse_number(path, "byte order", Some(v)))?,
            header_offset: get("header offset").map_or(Ok(0), |v| parse_number(path, "header offset", Some(v)))?,
            description: get("description").map(strip_braces),
            map_info: grid.map_info,
            coordinate_system: get("coordinate system string").map(strip_braces),
            nodata: get("data ignore value").map(|v| v.trim().to_string()),
        })
    }

    pub fn datatype_name(&self) -> &'static str {
        match self.data_type {
            1 => "Byte",
            2 => "Int16",
            3 => "Int32",
            4 => "Float32",
            5 => "Float64",
            6 => "CFloat32",
            9 => "CFloat64",
            12 => "UInt16",
            13 => "UInt32",
            14 => "Int64",
            15 => "UInt64",
            _ => "Unknown",
        }
    }
}

fn strip_braces(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        .to_string()
}

/// `key = value` pairs, keys lowercased, `{...}` values may span lines.
fn parse_entries(path: &Path, text: &str) -> Result<BTreeMap<String, String>> {
    let mut lines = text.lines();
    let first = lines.by_ref().map(str::trim).find(|l| !l.is_empty());
    if first != Some("ENVI") {
        return Err(CrawlerError::extraction(path.display(), "not an ENVI header"));
    }

    let mut entries = BTreeMap::new();
    let mut pending: Option<(String, String)> = None;

    for line in lines {
        if let Some((key, mut value)) = pending.take() {
            value.push('\n');
            value.push_str(line);
            if line.contains('}') {
                entries.insert(key, value);
            } else {
                pending = Some((key, value));
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_string();
        if value.starts_with('{') && !value.contains('}') {
            pending = Some((key, value));
        } else {
            entries.insert(key, value);
        }
    }

    if let Some((key, _)) = pending {
        return Err(CrawlerError::extraction(
            path.display(),
            format!("unterminated value for '{}'", key),
        ));
    }

    Ok(entries)
}

impl EnviHandler {
    fn find_data_file(&self, header_path: &Path) -> Result<PathBuf> {
        let file_name = header_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let dir = header_path.parent().unwrap_or_else(|| Path::new("."));
        let index = SiblingIndex::read(dir)?;

        data_file_names(file_name)
            .iter()
            .find_map(|name| index.find(name).cloned())
            .ok_or_else(|| CrawlerError::extraction(header_path.display(), "no ENVI data file found"))
    }

    /// First band as an 8-bit image. Only byte data is supported.
    fn read_first_band(&self, header_path: &Path, header: &EnviHeader) -> Result<GrayImage> {
        if header.data_type != 1 {
            return Err(CrawlerError::OverviewUnsupported {
                format: format!("ENVI {} data", header.datatype_name()),
            });
        }

        let (offset, needed) = band_span(header).ok_or_else(|| {
            CrawlerError::extraction(header_path.display(), "header dimensions or offset out of range")
        })?;

        let data_path = self.find_data_file(header_path)?;
        let data = std::fs::read(&data_path)?;
        if data.len() < needed {
            return Err(CrawlerError::extraction(
                data_path.display(),
                format!("data file has {} bytes, expected at least {}", data.len(), needed),
            ));
        }
        let samples = header.samples as usize;
        let lines = header.lines as usize;
        let bands = header.bands.max(1) as usize;
        let body = &data[offset..needed];

        let pixels: Vec<u8> = match header.interleave {
            Interleave::Bsq => body[..samples * lines].to_vec(),
            Interleave::Bil => (0..lines)
                .flat_map(move |line| {
                    let start = line * samples * bands;
                    body[start..start + samples].iter().copied()
                })
                .collect(),
            Interleave::Bip => body.iter().step_by(bands).copied().collect(),
        };

        GrayImage::from_raw(header.samples, header.lines, pixels).ok_or_else(|| {
            CrawlerError::extraction(data_path.display(), "band does not match header dimensions")
        })
    }
}

/// Byte range `(offset, end)` of the cube in the data file, or `None` when
/// the header values do not fit in memory addresses.
fn band_span(header: &EnviHeader) -> Option<(usize, usize)> {
    let samples = usize::try_from(header.samples).ok()?;
    let lines = usize::try_from(header.lines).ok()?;
    let bands = usize::try_from(header.bands.max(1)).ok()?;
    let offset = usize::try_from(header.header_offset).ok()?;
    let size = samples.checked_mul(lines)?.checked_mul(bands)?;
    let end = offset.checked_add(size)?;
    Some((offset, end))
}

fn data_file_names(header_name: &str) -> Vec<String> {
    let stem = file_stem(header_name);
    let mut names: Vec<String> = DATA_EXTENSIONS
        .iter()
        .map(|ext| format!("{}.{}", stem, ext))
        .collect();
    names.push(stem.to_string());
    names
}

impl FormatHandler for EnviHandler {
    fn format(&self) -> FormatTag {
        FormatTag::Envi
    }

    fn sidecar_names(&self, file_name: &str) -> Vec<String> {
        let mut names = data_file_names(file_name);
        let stem = file_stem(file_name);
        for ext in DATA_EXTENSIONS {
            names.extend(common_sidecar_names(&format!("{}.{}", stem, ext)));
        }
        names.extend(common_sidecar_names(file_name));
        names
    }

    fn metadata(&self, item: &DiscoveredItem) -> Result<Record> {
        let header = EnviHeader::read(&item.path)?;

        let mut record = Record::new();
        record.insert("cols", header.samples.to_string());
        record.insert("rows", header.lines.to_string());
        record.insert("bands", header.bands.to_string());
        record.insert("datatype", header.datatype_name());
        record.insert("interleave", header.interleave.name());
        record.insert(
            "byteorder",
            if header.byte_order == 1 { "big-endian" } else { "little-endian" },
        );

        if let Some(description) = &header.description {
            record.insert("description", description.as_str());
        }
        if let Some(nodata) = &header.nodata {
            record.insert("nodata", nodata.as_str());
        }

        if let Some(map_info) = &header.map_info {
            record.insert("cellx", map_info.cellx.to_string());
            record.insert("celly", map_info.celly.to_string());
        }

        let srs = header
            .coordinate_system
            .clone()
            .or_else(|| read_prj(&item.path))
            .or_else(|| header.map_info.as_ref().map(MapInfo::describe));
        if let Some(srs) = srs {
            record.insert("srs", srs);
        }

        Ok(record)
    }

    fn extent(&self, item: &DiscoveredItem) -> Result<Extent> {
        let grid = EnviGrid::read(&item.path)?;
        let map_info = grid
            .map_info
            .as_ref()
            .ok_or_else(|| CrawlerError::extraction(item.path.display(), "header has no 'map info'"))?;

        let (ulx, uly) = map_info.upper_left();
        Ok(Extent::from_grid(
            ulx,
            uly,
            map_info.cellx,
            map_info.celly,
            grid.samples as u64,
            grid.lines as u64,
        ))
    }

    fn overview(&self, item: &DiscoveredItem, target: &Path, width: u32) -> Result<PathBuf> {
        let header = EnviHeader::read(&item.path)?;
        let band = self.read_first_band(&item.path, &header)?;
        overview::write_overview(&DynamicImage::ImageLuma8(band), target, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const HEADER: &str = "ENVI
description = {
  Landsat subset,
  band 1}
samples = 4
lines   = 2
bands   = 2
header offset = 0
data type = 1
interleave = bil
byte order = 0
map info = {UTM, 1.000, 1.000, 500000.0, 4000000.0, 30.0, 30.0, 55, South, WGS-84, units=Meters}
";

    fn item(path: PathBuf) -> DiscoveredItem {
        DiscoveredItem::new(path, FormatTag::Envi, 0, SystemTime::now())
    }

    #[test]
    fn test_parse_header() {
        let header = EnviHeader::parse(Path::new("a.hdr"), HEADER).unwrap();
        assert_eq!(header.samples, 4);
        assert_eq!(header.lines, 2);
        assert_eq!(header.bands, 2);
        assert_eq!(header.interleave, Interleave::Bil);
        assert_eq!(header.datatype_name(), "Byte");
        assert!(header.description.as_deref().unwrap().contains("band 1"));

        let map_info = header.map_info.unwrap();
        assert_eq!(map_info.zone.as_deref(), Some("55"));
        assert_eq!(map_info.datum.as_deref(), Some("WGS-84"));
        assert_eq!(map_info.describe(), "UTM zone 55 South WGS-84");
    }

    #[test]
    fn test_rejects_non_envi_header() {
        assert!(EnviHeader::parse(Path::new("a.hdr"), "samples = 4\n").is_err());
        assert!(EnviHeader::parse(Path::new("a.hdr"), "ENVI\nsamples = 4\n").is_err());
    }

    #[test]
    fn test_envi_signature() {
        let temp_dir = TempDir::new().unwrap();
        let envi = temp_dir.path().join("cube.hdr");
        let esri = temp_dir.path().join("esri.hdr");
        let binary = temp_dir.path().join("junk.hdr");
        fs::write(&envi, format!("\n{}", HEADER)).unwrap();
        fs::write(&esri, "BYTEORDER I\nLAYOUT BIL\nNROWS 2\n").unwrap();
        fs::write(&binary, [0xffu8, 0xfe, 0x00, 0x10]).unwrap();

        assert!(has_envi_signature(&envi));
        assert!(!has_envi_signature(&esri));
        assert!(!has_envi_signature(&binary));
        assert!(!has_envi_signature(&temp_dir.path().join("missing.hdr")));
    }

    #[test]
    fn test_reference_pixel_offsets_upper_left() {
        let map_info = MapInfo::parse(
            Path::new("a.hdr"),
            "{Geographic Lat/Lon, 2.0, 3.0, 10.0, 50.0, 0.5, 0.25, WGS-84}",
        )
        .unwrap();
        assert_eq!(map_info.upper_left(), (9.5, 50.5));
        assert_eq!(map_info.zone, None);
        assert_eq!(map_info.datum.as_deref(), Some("WGS-84"));
    }

    #[test]
    fn test_metadata_extent_and_overview() {
        let temp_dir = TempDir::new().unwrap();
        let hdr = temp_dir.path().join("cube.hdr");
        fs::write(&hdr, HEADER).unwrap();
        // BIL: line 0 band 0, line 0 band 1, line 1 band 0, line 1 band 1
        fs::write(
            temp_dir.path().join("cube.img"),
            [0u8, 50, 100, 150, 9, 9, 9, 9, 200, 210, 220, 230, 9, 9, 9, 9],
        )
        .unwrap();

        let metadata = EnviHandler.metadata(&item(hdr.clone())).unwrap();
        assert_eq!(metadata.get("cols"), Some("4"));
        assert_eq!(metadata.get("interleave"), Some("BIL"));
        assert_eq!(metadata.get("srs"), Some("UTM zone 55 South WGS-84"));

        let extent = EnviHandler.extent(&item(hdr.clone())).unwrap();
        assert_eq!(extent.attributes.get("ulx"), Some("500000"));
        assert_eq!(extent.attributes.get("lrx"), Some("500120"));
        assert_eq!(extent.attributes.get("lry"), Some("3999940"));

        let target = temp_dir.path().join("cube.hdr.qlk.jpg");
        EnviHandler.overview(&item(hdr), &target, 800).unwrap();
        assert_eq!(image::image_dimensions(&target).unwrap(), (4, 2));
    }

    #[test]
    fn test_float_overview_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let hdr = temp_dir.path().join("float.hdr");
        fs::write(&hdr, HEADER.replace("data type = 1", "data type = 4")).unwrap();

        let metadata = EnviHandler.metadata(&item(hdr.clone())).unwrap();
        assert_eq!(metadata.get("datatype"), Some("Float32"));

        let error = EnviHandler
            .overview(&item(hdr), &temp_dir.path().join("float.qlk.jpg"), 800)
            .unwrap_err();
        assert!(matches!(error, CrawlerError::OverviewUnsupported { .. }));
    }

    #[test]
    fn test_overflowing_offset_is_an_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let hdr = temp_dir.path().join("bad.hdr");
        fs::write(
            &hdr,
            HEADER.replace("header offset = 0", "header offset = 18446744073709551615"),
        )
        .unwrap();
        fs::write(temp_dir.path().join("bad.img"), [0u8; 16]).unwrap();

        let error = EnviHandler
            .overview(&item(hdr), &temp_dir.path().join("bad.qlk.jpg"), 800)
            .unwrap_err();
        assert!(matches!(error, CrawlerError::Extraction { .. }));
    }

    #[test]
    fn test_overflowing_dimensions_are_an_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let hdr = temp_dir.path().join("huge.hdr");
        let text = HEADER
            .replace("samples = 4", "samples = 4294967295")
            .replace("lines   = 2", "lines   = 4294967295")
            .replace("bands   = 2", "bands   = 4294967295");
        fs::write(&hdr, text).unwrap();
        fs::write(temp_dir.path().join("huge.img"), [0u8; 16]).unwrap();

        let error = EnviHandler
            .overview(&item(hdr), &temp_dir.path().join("huge.qlk.jpg"), 800)
            .unwrap_err();
        assert!(matches!(error, CrawlerError::Extraction { .. }));
    }

    #[test]
    fn test_band_span_checks_arithmetic() {
        let mut header = EnviHeader::parse(Path::new("a.hdr"), HEADER).unwrap();
        assert_eq!(band_span(&header), Some((0, 16)));

        header.header_offset = 10;
        assert_eq!(band_span(&header), Some((10, 26)));

        header.header_offset = u64::MAX;
        assert_eq!(band_span(&header), None);

        header.header_offset = 0;
        header.samples = u32::MAX;
        header.lines = u32::MAX;
        header.bands = u32::MAX;
        assert_eq!(band_span(&header), None);
    }

    #[test]
    fn test_extent_ignores_unknown_interleave() {
        let temp_dir = TempDir::new().unwrap();
        let hdr = temp_dir.path().join("odd.hdr");
        fs::write(&hdr, HEADER.replace("interleave = bil", "interleave = zigzag")).unwrap();

        assert!(EnviHandler.metadata(&item(hdr.clone())).is_err());
        let extent = EnviHandler.extent(&item(hdr)).unwrap();
        assert_eq!(extent.attributes.get("ulx"), Some("500000"));
        assert_eq!(extent.attributes.get("lry"), Some("3999940"));
    }

    #[test]
    fn test_sidecars_include_data_file() {
        let names = EnviHandler.sidecar_names("cube.hdr");
        assert!(names.contains(&"cube.img".to_string()));
        assert!(names.contains(&"cube".to_string()));
        assert!(names.contains(&"cube.img.aux.xml".to_string()));
        assert!(names.contains(&"cube.prj".to_string()));
    }
}
