use super::{common_sidecar_names, overview, parse_number, read_prj, FormatHandler};
use crate::error::{CrawlerError, Result};
use crate::record::{DiscoveredItem, Extent, FormatTag, Record};
use image::DynamicImage;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// ESRI ASCII grid (`.asc`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiGridHandler;

#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGridHeader {
    pub ncols: u32,
    pub nrows: u32,
    pub xll: f64,
    pub yll: f64,
    /// `xllcorner`/`yllcorner` rather than `xllcenter`/`yllcenter`.
    pub corner: bool,
    pub cellx: f64,
    pub celly: f64,
    pub nodata: Option<f64>,
}

impl AsciiGridHeader {
    /// Parse the header; returns it and the number of header lines consumed.
    pub fn parse(path: &Path, lines: &[String]) -> Result<(Self, usize)> {
        let mut keys: HashMap<String, String> = HashMap::new();
        let mut consumed = 0;

        for line in lines {
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                consumed += 1;
                continue;
            };
            if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            let value = tokens.next().unwrap_or("").to_string();
            keys.insert(key.to_lowercase(), value);
            consumed += 1;
        }

        let get = |key: &str| keys.get(key).map(String::as_str);

        if !keys.contains_key("ncols") || !keys.contains_key("nrows") {
            return Err(CrawlerError::extraction(path.display(), "not an ASCII grid header"));
        }

        let (xll, yll, corner) = match (get("xllcorner"), get("yllcorner")) {
            (Some(x), Some(y)) => (
                parse_number(path, "xllcorner", Some(x))?,
                parse_number(path, "yllcorner", Some(y))?,
                true,
            ),
            _ => (
                parse_number(path, "xllcenter", get("xllcenter"))?,
                parse_number(path, "yllcenter", get("yllcenter"))?,
                false,
            ),
        };

        let (cellx, celly) = match get("cellsize") {
            Some(size) => {
                let size: f64 = parse_number(path, "cellsize", Some(size))?;
                (size, size)
            }
            None => (
                parse_number(path, "dx", get("dx"))?,
                parse_number(path, "dy", get("dy"))?,
            ),
        };

        let nodata = match get("nodata_value") {
            Some(value) => Some(parse_number(path, "nodata_value", Some(value))?),
            None => None,
        };

        let header = Self {
            ncols: parse_number(path, "ncols", get("ncols"))?,
            nrows: parse_number(path, "nrows", get("nrows"))?,
            xll,
            yll,
            corner,
            cellx,
            celly,
            nodata,
        };
        Ok((header, consumed))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .take(10)
            .collect::<std::io::Result<_>>()?;
        Ok(Self::parse(path, &lines)?.0)
    }

    pub fn upper_left(&self) -> (f64, f64) {
        let (x, y) = if self.corner {
            (self.xll, self.yll)
        } else {
            (self.xll - self.cellx / 2.0, self.yll - self.celly / 2.0)
        };
        (x, y + self.celly * self.nrows as f64)
    }
}

impl FormatHandler for AsciiGridHandler {
    fn format(&self) -> FormatTag {
        FormatTag::AsciiGrid
    }

    fn sidecar_names(&self, file_name: &str) -> Vec<String> {
        common_sidecar_names(file_name)
    }

    fn metadata(&self, item: &DiscoveredItem) -> Result<Record> {
        let header = AsciiGridHeader::read(&item.path)?;

        let mut record = Record::new();
        record.insert("cols", header.ncols.to_string());
        record.insert("rows", header.nrows.to_string());
        record.insert("bands", "1");
        record.insert("datatype", "Float32");
        record.insert("cellx", header.cellx.to_string());
        record.insert("celly", header.celly.to_string());
        if let Some(nodata) = header.nodata {
            record.insert("nodata", nodata.to_string());
        }
        if let Some(srs) = read_prj(&item.path) {
            record.insert("srs", srs);
        }
        Ok(record)
    }

    fn extent(&self, item: &DiscoveredItem) -> Result<Extent> {
        let header = AsciiGridHeader::read(&item.path)?;
        let (ulx, uly) = header.upper_left();
        Ok(Extent::from_grid(
            ulx,
            uly,
            header.cellx,
            header.celly,
            header.ncols as u64,
            header.nrows as u64,
        ))
    }

    fn overview(&self, item: &DiscoveredItem, target: &Path, width: u32) -> Result<PathBuf> {
        let text = std::fs::read_to_string(&item.path)?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let (header, consumed) = AsciiGridHeader::parse(&item.path, &lines)?;

        let values: Vec<f64> = lines[consumed..]
            .iter()
            .flat_map(|line| line.split_whitespace())
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    CrawlerError::extraction(item.path.display(), format!("invalid cell value '{}'", token))
                })
            })
            .collect::<Result<_>>()?;

        let gray = overview::stretch_to_gray(&item.path, &values, header.ncols, header.nrows, header.nodata)?;
        overview::write_overview(&DynamicImage::ImageLuma8(gray), target, width)
    }
}
