#![allow(dead_code)]

use image::{Rgb, RgbImage};
use metacrawler::{CrawlMode, ProgressReporter, RunParameters};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const GRID: &str = "ncols 3
nrows 2
xllcorner 1000.0
yllcorner 2000.0
cellsize 10
NODATA_value -9999
1 2 3
4 5 -9999
";

pub const ENVI_HEADER: &str = "ENVI
description = {Test cube}
samples = 4
lines = 2
bands = 1
header offset = 0
data type = 1
interleave = bsq
byte order = 0
map info = {UTM, 1.000, 1.000, 500000.0, 4000000.0, 30.0, 30.0, 55, South, WGS-84, units=Meters}
";

pub const WORLD: &str = "2.0\n0.0\n0.0\n-2.0\n101.0\n199.0\n";

pub fn write_grid(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, GRID).unwrap();
    path
}

/// An ENVI header plus its `.img` data file. `data_type` is the ENVI code.
pub fn write_envi(dir: &Path, stem: &str, data_type: u8) -> PathBuf {
    let hdr = dir.join(format!("{}.hdr", stem));
    fs::write(&hdr, ENVI_HEADER.replace("data type = 1", &format!("data type = {}", data_type))).unwrap();
    fs::write(dir.join(format!("{}.img", stem)), [0u8, 40, 80, 120, 160, 200, 240, 255]).unwrap();
    hdr
}

pub fn write_png(dir: &Path, name: &str, with_world_file: bool) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(10, 5, Rgb([10, 20, 30])).save(&path).unwrap();
    if with_world_file {
        fs::write(path.with_extension("pgw"), WORLD).unwrap();
    }
    path
}

pub fn params(root: &Path, out: &Path) -> RunParameters {
    RunParameters {
        root: root.to_path_buf(),
        tabular_path: out.join("inventory.csv"),
        geometry_path: out.join("inventory.geojson"),
        log_path: out.join("inventory.log"),
        mode: CrawlMode::Crawl,
        overviews: false,
        debug: false,
    }
}

/// Tabular output as (header, rows).
pub fn read_table(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

pub fn column<'a>(header: &[String], row: &'a [String], name: &str) -> &'a str {
    let index = header.iter().position(|h| h == name).unwrap();
    &row[index]
}

pub fn read_features(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[derive(Default)]
pub struct RecordingReporter {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(u64, u64)>>,
}

impl RecordingReporter {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(u64, u64)> {
        self.progress.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn debug(&self, _message: &str) {}

    fn error(&self, message: &str, _detail: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn update_progress(&self, current: u64, max: u64) {
        self.progress.lock().unwrap().push((current, max));
    }
}
