//! Downsampled JPEG previews shared by every handler.

use crate::error::{CrawlerError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::path::{Path, PathBuf};

/// Resize `image` to `width` pixels wide (never upscaling) and save it as JPEG.
pub fn write_overview(image: &DynamicImage, target: &Path, width: u32) -> Result<PathBuf> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CrawlerError::extraction(target.display(), "image has no pixels"));
    }

    let (new_width, new_height) = scaled_dimensions(image.width(), image.height(), width);
    let resized = image.resize_exact(new_width, new_height, FilterType::Triangle);

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // JPEG cannot carry alpha or 16-bit samples.
    DynamicImage::ImageRgb8(resized.to_rgb8()).save_with_format(target, ImageFormat::Jpeg)?;
    Ok(target.to_path_buf())
}

pub fn scaled_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    let new_width = target_width.clamp(1, width.max(1));
    let new_height = (height as f64 * new_width as f64 / width.max(1) as f64).round() as u32;
    (new_width, new_height.max(1))
}

/// Linear min..max stretch of a single band to 8-bit gray.
///
/// Cells equal to `nodata` (or non-finite) render black and are left out of
/// the range computation.
pub fn stretch_to_gray(
    source: &Path,
    values: &[f64],
    cols: u32,
    rows: u32,
    nodata: Option<f64>,
) -> Result<GrayImage> {
    let expected = cols as usize * rows as usize;
    if values.len() != expected {
        return Err(CrawlerError::extraction(
            source.display(),
            format!("expected {} cells, found {}", expected, values.len()),
        ));
    }

    let is_valid = |v: f64| v.is_finite() && nodata.map_or(true, |nd| v != nd);

    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| is_valid(*v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let range = if max > min { max - min } else { 1.0 };
    let pixels: Vec<u8> = values
        .iter()
        .map(|&v| {
            if !is_valid(v) {
                0
            } else {
                (((v - min) / range) * 254.0 + 1.0).round().clamp(1.0, 255.0) as u8
            }
        })
        .collect();

    GrayImage::from_raw(cols, rows, pixels).ok_or_else(|| {
        CrawlerError::extraction(source.display(), "pixel buffer does not match grid size")
    })
}
