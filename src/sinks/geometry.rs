use super::{prepare_destination, FieldSchema, OutputSink, SinkRecord};
use crate::error::{CrawlerError, Result};
use crate::record::Geometry;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Newline-delimited GeoJSON: one `Feature` object per line.
pub struct GeoJsonSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    schema: FieldSchema,
    written: usize,
}

impl GeoJsonSink {
    pub fn open(path: &Path, schema: FieldSchema, overwrite: bool) -> Result<Self> {
        prepare_destination(path, overwrite)?;

        let file = File::create(path).map_err(|e| CrawlerError::SinkOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!("Opened geometry output {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            schema,
            written: 0,
        })
    }

    fn feature(&self, record: SinkRecord<'_>) -> Result<Value> {
        let geometry = record
            .geometry
            .ok_or_else(|| CrawlerError::sink_write(self.path.display(), "record has no geometry"))?;
        let geometry = geometry_json(&self.path, geometry)?;

        self.schema.validate(&self.path, record.attributes)?;

        let mut properties = Map::new();
        for field in self.schema.fields() {
            if let Some(value) = record.attributes.get(field) {
                properties.insert(field.clone(), Value::String(value.to_string()));
            }
        }

        Ok(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }))
    }
}

fn geometry_json(path: &Path, geometry: &Geometry) -> Result<Value> {
    let invalid = |message: &str| CrawlerError::sink_write(path.display(), message);

    let coordinates = geometry.coordinates();
    if coordinates.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(invalid("geometry has non-finite coordinates"));
    }

    match geometry {
        Geometry::Point { x, y } => Ok(json!({
            "type": "Point",
            "coordinates": [x, y],
        })),
        Geometry::Polygon { ring } => {
            if ring.len() < 4 {
                return Err(invalid("polygon ring needs at least 4 points"));
            }
            if ring.first() != ring.last() {
                return Err(invalid("polygon ring is not closed"));
            }
            let ring: Vec<[f64; 2]> = ring.iter().map(|(x, y)| [*x, *y]).collect();
            Ok(json!({
                "type": "Polygon",
                "coordinates": [ring],
            }))
        }
    }
}

impl OutputSink for GeoJsonSink {
    fn write_record(&mut self, record: SinkRecord<'_>) -> Result<()> {
        if self.writer.is_none() {
            return Err(CrawlerError::sink_write(self.path.display(), "sink is closed"));
        }

        let mut line = serde_json::to_string(&self.feature(record)?)?;
        line.push('\n');

        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.flush())
                .map_err(|e| CrawlerError::sink_write(self.path.display(), e.to_string()))?;
        }

        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| CrawlerError::sink_write(self.path.display(), e.to_string()))?;
            file.sync_all()?;
            tracing::debug!("Closed {} after {} features", self.path.display(), self.written);
        }
        Ok(())
    }

    fn records_written(&self) -> usize {
        self.written
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GeoJsonSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}
