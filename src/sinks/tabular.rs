use super::{prepare_destination, FieldSchema, OutputSink, SinkRecord};
use crate::error::{CrawlerError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// One CSV row per record, with a header row naming the schema fields.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    schema: FieldSchema,
    written: usize,
}

impl CsvSink {
    pub fn open(path: &Path, schema: FieldSchema, overwrite: bool) -> Result<Self> {
        prepare_destination(path, overwrite)?;

        let file = File::create(path).map_err(|e| CrawlerError::SinkOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(schema.fields())
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| CrawlerError::SinkOpen {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!("Opened tabular output {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            schema,
            written: 0,
        })
    }
}

impl OutputSink for CsvSink {
    fn write_record(&mut self, record: SinkRecord<'_>) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CrawlerError::sink_write(self.path.display(), "sink is closed"))?;

        self.schema.validate(&self.path, record.attributes)?;

        let row = self.schema.row(record.attributes);
        writer
            .write_record(&row)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| CrawlerError::sink_write(self.path.display(), e.to_string()))?;

        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            let file = writer
                .into_inner()
                .map_err(|e| CrawlerError::sink_write(self.path.display(), e.to_string()))?;
            file.sync_all()?;
            tracing::debug!("Closed {} after {} records", self.path.display(), self.written);
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

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::fs;
    use tempfile::TempDir;

    fn record(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("filename", name);
        record.insert("filepath", format!("/data/{}", name));
        record.insert("guid", "9f1c");
        record.insert("cols", "10");
        record.insert("bogus", "dropped");
        record
    }

    fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_rows_are_readable_before_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, FieldSchema::standard(), true).unwrap();

        sink.write_record(SinkRecord::attributes(&record("a.asc"))).unwrap();
        sink.write_record(SinkRecord::attributes(&record("b, \"quoted\".asc"))).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "b, \"quoted\".asc");
        assert_eq!(sink.records_written(), 2);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("filename,filepath,filelist,guid"));
        assert!(!content.contains("dropped"));
    }

    #[test]
    fn test_invalid_record_is_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, FieldSchema::standard(), true).unwrap();

        let mut bad = record("a.asc");
        bad.remove("filepath");
        let error = sink.write_record(SinkRecord::attributes(&bad)).unwrap_err();
        assert!(matches!(error, CrawlerError::SinkWrite { .. }));

        sink.close().unwrap();
        assert_eq!(read_rows(&path).len(), 0);
    }

    #[test]
    fn test_write_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path, FieldSchema::standard(), true).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        assert!(sink.write_record(SinkRecord::attributes(&record("a.asc"))).is_err());
    }

    #[test]
    fn test_open_replaces_previous_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        fs::write(&path, "stale\n").unwrap();

        let sink = CsvSink::open(&path, FieldSchema::standard(), true).unwrap();
        drop(sink);

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
    }
}
