use crate::config::{Config, CrawlMode, RunParameters};
use crate::error::{CrawlerError, Result, UserFriendlyError};
use crate::formats::Handler;
use crate::paths::PathNormalizer;
use crate::pipeline::progress::{CrawlProgress, CrawlReport, ProgressReporter, RunOutcome};
use crate::record::{DiscoveredItem, ErrorRecord, Extent, FileInfo, Record, Stage};
use crate::scanner::{Crawl, DatasetScanner};
use crate::sinks::{CsvSink, FieldSchema, GeoJsonSink, OutputSink, SinkRecord};
use crate::ui::GracefulShutdown;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Enumerating,
    Extracting,
    Writing,
    Draining,
    Done,
}

/// Turns failed stages into [`ErrorRecord`]s, reporting each as it happens.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    records: Vec<ErrorRecord>,
}

impl ErrorCollector {
    pub fn capture<T>(
        &mut self,
        reporter: &dyn ProgressReporter,
        path: &Path,
        stage: Stage,
        result: Result<T>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(reporter, ErrorRecord::new(path.to_path_buf(), stage, &error));
                None
            }
        }
    }

    pub fn push(&mut self, reporter: &dyn ProgressReporter, record: ErrorRecord) {
        reporter.error(&record.summary_line(), &record.detail);
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn drain(&mut self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Result of extracting one item, ready for the sinks.
struct ItemOutput {
    record: Record,
    extent: Option<Extent>,
}

/// Drives one crawl from enumeration to the final summary.
pub struct PipelineDriver<'a> {
    config: &'a Config,
    params: &'a RunParameters,
    reporter: &'a dyn ProgressReporter,
    shutdown: &'a GracefulShutdown,
    normalizer: PathNormalizer,
    errors: ErrorCollector,
    state: PipelineState,
    unrecognized: usize,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(
        config: &'a Config,
        params: &'a RunParameters,
        reporter: &'a dyn ProgressReporter,
        shutdown: &'a GracefulShutdown,
    ) -> Self {
        Self {
            config,
            params,
            reporter,
            shutdown,
            normalizer: PathNormalizer::new(config.paths.substitutions.clone()),
            errors: ErrorCollector::default(),
            state: PipelineState::Idle,
            unrecognized: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::trace!("Pipeline state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Run the whole crawl: prepare outputs, enumerate, extract, summarize.
    ///
    /// Only failures that leave no usable output (an invalid configuration,
    /// an unusable root, or a destination that cannot be prepared) are
    /// returned as errors; every other failure ends up in
    /// [`CrawlReport::errors`].
    pub fn run(mut self) -> Result<CrawlReport> {
        self.config.validate()?;
        let scanner = DatasetScanner::new(&self.config.scan)?;

        let params = self.params;
        let root = &params.root;
        if !root.is_dir() {
            let error = CrawlerError::InvalidPath {
                path: format!("{} is not a readable directory", root.display()),
            };
            self.reporter.error(&error.user_message(), &error.detail());
            return Err(error);
        }

        let overwrite = self.config.output.overwrite;
        let mut tabular = self.open_sink(|| {
            CsvSink::open(&params.tabular_path, FieldSchema::standard(), overwrite)
        })?;
        let mut geometry = self.open_sink(|| {
            GeoJsonSink::open(&params.geometry_path, FieldSchema::standard(), overwrite)
        })?;

        self.transition(PipelineState::Enumerating);
        self.reporter.info("Searching for files...");
        let crawl = scanner.scan(root).map_err(|error| {
            self.reporter.error(&error.user_message(), &error.detail());
            error
        })?;
        self.reporter.info(&format!("Found {} files...", crawl.total()));

        Ok(self.process(crawl, &mut tabular, &mut geometry))
    }

    fn open_sink<S, F>(&self, open: F) -> Result<S>
    where
        F: FnOnce() -> Result<S>,
    {
        open().map_err(|error| {
            self.reporter.error(&error.user_message(), &error.detail());
            self.reporter.info("Aborted: could not prepare output");
            error
        })
    }

    /// Extract every item of `crawl` into the two sinks, then close them.
    pub fn process(
        mut self,
        mut crawl: Crawl,
        tabular: &mut dyn OutputSink,
        geometry: &mut dyn OutputSink,
    ) -> CrawlReport {
        let reporter = self.reporter;
        let mut progress = CrawlProgress::new(crawl.total());
        let skipped = crawl.statistics().skipped;

        for record in crawl.take_errors() {
            self.errors.push(reporter, record);
        }

        let mut cancelled = false;
        while let Some(item) = crawl.next() {
            if !self.shutdown.is_running() {
                cancelled = true;
                break;
            }

            self.transition(PipelineState::Extracting);
            self.process_item(&item, crawl.remaining(), progress.total_items, tabular, geometry);

            progress.finish_item();
            reporter.update_progress(progress.items_processed as u64, progress.total_items as u64);
        }

        self.transition(PipelineState::Draining);
        self.close_sink(tabular, Stage::TabularWrite);
        self.close_sink(geometry, Stage::GeometryWrite);

        let errors = self.errors.drain();
        if !errors.is_empty() {
            reporter.info(&format!("{} errors were encountered:", errors.len()));
            for record in &errors {
                reporter.error(&record.summary_line(), &record.detail);
            }
        }

        let outcome = if progress.total_items == 0 {
            reporter.update_progress(1, 1);
            RunOutcome::NoDataFound
        } else if cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Complete
        };
        reporter.info(outcome.message());
        reporter.debug(&format!("Elapsed time: {:.2?}", progress.elapsed()));

        self.transition(PipelineState::Done);

        CrawlReport {
            total: progress.total_items,
            processed: progress.items_processed,
            tabular_records: tabular.records_written(),
            geometry_records: geometry.records_written(),
            unrecognized: self.unrecognized,
            skipped,
            errors,
            outcome,
            elapsed: progress.elapsed(),
        }
    }

    fn process_item(
        &mut self,
        item: &DiscoveredItem,
        remaining: usize,
        total: usize,
        tabular: &mut dyn OutputSink,
        geometry: &mut dyn OutputSink,
    ) {
        let reporter = self.reporter;
        let handler = Handler::for_format(item.format);

        reporter.debug(&format!("Attempting to open {}", item.display_path()));
        let basic_info = handler.basic_info(item, &self.normalizer);
        let Some(info) = self.errors.capture(reporter, &item.path, Stage::BasicInfo, basic_info) else {
            return;
        };

        let output = if self.params.mode == CrawlMode::Walk || handler.is_basic_only() {
            if handler.is_basic_only() {
                self.unrecognized += 1;
                reporter.info(&format!(
                    "No handler for {}, recording file info only",
                    item.display_path()
                ));
            }
            reporter.info(&format!(
                "Extracted file info from {}, {} of {} files remaining",
                item.display_path(),
                remaining,
                total
            ));
            ItemOutput {
                record: info.to_record(),
                extent: None,
            }
        } else {
            let output = self.extract(&handler, item, &info);
            reporter.info(&format!(
                "Extracted metadata from {}, {} of {} files remaining",
                item.display_path(),
                remaining,
                total
            ));
            output
        };

        self.transition(PipelineState::Writing);
        let written = tabular.write_record(SinkRecord::attributes(&output.record));
        self.errors.capture(reporter, &item.path, Stage::TabularWrite, written);

        if let Some(extent) = &output.extent {
            let mut attributes = output.record.clone();
            attributes.fill_missing(&extent.attributes);
            let written = geometry.write_record(SinkRecord::with_geometry(&attributes, &extent.geometry));
            self.errors.capture(reporter, &item.path, Stage::GeometryWrite, written);
        }
    }

    /// Metadata, extent and overviews, each stage isolated from the others.
    fn extract(&mut self, handler: &Handler, item: &DiscoveredItem, info: &FileInfo) -> ItemOutput {
        let reporter = self.reporter;

        let metadata = handler.metadata(item);
        let mut metadata = self.errors.capture(reporter, &item.path, Stage::Metadata, metadata);

        let extent = handler.extent(item);
        let extent = self.errors.capture(reporter, &item.path, Stage::Extent, extent);

        if self.params.overviews {
            if let Some(metadata) = metadata.as_mut() {
                let overviews = self.generate_overviews(handler, item, info);
                if let Some(fields) = self.errors.capture(reporter, &item.path, Stage::Overview, overviews) {
                    metadata.merge(&fields);
                    reporter.info(&format!("Generated overviews from {}", item.display_path()));
                }
            }
        }

        let mut record = metadata.unwrap_or_default();
        record.merge(&info.to_record());
        if let Some(extent) = &extent {
            record.fill_missing(&extent.attributes);
        }

        ItemOutput { record, extent }
    }

    /// Quicklook and thumbnail beside the tabular output. Both or neither.
    fn generate_overviews(&self, handler: &Handler, item: &DiscoveredItem, info: &FileInfo) -> Result<Record> {
        let quicklook = self.overview_path(info, "qlk");
        let thumbnail = self.overview_path(info, "thm");

        handler.overview(item, &quicklook, self.config.overviews.quicklook_width)?;
        if let Err(error) = handler.overview(item, &thumbnail, self.config.overviews.thumbnail_width) {
            if let Err(e) = std::fs::remove_file(&quicklook) {
                tracing::debug!("Could not remove orphaned {}: {}", quicklook.display(), e);
            }
            return Err(error);
        }

        let mut fields = Record::new();
        fields.insert("quicklook", self.normalizer.normalize(&quicklook));
        fields.insert("thumbnail", self.normalizer.normalize(&thumbnail));
        Ok(fields)
    }

    fn overview_path(&self, info: &FileInfo, kind: &str) -> PathBuf {
        let dir = self
            .params
            .tabular_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        dir.join(format!("{}.{}.{}.jpg", info.filename, info.guid, kind))
    }

    fn close_sink(&mut self, sink: &mut dyn OutputSink, stage: Stage) {
        let path = sink.path().to_path_buf();
        let closed = sink.close();
        self.errors.capture(self.reporter, &path, stage, closed);
    }
}
