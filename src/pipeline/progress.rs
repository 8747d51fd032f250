use crate::record::ErrorRecord;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Receives status, errors and progress from the pipeline.
///
/// Implementations decide where things go: the terminal and log file for the
/// command line, an in-memory list in tests.
pub trait ProgressReporter {
    fn info(&self, message: &str);

    fn debug(&self, message: &str);

    /// A recoverable failure. `detail` carries the full error chain.
    fn error(&self, message: &str, detail: &str);

    /// `current` of `max` items done. Never decreases within a run.
    fn update_progress(&self, current: u64, max: u64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn info(&self, _message: &str) {}

    fn debug(&self, _message: &str) {}

    fn error(&self, _message: &str, _detail: &str) {}

    fn update_progress(&self, _current: u64, _max: u64) {}
}

#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub items_processed: usize,
    pub total_items: usize,
    pub start_time: Instant,
}

impl CrawlProgress {
    pub fn new(total_items: usize) -> Self {
        Self {
            items_processed: 0,
            total_items,
            start_time: Instant::now(),
        }
    }

    pub fn finish_item(&mut self) {
        self.items_processed = (self.items_processed + 1).min(self.total_items);
    }

    pub fn remaining(&self) -> usize {
        self.total_items - self.items_processed
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Complete,
    NoDataFound,
    Cancelled,
}

impl RunOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            RunOutcome::Complete => "Metadata extraction complete!",
            RunOutcome::NoDataFound => "No data found",
            RunOutcome::Cancelled => "Extraction cancelled",
        }
    }
}

/// What one run did, for the final summary and the exit status.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub total: usize,
    pub processed: usize,
    pub tabular_records: usize,
    pub geometry_records: usize,
    pub unrecognized: usize,
    pub skipped: usize,
    pub errors: Vec<ErrorRecord>,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
