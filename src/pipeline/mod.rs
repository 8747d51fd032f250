//! Orchestration of a crawl: enumeration, per-item extraction, sink writes
//! and the final summary.

pub mod driver;
pub mod progress;

pub use driver::{ErrorCollector, PipelineDriver, PipelineState};
pub use progress::{CrawlProgress, CrawlReport, ProgressReporter, RunOutcome, SilentReporter};
