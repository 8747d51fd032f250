pub mod dataset_scanner;
pub mod file_filter;

pub use dataset_scanner::{Crawl, DatasetScanner, ScanStatistics};
pub use file_filter::FileFilter;
