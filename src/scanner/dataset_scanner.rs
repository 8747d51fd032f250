use crate::config::ScanConfig;
use crate::error::{CrawlerError, Result};
use crate::formats::{Handler, SiblingIndex};
use crate::record::{DiscoveredItem, ErrorRecord, FormatTag, Stage};
use crate::scanner::file_filter::FileFilter;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

pub struct DatasetScanner {
    filter: FileFilter,
    max_depth: usize,
    follow_links: bool,
    include_unrecognized: bool,
}

struct FoundFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl DatasetScanner {
    /// Fails when an exclude pattern is not a valid regular expression.
    pub fn new(config: &ScanConfig) -> Result<Self> {
        Ok(Self {
            filter: FileFilter::new(config)?,
            max_depth: config.max_depth,
            follow_links: config.follow_links,
            include_unrecognized: config.include_unrecognized,
        })
    }

    /// Enumerate every dataset below `root`.
    ///
    /// Only an unusable root fails the call; unreadable entries below it
    /// become [`ErrorRecord`]s on the returned [`Crawl`].
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<Crawl> {
        let root_path = root.as_ref();

        if !root_path.exists() {
            return Err(CrawlerError::InvalidPath {
                path: root_path.display().to_string(),
            });
        }

        if !root_path.is_dir() {
            return Err(CrawlerError::InvalidPath {
                path: format!("{} is not a directory", root_path.display()),
            });
        }

        let mut by_directory: BTreeMap<PathBuf, Vec<FoundFile>> = BTreeMap::new();
        let mut errors = Vec::new();

        let walker = WalkDir::new(root_path)
            .max_depth(self.max_depth)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|e| self.should_traverse(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root_path.to_path_buf());
                    tracing::warn!("Skipping unreadable entry {}: {}", path.display(), err);
                    errors.push(enumeration_error(path, err.to_string()));
                    continue;
                }
            };

            if !entry.file_type().is_file() || self.filter.is_excluded_file(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    let path = entry.into_path();
                    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    by_directory.entry(parent).or_default().push(FoundFile {
                        path,
                        size: metadata.len(),
                        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    });
                }
                Err(err) => {
                    errors.push(enumeration_error(entry.path().to_path_buf(), err.to_string()));
                }
            }
        }

        let mut items = Vec::new();
        let mut statistics = ScanStatistics::default();

        for files in by_directory.values() {
            self.classify_directory(files, &mut items, &mut statistics);
        }

        items.sort_by(|a, b| a.path.cmp(&b.path));
        statistics.datasets = items.len();

        tracing::debug!(
            "Scan of {} found {} datasets, {} sidecars, {} skipped, {} errors",
            root_path.display(),
            statistics.datasets,
            statistics.sidecars,
            statistics.skipped,
            errors.len()
        );

        Ok(Crawl::new(items, errors, statistics))
    }

    /// Turn one directory's files into items, letting primaries claim sidecars.
    fn classify_directory(
        &self,
        files: &[FoundFile],
        items: &mut Vec<DiscoveredItem>,
        statistics: &mut ScanStatistics,
    ) {
        let index = SiblingIndex::from_paths(files.iter().map(|f| &f.path));

        let recognized: Vec<(&FoundFile, FormatTag)> = files
            .iter()
            .filter_map(|f| self.filter.recognized_format(&f.path).map(|format| (f, format)))
            .collect();

        let primaries: HashSet<&Path> = recognized.iter().map(|(f, _)| f.path.as_path()).collect();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for (file, format) in &recognized {
            for sidecar in Handler::for_format(*format).sidecars(&file.path, &index) {
                // A primary dataset is never swallowed as another's sidecar.
                if !primaries.contains(sidecar.as_path()) {
                    claimed.insert(sidecar);
                }
            }
        }
        statistics.sidecars += claimed.len();

        for (file, format) in &recognized {
            items.push(DiscoveredItem::new(file.path.clone(), *format, file.size, file.modified));
        }

        for file in files {
            if primaries.contains(file.path.as_path()) || claimed.contains(&file.path) {
                continue;
            }
            if self.include_unrecognized {
                statistics.unrecognized += 1;
                items.push(DiscoveredItem::new(
                    file.path.clone(),
                    FormatTag::Unrecognized,
                    file.size,
                    file.modified,
                ));
            } else {
                statistics.skipped += 1;
            }
        }
    }

    fn should_traverse(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        self.filter.should_traverse_directory(entry.path())
    }
}

fn enumeration_error(path: PathBuf, message: String) -> ErrorRecord {
    let error = CrawlerError::Enumeration {
        path: path.display().to_string(),
        message,
    };
    ErrorRecord::new(path, Stage::Enumerate, &error)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStatistics {
    pub datasets: usize,
    pub sidecars: usize,
    pub unrecognized: usize,
    pub skipped: usize,
}

/// The result of enumeration: a known-length, ordered, single-pass sequence.
pub struct Crawl {
    total: usize,
    items: std::vec::IntoIter<DiscoveredItem>,
    errors: Vec<ErrorRecord>,
    statistics: ScanStatistics,
}

impl Crawl {
    pub fn new(items: Vec<DiscoveredItem>, errors: Vec<ErrorRecord>, statistics: ScanStatistics) -> Self {
        Self {
            total: items.len(),
            items: items.into_iter(),
            errors,
            statistics,
        }
    }

    /// A crawl over a fixed item list.
    pub fn from_items(items: Vec<DiscoveredItem>) -> Self {
        let statistics = ScanStatistics {
            datasets: items.len(),
            ..ScanStatistics::default()
        };
        Self::new(items, Vec::new(), statistics)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Enumeration errors, handed out once.
    pub fn take_errors(&mut self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.errors)
    }

    pub fn statistics(&self) -> &ScanStatistics {
        &self.statistics
    }
}

impl Iterator for Crawl {
    type Item = DiscoveredItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for Crawl {}
