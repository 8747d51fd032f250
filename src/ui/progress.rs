use crate::pipeline::ProgressReporter;
use crate::ui::output::OutputFormatter;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

#[derive(Clone)]
pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_file_progress(&self, total_files: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(total_files));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} files {msg}"
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        );
        pb.set_message("Searching for files...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.enabled {
            self.multi_progress.suspend(f)
        } else {
            f()
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

/// The command-line [`ProgressReporter`]: every event goes to the log file
/// through `tracing`, and to the terminal above a single progress bar.
pub struct ConsoleReporter {
    formatter: OutputFormatter,
    progress: ProgressManager,
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(formatter: OutputFormatter, progress: ProgressManager) -> Self {
        let bar = progress.create_file_progress(0);
        Self {
            formatter,
            progress,
            bar,
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.progress.clear();
    }
}

impl ProgressReporter for ConsoleReporter {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
        self.progress.suspend(|| self.formatter.info(message));
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
        self.progress.suspend(|| self.formatter.debug(message));
    }

    fn error(&self, message: &str, detail: &str) {
        tracing::error!("{}", message);
        tracing::debug!("{}", detail);
        self.progress.suspend(|| {
            self.formatter.error(message);
            self.formatter.debug(detail);
        });
    }

    fn update_progress(&self, current: u64, max: u64) {
        if self.bar.length() != Some(max) {
            self.bar.set_length(max);
        }
        self.bar.set_position(current);
        self.bar.set_message(format!("{:.0}%", percent(current, max)));
    }
}

fn percent(current: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        current as f64 * 100.0 / max as f64
    }
}
