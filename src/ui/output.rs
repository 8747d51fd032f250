use crate::error::{CrawlerError, UserFriendlyError};
use crate::pipeline::{CrawlReport, RunOutcome};
use console::{style, Emoji, Term};
use serde_json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static GLOBE: Emoji = Emoji("🌍 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

#[derive(Debug, Clone)]
pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    // Core messaging methods
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", GLOBE, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    // User-friendly error handling
    pub fn print_user_friendly_error(&self, error: &CrawlerError) {
        let user_message = error.user_message();
        self.error(&user_message);
        self.print_suggestion(error);
    }

    /// Only the suggestion, for errors whose message was already shown.
    pub fn print_suggestion(&self, error: &CrawlerError) {
        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// Final summary of a run. JSON mode prints it even when quiet so that
    /// scripts always get a result object.
    pub fn print_crawl_report(&self, report: &CrawlReport) {
        match self.mode {
            OutputMode::Human => {
                if !self.quiet {
                    self.print_human_report(report);
                }
            }
            OutputMode::Json => {
                let mut value = serde_json::to_value(report).unwrap_or_else(|_| serde_json::json!({}));
                if let Some(object) = value.as_object_mut() {
                    object.insert("type".to_string(), serde_json::json!("report"));
                    object.insert("elapsed_ms".to_string(), serde_json::json!(report.elapsed.as_millis() as u64));
                    object.insert(
                        "timestamp".to_string(),
                        serde_json::json!(chrono::Utc::now().to_rfc3339()),
                    );
                }
                self.print_json_object(&value);
            }
            OutputMode::Plain => {
                if !self.quiet {
                    self.print_plain_report(report);
                }
            }
        }
    }

    // Specialized output methods
    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    // Private helper methods
    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn highlight(&self, value: impl ToString) -> String {
        if self.use_colors {
            style(value.to_string()).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_report(&self, report: &CrawlReport) {
        println!();
        self.print_separator();

        let headline = report.outcome.message();
        match (report.outcome, self.use_colors) {
            (RunOutcome::Complete, true) => {
                println!("{} {}", style(headline).green().bold(), CHECKMARK)
            }
            (_, true) => println!("{}", style(headline).yellow().bold()),
            (RunOutcome::Complete, false) => println!("✓ {}", headline),
            (_, false) => println!("! {}", headline),
        }

        println!();
        println!("  Files found:       {}", self.highlight(report.total));
        println!("  Files processed:   {}", self.highlight(report.processed));
        println!("  Table rows:        {}", self.highlight(report.tabular_records));
        println!("  Features:          {}", self.highlight(report.geometry_records));
        if report.unrecognized > 0 {
            println!("  Unrecognized:      {}", report.unrecognized);
        }
        if report.skipped > 0 {
            println!("  Skipped:           {}", report.skipped);
        }
        println!("  Time taken:        {}", self.highlight(format_duration(report.elapsed)));

        if report.has_errors() {
            println!();
            println!("Issues encountered ({}):", report.errors.len());
            for error in &report.errors {
                println!("  - {}", error.summary_line());
            }
        }

        self.print_separator();
    }

    fn print_plain_report(&self, report: &CrawlReport) {
        println!("COMPLETED: {}", report.outcome.message());
        println!("Files found: {}", report.total);
        println!("Files processed: {}", report.processed);
        println!("Table rows: {}", report.tabular_records);
        println!("Features: {}", report.geometry_records);
        println!("Duration: {:?}", report.elapsed);

        if report.has_errors() {
            println!("Errors: {}", report.errors.len());
            for error in &report.errors {
                println!("ERROR: {}", error.summary_line());
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}
