use clap::Parser;
use metacrawler::{
    logging, Cli, CrawlReport, CrawlerError, MetaCrawler, OutputFormatter, OutputMode, RunOutcome,
    UserFriendlyError,
};
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let crawler = match MetaCrawler::from_cli(&cli) {
        Ok(crawler) => crawler,
        Err(e) => {
            print_startup_error(&e);
            return 1;
        }
    };

    if cli.dry_run {
        return handle_dry_run(&crawler);
    }

    let params = crawler.params();
    if let Err(e) = logging::init_logging(&params.log_path, params.debug) {
        crawler.output_formatter().error(&format!("{:#}", e));
        return 1;
    }

    match crawler.crawl().await {
        Ok(report) => {
            crawler.output_formatter().print_crawl_report(&report);
            report_exit_code(&report)
        }
        Err(e) if e.is_fatal() => {
            crawler.output_formatter().print_suggestion(&e);
            error_exit_code(&e)
        }
        Err(e) => {
            tracing::error!("{}", e);
            crawler.handle_error(&e);
            error_exit_code(&e)
        }
    }
}

/// 2 is left to clap for usage errors.
const EXIT_ITEM_ERRORS: i32 = 4;

fn report_exit_code(report: &CrawlReport) -> i32 {
    match report.outcome {
        RunOutcome::Cancelled => 130,
        _ if report.has_errors() => EXIT_ITEM_ERRORS,
        _ => 0,
    }
}

fn error_exit_code(error: &CrawlerError) -> i32 {
    match error {
        CrawlerError::SinkOpen { .. } => 3,
        CrawlerError::Cancelled => 130,
        _ => 1,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "metacrawler.toml".to_string());

    match MetaCrawler::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  metacrawler -d <dir> -x <table> -s <features> -l <log> --config {}", config_path);
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(crawler: &MetaCrawler) -> i32 {
    let formatter = crawler.output_formatter();
    let params = crawler.params();
    let config = crawler.config();

    formatter.info("DRY RUN MODE - Nothing will be written");
    formatter.print_separator();

    if params.root.is_dir() {
        formatter.success(&format!("Directory to crawl: {}", params.root.display()));
    } else {
        formatter.error(&format!("Not a readable directory: {}", params.root.display()));
        return 1;
    }

    formatter.info("Configuration that would be used:");
    println!("  Formats: {}", config.scan.formats.join(", "));
    println!("  Exclude directories: {}", config.scan.exclude_dirs.join(", "));
    println!("  Maximum depth: {}", config.scan.max_depth);
    println!("  Include unrecognized files: {}", config.scan.include_unrecognized);
    println!("  Overwrite outputs: {}", config.output.overwrite);
    for substitution in &config.paths.substitutions {
        println!("  Path substitution: {} -> {}", substitution.from, substitution.to);
    }

    formatter.print_separator();

    formatter.info("Crawl plan:");
    println!("  Mode: {:?}", params.mode);
    println!("  Table: {}", params.tabular_path.display());
    println!("  Features: {}", params.geometry_path.display());
    println!("  Log: {}", params.log_path.display());
    if params.overviews {
        println!(
            "  Overviews: {}px quicklooks, {}px thumbnails",
            config.overviews.quicklook_width, config.overviews.thumbnail_width
        );
    }

    for path in [&params.tabular_path, &params.geometry_path] {
        if path.exists() {
            if config.output.overwrite {
                formatter.warning(&format!("Would replace existing {}", path.display()));
            } else {
                formatter.warning(&format!("{} exists and overwrite is disabled", path.display()));
            }
        }
    }

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    formatter.info("Run without --dry-run to perform the crawl");

    0
}

fn print_startup_error(error: &CrawlerError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
