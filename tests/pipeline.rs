mod common;

use common::*;
use metacrawler::{
    Config, Crawl, CrawlMode, CrawlerError, CsvSink, DiscoveredItem, FieldSchema, FormatTag,
    GeoJsonSink, GracefulShutdown, PipelineDriver, RunOutcome, Stage,
};
use std::fs;
use std::time::SystemTime;
use tempfile::TempDir;

#[test]
fn empty_directory_reports_no_data_found() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(data.path().join("readme.txt"), "not imagery").unwrap();

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.outcome, RunOutcome::NoDataFound);
    assert_eq!(report.total, 0);
    assert_eq!(report.skipped, 1);
    assert!(!report.has_errors());
    assert_eq!(reporter.progress(), vec![(1, 1)]);
    assert!(reporter.infos().contains(&"No data found".to_string()));

    let (header, rows) = read_table(&params.tabular_path);
    assert_eq!(header[0], "filename");
    assert!(rows.is_empty());
    assert!(read_features(&params.geometry_path).is_empty());
}

#[test]
fn unreadable_item_is_recorded_once_and_skipped() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let a = write_grid(data.path(), "a.asc");
    let b = write_grid(data.path(), "b.asc");
    let gone = data.path().join("gone.asc");

    let items = vec![
        DiscoveredItem::new(a, FormatTag::AsciiGrid, 0, SystemTime::now()),
        DiscoveredItem::new(gone.clone(), FormatTag::AsciiGrid, 0, SystemTime::now()),
        DiscoveredItem::new(b, FormatTag::AsciiGrid, 0, SystemTime::now()),
    ];

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();
    let mut tabular = CsvSink::open(&params.tabular_path, FieldSchema::standard(), true).unwrap();
    let mut geometry = GeoJsonSink::open(&params.geometry_path, FieldSchema::standard(), true).unwrap();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).process(
        Crawl::from_items(items),
        &mut tabular,
        &mut geometry,
    );

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.processed, 3);
    assert_eq!(report.tabular_records, 2);
    assert_eq!(report.geometry_records, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, gone);
    assert_eq!(report.errors[0].stage, Stage::BasicInfo);

    let (header, rows) = read_table(&params.tabular_path);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| column(&header, row, "filename") != "gone.asc"));
    assert_eq!(read_features(&params.geometry_path).len(), 2);
    assert!(reporter.infos().contains(&"1 errors were encountered:".to_string()));
}

#[test]
fn crawl_mode_writes_metadata_and_extents() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");
    fs::write(data.path().join("dem.prj"), "PROJCS[\"GDA94 / MGA zone 55\"]").unwrap();
    write_envi(data.path(), "cube", 1);
    write_png(data.path(), "scene.png", true);

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.tabular_records, 3);
    assert_eq!(report.geometry_records, 3);
    assert!(!report.has_errors(), "{:?}", report.errors);

    let (header, rows) = read_table(&params.tabular_path);
    let dem = rows
        .iter()
        .find(|row| column(&header, row, "filename") == "dem.asc")
        .unwrap();
    assert_eq!(column(&header, dem, "format"), "ascii_grid");
    assert_eq!(column(&header, dem, "cols"), "3");
    assert_eq!(column(&header, dem, "ulx"), "1000");
    assert!(column(&header, dem, "srs").contains("MGA zone 55"));
    assert!(column(&header, dem, "filelist").contains("dem.prj"));

    let features = read_features(&params.geometry_path);
    assert!(features.iter().all(|f| f["geometry"]["type"] == "Polygon"));
    assert!(features.iter().any(|f| f["properties"]["filename"] == "cube.hdr"));
    assert!(reporter
        .infos()
        .iter()
        .any(|line| line.starts_with("Extracted metadata from") && line.ends_with("of 3 files remaining")));
}

#[test]
fn missing_extent_still_writes_metadata() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_png(data.path(), "plain.png", false);

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.tabular_records, 1);
    assert_eq!(report.geometry_records, 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, Stage::Extent);

    let (header, rows) = read_table(&params.tabular_path);
    assert_eq!(column(&header, &rows[0], "cols"), "10");
    assert_eq!(column(&header, &rows[0], "ulx"), "");
}

#[test]
fn walk_mode_records_file_info_only() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");
    write_envi(data.path(), "cube", 1);
    // A corrupt header cannot fail a walk.
    fs::write(data.path().join("broken.hdr"), "ENVI\nsamples = many\n").unwrap();

    let config = Config::default();
    let mut params = params(data.path(), out.path());
    params.mode = CrawlMode::Walk;
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.tabular_records, 3);
    assert_eq!(report.geometry_records, 0);
    assert!(!report.has_errors());

    let (header, rows) = read_table(&params.tabular_path);
    for row in &rows {
        assert!(!column(&header, row, "guid").is_empty());
        assert_eq!(column(&header, row, "cols"), "");
        assert_eq!(column(&header, row, "ulx"), "");
    }
    assert!(read_features(&params.geometry_path).is_empty());
    assert!(reporter.infos().iter().any(|l| l.starts_with("Extracted file info from")));
}

#[test]
fn unsupported_overview_keeps_metadata_record() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_envi(data.path(), "float", 4);

    let config = Config::default();
    let mut params = params(data.path(), out.path());
    params.overviews = true;
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.tabular_records, 1);
    assert_eq!(report.geometry_records, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, Stage::Overview);

    let (header, rows) = read_table(&params.tabular_path);
    assert_eq!(column(&header, &rows[0], "datatype"), "Float32");
    assert_eq!(column(&header, &rows[0], "quicklook"), "");
    assert_eq!(column(&header, &rows[0], "thumbnail"), "");

    let leftovers = fs::read_dir(out.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".jpg"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn overviews_are_written_beside_the_table() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");

    let config = Config::default();
    let mut params = params(data.path(), out.path());
    params.overviews = true;
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();
    assert!(!report.has_errors(), "{:?}", report.errors);

    let (header, rows) = read_table(&params.tabular_path);
    let guid = column(&header, &rows[0], "guid");
    let quicklook = column(&header, &rows[0], "quicklook");
    let thumbnail = column(&header, &rows[0], "thumbnail");

    assert!(quicklook.ends_with(&format!("dem.asc.{}.qlk.jpg", guid)));
    assert!(thumbnail.ends_with(&format!("dem.asc.{}.thm.jpg", guid)));
    assert!(out.path().join(format!("dem.asc.{}.qlk.jpg", guid)).exists());
    assert!(out.path().join(format!("dem.asc.{}.thm.jpg", guid)).exists());
    assert!(reporter.infos().iter().any(|l| l.starts_with("Generated overviews from")));
}

#[test]
fn progress_is_strictly_increasing_and_completes() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    for name in ["a.asc", "b.asc", "c.asc", "d.asc"] {
        write_grid(data.path(), name);
    }

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    let progress = reporter.progress();
    assert_eq!(progress.len(), 4);
    assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(progress.iter().all(|(_, max)| *max == 4));
    assert_eq!(progress.last(), Some(&(4, 4)));
}

#[test]
fn repeated_runs_produce_the_same_records() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");
    write_envi(data.path(), "cube", 1);
    write_png(data.path(), "scene.png", true);

    let config = Config::default();
    let params = params(data.path(), out.path());
    let shutdown = GracefulShutdown::detached();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let reporter = RecordingReporter::default();
        PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

        let (header, rows) = read_table(&params.tabular_path);
        let guid = header.iter().position(|h| h == "guid").unwrap();
        let mut rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|mut row| {
                row.remove(guid);
                row
            })
            .collect();
        rows.sort();
        runs.push(rows);

        fs::remove_file(&params.tabular_path).unwrap();
    }

    assert_eq!(runs[0].len(), 3);
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn cancelled_run_closes_outputs() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "a.asc");
    write_grid(data.path(), "b.asc");

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();
    shutdown.request_shutdown();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.total, 2);
    assert_eq!(report.processed, 0);

    let (header, rows) = read_table(&params.tabular_path);
    assert!(!header.is_empty());
    assert!(rows.is_empty());
    assert!(reporter.infos().contains(&"Extraction cancelled".to_string()));
}

#[test]
fn unusable_destination_aborts_before_processing() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");

    let config = Config::default();
    let params = params(data.path(), out.path());
    fs::create_dir(&params.tabular_path).unwrap();
    fs::write(params.tabular_path.join("locked"), "x").unwrap();

    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let error = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap_err();

    assert!(matches!(error, CrawlerError::SinkOpen { .. }));
    assert_eq!(reporter.errors().len(), 1);
    assert!(reporter.errors()[0].starts_with("Aborted: could not prepare output"));
    assert!(reporter.progress().is_empty());
    assert!(reporter.infos().contains(&"Aborted: could not prepare output".to_string()));
    assert!(!params.geometry_path.exists());
}

#[test]
fn unrecognized_files_are_flagged_when_included() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");
    fs::write(data.path().join("notes.txt"), "field notes").unwrap();

    let mut config = Config::default();
    config.scan.include_unrecognized = true;
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.unrecognized, 1);
    assert_eq!(report.tabular_records, 2);
    assert_eq!(report.geometry_records, 1);
    assert!(!report.has_errors());
    assert!(reporter.infos().iter().any(|l| l.starts_with("No handler for")));
}

#[test]
fn corrupt_envi_header_does_not_stop_the_batch() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "good.asc");
    write_envi(data.path(), "bad", 1);
    fs::write(
        data.path().join("bad.hdr"),
        ENVI_HEADER.replace("header offset = 0", "header offset = 18446744073709551615"),
    )
    .unwrap();

    let config = Config::default();
    let mut params = params(data.path(), out.path());
    params.overviews = true;
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Complete);
    assert_eq!(report.processed, 2);
    assert_eq!(report.tabular_records, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, Stage::Overview);
    assert!(report.errors[0].path.ends_with("bad.hdr"));
    assert_eq!(reporter.progress().last(), Some(&(2, 2)));

    let (header, rows) = read_table(&params.tabular_path);
    let good = rows
        .iter()
        .find(|row| column(&header, row, "filename") == "good.asc")
        .unwrap();
    assert!(!column(&header, good, "quicklook").is_empty());
}

#[test]
fn metadata_failure_keeps_the_feature() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_envi(data.path(), "odd", 1);
    fs::write(
        data.path().join("odd.hdr"),
        ENVI_HEADER.replace("interleave = bsq", "interleave = zigzag"),
    )
    .unwrap();

    let config = Config::default();
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, Stage::Metadata);
    assert_eq!(report.tabular_records, 1);
    assert_eq!(report.geometry_records, 1);

    let (header, rows) = read_table(&params.tabular_path);
    assert_eq!(column(&header, &rows[0], "cols"), "");
    assert_eq!(column(&header, &rows[0], "interleave"), "");
    assert_eq!(column(&header, &rows[0], "ulx"), "500000");

    let features = read_features(&params.geometry_path);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["filename"], "odd.hdr");
}

#[test]
fn non_envi_hdr_is_not_an_envi_dataset() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");
    fs::write(data.path().join("esri.hdr"), "BYTEORDER I\nLAYOUT BIL\nNROWS 2\nNCOLS 2\n").unwrap();

    let mut config = Config::default();
    config.scan.include_unrecognized = true;
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let report = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.unrecognized, 1);
    assert!(!report.has_errors(), "{:?}", report.errors);
}

#[test]
fn invalid_exclude_pattern_is_rejected_before_outputs_open() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_grid(data.path(), "dem.asc");

    let mut config = Config::default();
    config.scan.exclude_patterns.push("([unclosed".to_string());
    let params = params(data.path(), out.path());
    let reporter = RecordingReporter::default();
    let shutdown = GracefulShutdown::detached();

    let error = PipelineDriver::new(&config, &params, &reporter, &shutdown).run().unwrap_err();

    assert!(matches!(error, CrawlerError::Config { .. }));
    assert!(!params.tabular_path.exists());
    assert!(!params.geometry_path.exists());
    assert!(reporter.progress().is_empty());
}
