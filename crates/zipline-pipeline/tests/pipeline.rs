use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tokio::io::AsyncReadExt;
use zipline_config::PipelineConfig;
use zipline_core::{FileAttributes, FsPath, Subject};
use zipline_pipeline::{ArchiveError, ArchiveService, PROBLEMS_MANIFEST_NAME, ProblemStage};
use zipline_telemetry::Metrics;
use zipline_test_support::fixtures::{fast_limits, flat_tree, nested_tree};
use zipline_test_support::{
    EntryTimes, FailingSink, MemoryTree, SharedBuffer, StartFailure, TransferLog, read_zip,
};

struct Harness {
    service: ArchiveService,
    log: TransferLog,
    metrics: Metrics,
}

fn harness(tree: MemoryTree, limits: PipelineConfig) -> Result<Harness> {
    let (namespace, transfers) = tree.build();
    let log = transfers.log();
    let metrics = Metrics::new()?;
    let service = ArchiveService::new(namespace, transfers, limits, metrics.clone());
    Ok(Harness {
        service,
        log,
        metrics,
    })
}

fn path(value: &str) -> Result<FsPath> {
    Ok(FsPath::parse(value)?)
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn names(bytes: &[u8]) -> Result<Vec<String>> {
    Ok(read_zip(bytes)?.into_iter().map(|entry| entry.name).collect())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_directory_archives_in_discovery_order() -> Result<()> {
    let harness = harness(nested_tree()?, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 2);
    assert_eq!(summary.bytes, 30);
    assert!(summary.problems.is_empty());

    let entries = read_zip(&buffer.contents())?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "f1");
    assert_eq!(entries[0].contents, b"0123456789");
    assert_eq!(entries[1].name, "b/f2");
    assert_eq!(entries[1].contents, b"abcdefghijklmnopqrst");

    assert!(harness.log.each_released_once());
    assert_eq!(harness.log.outstanding(), 0);
    assert_eq!(harness.metrics.archive_requests("completed"), 1);
    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.active_archives, 0);
    assert_eq!(snapshot.archive_entries_total, 2);
    assert_eq!(snapshot.archive_bytes_total, 30);
    assert_eq!(harness.service.active(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn level_zero_stores_entries_uncompressed() -> Result<()> {
    let limits = PipelineConfig {
        compression_level: 0,
        ..fast_limits()
    };
    let harness = harness(nested_tree()?, limits)?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 2);
    let bytes = buffer.contents();
    assert!(bytes.windows(20).any(|window| window == b"abcdefghijklmnopqrst"));
    let entries = read_zip(&bytes)?;
    assert_eq!(entries[0].contents, b"0123456789");
    assert_eq!(entries[1].contents, b"abcdefghijklmnopqrst");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn entries_carry_extended_timestamps() -> Result<()> {
    let mut attributes = FileAttributes::regular(5).with_mode(0o644).with_owner(0, 0);
    attributes.modification_time = Utc.timestamp_opt(1_700_000_000, 0).single();
    attributes.access_time = Utc.timestamp_opt(1_700_000_500, 0).single();
    attributes.creation_time = Utc.timestamp_opt(1_600_000_000, 0).single();
    let tree = MemoryTree::new()
        .dir("/t")?
        .entry("/t/stamped", attributes, "hello")?
        .file("/t/plain", "x")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    harness
        .service
        .export(Subject::root(), path("/t")?, true, buffer.clone())
        .await?;

    let entries = read_zip(&buffer.contents())?;
    assert_eq!(entries[0].name, "stamped");
    assert_eq!(
        entries[0].times,
        Some(EntryTimes {
            modified: Some(1_700_000_000),
            accessed: Some(1_700_000_500),
            created: Some(1_600_000_000),
        })
    );
    assert_eq!(entries[1].name, "plain");
    assert_eq!(entries[1].times, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_recursive_archive_skips_subdirectories() -> Result<()> {
    let harness = harness(nested_tree()?, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, false, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 1);
    assert_eq!(names(&buffer.contents())?, ["f1"]);
    assert_eq!(harness.log.releases("/a/b/f2"), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn breadth_first_order_across_levels() -> Result<()> {
    let tree = MemoryTree::new()
        .dir("/r")?
        .dir("/r/x")?
        .file("/r/x/deep", "1")?
        .file("/r/top", "2")?
        .dir("/r/y")?
        .file("/r/y/other", "3")?
        .file("/r/x/z/deeper", "4")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    harness
        .service
        .export(Subject::root(), path("/r")?, true, buffer.clone())
        .await?;

    assert_eq!(
        names(&buffer.contents())?,
        ["top", "x/deep", "y/other", "x/z/deeper"]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outstanding_transfers_stay_bounded() -> Result<()> {
    let limits = PipelineConfig {
        transfer_queue_capacity: 2,
        ..fast_limits()
    };
    let harness = harness(flat_tree(60)?, limits)?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/flat")?, true, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 60);
    let expected: Vec<String> = (0..60).map(|index| format!("f{index:03}")).collect();
    assert_eq!(names(&buffer.contents())?, expected);
    // Queue capacity plus the one being written and the one being started.
    assert!(harness.log.max_outstanding() <= 4);
    assert!(harness.log.each_released_once());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scanner_suspends_on_a_full_file_queue() -> Result<()> {
    let limits = PipelineConfig {
        file_queue_capacity: 4,
        ..fast_limits()
    };
    let tree = flat_tree(50)?.hang_read("/flat/f000")?;
    let harness = harness(tree, limits)?;

    let download = harness.service.open(Subject::root(), path("/flat")?, true).await?;
    let (_body, request, completion) = download.into_parts();
    assert!(eventually(|| request.files().len() == 4).await);

    // The writer is stuck on the first entry; discovery must stay parked.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(request.files().len(), 4);
    assert!(request.files().high_water() <= 4);
    assert!(!request.files().is_closed());
    assert!(harness.log.started().len() < 10);

    harness.service.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), completion).await?;
    assert!(matches!(result, Err(ArchiveError::Cancelled)));
    assert!(request.files().high_water() <= 4);
    let log = harness.log.clone();
    assert!(eventually(|| log.outstanding() == 0).await);
    assert!(log.each_released_once());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_start_skips_only_that_file() -> Result<()> {
    let tree = flat_tree(100)?.fail_start("/flat/f042", StartFailure::Other)?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/flat")?, true, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 99);
    assert_eq!(summary.problems.len(), 1);
    assert_eq!(summary.problems[0].stage, ProblemStage::Transfer);
    assert_eq!(summary.problems[0].path.as_str(), "/flat/f042");
    let entries = names(&buffer.contents())?;
    assert!(!entries.iter().any(|name| name == "f042"));
    assert_eq!(harness.metrics.transfer_start_failures("other"), 1);
    assert_eq!(harness.metrics.problems("transfer"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_failure_skips_the_subtree() -> Result<()> {
    let tree = nested_tree()?.fail_listing("/a/b")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(names(&buffer.contents())?, ["f1"]);
    assert_eq!(summary.problems.len(), 1);
    assert_eq!(summary.problems[0].stage, ProblemStage::Listing);
    assert_eq!(summary.problems[0].path.as_str(), "/a/b");
    assert_eq!(harness.metrics.problems("listing"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_mover_is_killed_and_skipped() -> Result<()> {
    let tree = nested_tree()?.stall("/a/f1")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(names(&buffer.contents())?, ["b/f2"]);
    assert_eq!(summary.problems.len(), 1);
    assert_eq!(summary.problems[0].path.as_str(), "/a/f1");
    assert_eq!(harness.metrics.transfer_start_failures("timeout"), 1);

    let log = harness.log.clone();
    assert!(eventually(|| log.kills("/a/f1") == 1 && log.releases("/a/f1") == 1).await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn links_and_special_entries_are_ignored() -> Result<()> {
    let tree = nested_tree()?.symlink("/a/link")?.special("/a/fifo")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(names(&buffer.contents())?, ["f1", "b/f2"]);
    assert!(summary.problems.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_entries_are_skipped_silently() -> Result<()> {
    let tree = nested_tree()?
        .entry(
            "/a/secret",
            FileAttributes::regular(3).with_mode(0o600).with_owner(0, 0),
            "abc",
        )?
        .entry(
            "/a/locked",
            FileAttributes::directory().with_mode(0o700).with_owner(0, 0),
            Vec::new(),
        )?
        .file("/a/locked/inner", "x")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::nobody(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(names(&buffer.contents())?, ["f1", "b/f2"]);
    assert!(summary.problems.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_roots_are_rejected() -> Result<()> {
    let harness = harness(nested_tree()?, fast_limits())?;

    let missing = harness
        .service
        .export(Subject::root(), path("/missing")?, true, SharedBuffer::new())
        .await;
    assert!(matches!(missing, Err(ArchiveError::NotFound { .. })));

    let file = harness
        .service
        .export(Subject::root(), path("/a/f1")?, true, SharedBuffer::new())
        .await;
    assert!(matches!(file, Err(ArchiveError::NotADirectory { .. })));

    assert!(harness.log.started().is_empty());
    assert_eq!(harness.metrics.archive_requests("failed"), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn problems_manifest_trails_the_archive() -> Result<()> {
    let limits = PipelineConfig {
        problems_manifest: true,
        ..fast_limits()
    };
    let tree = nested_tree()?.fail_start("/a/f1", StartFailure::Locked)?;
    let harness = harness(tree, limits)?;
    let buffer = SharedBuffer::new();

    let summary = harness
        .service
        .export(Subject::root(), path("/a")?, true, buffer.clone())
        .await?;

    assert_eq!(summary.entries, 1);
    let entries = read_zip(&buffer.contents())?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "b/f2");
    assert_eq!(entries[1].name, PROBLEMS_MANIFEST_NAME);
    let manifest = String::from_utf8(entries[1].contents.clone())?;
    assert!(manifest.starts_with("transfer /a/f1: "));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_relay_aborts_and_releases_everything() -> Result<()> {
    let tree = flat_tree(10)?.break_read("/flat/f003")?;
    let harness = harness(tree, fast_limits())?;
    let buffer = SharedBuffer::new();

    let result = harness
        .service
        .export(Subject::root(), path("/flat")?, true, buffer.clone())
        .await;

    assert!(matches!(result, Err(ArchiveError::Relay { .. })));
    assert!(read_zip(&buffer.contents()).is_err());
    let log = harness.log.clone();
    assert!(eventually(|| log.outstanding() == 0).await);
    assert!(log.each_released_once());
    assert_eq!(harness.metrics.archive_requests("failed"), 1);
    assert_eq!(harness.metrics.problems("relay"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sink_failure_cancels_the_request() -> Result<()> {
    let harness = harness(flat_tree(40)?, fast_limits())?;

    let result = harness
        .service
        .export(Subject::root(), path("/flat")?, true, FailingSink::after(128))
        .await;

    assert!(matches!(result, Err(ArchiveError::Io { .. } | ArchiveError::Zip { .. })));
    let log = harness.log.clone();
    assert!(eventually(|| log.outstanding() == 0).await);
    assert!(log.started().len() < 40);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_streams_the_archive_body() -> Result<()> {
    let harness = harness(nested_tree()?, fast_limits())?;

    let download = harness.service.open(Subject::root(), path("/a")?, true).await?;
    let (mut body, request, completion) = download.into_parts();
    let mut bytes = Vec::new();
    body.read_to_end(&mut bytes).await?;
    let summary = completion.await?;

    assert_eq!(summary.entries, 2);
    assert_eq!(names(&bytes)?, ["f1", "b/f2"]);
    assert!(!request.is_cancelled());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_body_cancels_the_request() -> Result<()> {
    let limits = PipelineConfig {
        stream_buffer_bytes: 64,
        ..fast_limits()
    };
    let harness = harness(flat_tree(50)?, limits)?;

    let download = harness.service.open(Subject::root(), path("/flat")?, true).await?;
    let (body, request, completion) = download.into_parts();
    drop(body);

    assert!(completion.await.is_err());
    assert!(request.is_cancelled());
    let log = harness.log.clone();
    assert!(eventually(|| log.outstanding() == 0).await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_a_hung_archive() -> Result<()> {
    let tree = nested_tree()?.hang_read("/a/f1")?;
    let harness = harness(tree, fast_limits())?;

    let download = harness.service.open(Subject::root(), path("/a")?, true).await?;
    let (_body, _request, completion) = download.into_parts();
    let log = harness.log.clone();
    assert!(eventually(|| !log.started().is_empty()).await);

    harness.service.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), completion).await?;
    assert!(matches!(result, Err(ArchiveError::Cancelled)));
    assert!(eventually(|| log.outstanding() == 0).await);
    assert_eq!(harness.metrics.archive_requests("cancelled"), 1);
    assert_eq!(harness.metrics.snapshot().active_archives, 0);
    Ok(())
}
