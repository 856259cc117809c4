//! End-to-end print jobs against a mock engine pool.

mod common;

use std::time::{Duration, Instant};

use common::{REMOTE_MARKUP, config, init_logging, mock_printer, pdf_summary};
use markup2pdf::engine::mock::MockBehavior;
use markup2pdf::factory::mock::MockEngineFactory;
use markup2pdf::prelude::*;
use tokio_util::sync::CancellationToken;

fn default_config() -> PrinterConfig {
    config(2, 2, Duration::from_millis(20))
}

/// Plain markup is written directly without touching the pool.
#[tokio::test(flavor = "multi_thread")]
async fn test_direct_print_writes_single_page() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("plain.pdf");
    let (printer, probe) = mock_printer(default_config(), MockBehavior::default());

    let doc = Document::new(&dest, "<h1>Invoice</h1><p>Thank you for your order.</p>");
    let report = printer
        .print(doc, PageConfiguration::default(), Some(Duration::from_millis(500)))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::Direct);
    assert_eq!(report.destination, dest);
    let (pages, size) = pdf_summary(&dest);
    assert_eq!(pages, 1);
    assert_eq!(size, vec![595.0, 842.0]);

    assert_eq!(probe.loads(), 0);
    assert_eq!(printer.pool().stats().acquired, 0);
}

/// Markup with a remote image is loaded, measured and fitted to one page.
#[tokio::test(flavor = "multi_thread")]
async fn test_engine_print_fits_content_to_one_page() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("remote.pdf");
    let behavior = MockBehavior::default()
        .load_delay(Duration::from_millis(100))
        .content_size(ContentSize::new(800.0, 2000.0));
    let (printer, probe) = mock_printer(default_config(), behavior);

    let doc = Document::new(&dest, REMOTE_MARKUP);
    let report = printer
        .print(doc, PageConfiguration::default(), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::EngineBacked);
    assert!(report.elapsed >= Duration::from_millis(100));

    let (pages, size) = pdf_summary(&dest);
    assert_eq!(pages, 1);
    assert_eq!(size, vec![595.0, 1487.5]);

    let used = probe.last_layout().unwrap();
    assert_eq!(used.margins, Margins::zero());

    let stats = printer.pool().stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.available, 1);
}

/// Content wider than tall keeps its aspect ratio on a landscape page.
#[tokio::test(flavor = "multi_thread")]
async fn test_engine_print_keeps_wide_content_landscape() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("wide.pdf");
    let behavior = MockBehavior::default().content_size(ContentSize::new(1600.0, 800.0));
    let (printer, probe) = mock_printer(default_config(), behavior);

    printer
        .print(Document::new(&dest, REMOTE_MARKUP), PageConfiguration::default(), None)
        .await
        .unwrap();

    let (pages, size) = pdf_summary(&dest);
    assert_eq!(pages, 1);
    assert_eq!(size, vec![595.0, 297.5]);
    assert_eq!(probe.last_layout().unwrap().orientation, Orientation::Landscape);
}

/// The printer's own configuration drives the engine path, not the pool's.
#[tokio::test(flavor = "multi_thread")]
async fn test_printer_config_overrides_pool_config() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("wide-reference.pdf");
    let factory = MockEngineFactory::with_behavior(
        MockBehavior::default().content_size(ContentSize::new(800.0, 2000.0)),
    );
    let pool = EnginePool::builder()
        .config(default_config())
        .factory(Box::new(factory))
        .build()
        .unwrap();
    let printer_config = PrinterConfigBuilder::new()
        .max_pool_size(2)
        .warmup_count(0)
        .reference_paper_width(1000.0)
        .build()
        .unwrap();
    let printer = Printer::builder()
        .config(printer_config)
        .pool(pool)
        .build()
        .unwrap();

    printer
        .print(Document::new(&dest, REMOTE_MARKUP), PageConfiguration::default(), None)
        .await
        .unwrap();

    let (_, size) = pdf_summary(&dest);
    assert_eq!(size, vec![1000.0, 2500.0]);
}

/// Unusable measurements fall back to the viewport size.
#[tokio::test(flavor = "multi_thread")]
async fn test_engine_print_falls_back_to_viewport() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("fallback.pdf");
    let behavior = MockBehavior::default()
        .content_size(ContentSize::new(0.0, 0.0))
        .viewport(ContentSize::new(1280.0, 720.0));
    let (printer, _probe) = mock_printer(default_config(), behavior);

    printer
        .print(Document::new(&dest, REMOTE_MARKUP), PageConfiguration::default(), None)
        .await
        .unwrap();

    let (pages, size) = pdf_summary(&dest);
    assert_eq!(pages, 1);
    assert_eq!(size, vec![1280.0, 720.0]);
}

/// A saturated pool fails after the full retry budget and never releases
/// an engine it did not get.
#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_pool_reports_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, probe) = mock_printer(
        config(1, 8, Duration::from_millis(200)),
        MockBehavior::default(),
    );

    let held = printer
        .pool()
        .acquire(0, Duration::from_millis(0))
        .await
        .unwrap();

    let started = Instant::now();
    let result = printer
        .print(
            Document::new(dir.path().join("never.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_secs(10)),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(PrintError::EngineUnavailable(_))));
    assert!(elapsed >= Duration::from_millis(1600), "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5));
    assert!(!dir.path().join("never.pdf").exists());

    let stats = printer.pool().stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 0);
    assert_eq!(probe.loads(), 0);

    printer.pool().release(held);
    assert_eq!(printer.pool().stats().released, 1);
}

/// A load that never settles times out and the engine goes back exactly once.
#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_load_times_out_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("stalled.pdf");
    let (printer, probe) = mock_printer(default_config(), MockBehavior::default().never_loads());

    let started = Instant::now();
    let result = printer
        .print(
            Document::new(&dest, REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_secs(1)),
        )
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(PrintError::Timeout(after)) => assert_eq!(after, Duration::from_secs(1)),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3));
    assert!(!dest.exists());

    let stats = printer.pool().stats();
    assert_eq!(stats.released, 1);
    assert_eq!(stats.active, 0);
    assert!(probe.detaches() >= 1);
}

/// A job that outlives its timeout never writes its destination later.
#[tokio::test(flavor = "multi_thread")]
async fn test_timed_out_direct_print_keeps_destination() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("long.pdf");
    std::fs::write(&dest, b"previous").unwrap();
    let (printer, _probe) = mock_printer(default_config(), MockBehavior::default());

    let markup = "<p>line of body text that wraps across the page</p>".repeat(20_000);
    let result = printer
        .print(Document::new(&dest, markup), PageConfiguration::default(), Some(Duration::from_millis(1)))
        .await;

    assert!(matches!(result, Err(PrintError::Timeout(_))));
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

/// A slow load abandoned by one job cannot finish the next job's load.
#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_load_does_not_finish_next_job() {
    let dir = tempfile::tempdir().unwrap();
    let behavior = MockBehavior::default().load_delay(Duration::from_millis(400));
    let (printer, probe) = mock_printer(config(1, 20, Duration::from_millis(20)), behavior);

    let first = printer
        .print(
            Document::new(dir.path().join("first.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_millis(100)),
        )
        .await;
    assert!(matches!(first, Err(PrintError::Timeout(_))));

    let second_dest = dir.path().join("second.pdf");
    let started = Instant::now();
    printer
        .print(
            Document::new(&second_dest, REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(400), "finished after {:?}", started.elapsed());
    assert!(second_dest.exists());
    assert!(!dir.path().join("first.pdf").exists());
    assert_eq!(probe.loads(), 2);

    let stats = printer.pool().stats();
    assert_eq!(stats.released, 2);
    assert_eq!(stats.active, 0);
}

/// Load failures surface as load errors.
#[tokio::test(flavor = "multi_thread")]
async fn test_load_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, _probe) = mock_printer(
        default_config(),
        MockBehavior::default().load_fails("net::ERR_NAME_NOT_RESOLVED"),
    );

    let result = printer
        .print(
            Document::new(dir.path().join("broken.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            None,
        )
        .await;

    match result {
        Err(PrintError::Load(reason)) => assert!(reason.contains("ERR_NAME_NOT_RESOLVED")),
        other => panic!("expected load error, got {:?}", other),
    }
    assert_eq!(printer.pool().stats().released, 1);
}

/// Formatting errors leave no file behind.
#[tokio::test(flavor = "multi_thread")]
async fn test_format_failure_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("unformatted.pdf");
    let (printer, _probe) = mock_printer(
        default_config(),
        MockBehavior::default().format_fails("print failed"),
    );

    let result = printer
        .print(Document::new(&dest, REMOTE_MARKUP), PageConfiguration::default(), None)
        .await;

    assert!(matches!(result, Err(PrintError::Format(_))));
    assert!(!dest.exists());
    assert_eq!(printer.pool().stats().released, 1);
}

/// Cancelling mid-load ends the job as cancelled, not failed.
#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_during_load() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, _probe) = mock_printer(default_config(), MockBehavior::default().never_loads());
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = printer
        .print_with_cancel(
            Document::new(dir.path().join("cancelled.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_secs(10)),
            &token,
        )
        .await;

    let error = result.unwrap_err();
    assert!(error.is_cancellation());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(printer.pool().stats().released, 1);
}

/// A token cancelled up front never reaches the pool.
#[tokio::test(flavor = "multi_thread")]
async fn test_already_cancelled_token() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, probe) = mock_printer(default_config(), MockBehavior::default());
    let token = CancellationToken::new();
    token.cancel();

    let result = printer
        .print_with_cancel(
            Document::new(dir.path().join("skipped.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            None,
            &token,
        )
        .await;

    assert!(matches!(result, Err(PrintError::Cancelled)));
    assert_eq!(probe.loads(), 0);
    assert_eq!(printer.pool().stats().acquired, 0);
}

/// Dropping the print future still returns the engine.
#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_print_releases_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, probe) = mock_printer(default_config(), MockBehavior::default().never_loads());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        printer.print(
            Document::new(dir.path().join("abandoned.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            Some(Duration::from_secs(30)),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = printer.pool().stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(stats.active, 0);
    assert!(probe.detaches() >= 1);
}

/// Printing after shutdown is refused on the engine path.
#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_refuses_engine_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let (printer, _probe) = mock_printer(default_config(), MockBehavior::default());
    printer.shutdown().await;

    let result = printer
        .print(
            Document::new(dir.path().join("late.pdf"), REMOTE_MARKUP),
            PageConfiguration::default(),
            None,
        )
        .await;

    assert!(matches!(result, Err(PrintError::ShuttingDown)));
}

/// Configuration validation.
#[test]
fn test_config_validation() {
    assert!(PrinterConfigBuilder::new().max_pool_size(0).build().is_err());

    let result = PrinterConfigBuilder::new()
        .max_pool_size(3)
        .warmup_count(5)
        .build();
    assert!(result.is_err());

    let result = PrinterConfigBuilder::new()
        .max_pool_size(5)
        .warmup_count(3)
        .render_timeout(Duration::from_secs(10))
        .build();
    assert!(result.is_ok());
}
