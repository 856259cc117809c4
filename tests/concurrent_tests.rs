//! Concurrent print jobs sharing one engine pool.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{REMOTE_MARKUP, config, mock_printer};
use markup2pdf::engine::mock::MockBehavior;
use markup2pdf::prelude::*;
use tokio::task::JoinSet;

/// More jobs than engines: every job finishes and the pool never grows
/// past its bound.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_share_bounded_pool() {
    let dir = Arc::new(tempfile::tempdir().unwrap());
    let behavior = MockBehavior::default().load_delay(Duration::from_millis(50));
    let (printer, probe) = mock_printer(config(2, 40, Duration::from_millis(25)), behavior);
    let printer: SharedPrinter = Arc::new(printer);

    let mut tasks = JoinSet::new();
    for i in 0..6 {
        let printer = Arc::clone(&printer);
        let dir = Arc::clone(&dir);
        tasks.spawn(async move {
            let doc = Document::new(dir.path().join(format!("job-{}.pdf", i)), REMOTE_MARKUP);
            printer
                .print(doc, PageConfiguration::default(), Some(Duration::from_secs(10)))
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let report = joined.expect("task panicked").expect("print failed");
        assert_eq!(report.strategy, Strategy::EngineBacked);
        assert!(report.destination.exists());
    }

    let stats = printer.pool().stats();
    assert_eq!(stats.acquired, 6);
    assert_eq!(stats.released, 6);
    assert_eq!(stats.active, 0);
    assert!(stats.available <= 2);
    assert_eq!(probe.loads(), 6);
}

/// Direct jobs run alongside engine jobs without borrowing engines.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_strategies_in_parallel() {
    let dir = Arc::new(tempfile::tempdir().unwrap());
    let (printer, probe) = mock_printer(config(1, 40, Duration::from_millis(25)), MockBehavior::default());
    let printer = Arc::new(printer);

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let printer = Arc::clone(&printer);
        let dir = Arc::clone(&dir);
        tasks.spawn(async move {
            let markup = if i % 2 == 0 {
                format!("<p>plain page {}</p>", i)
            } else {
                REMOTE_MARKUP.to_string()
            };
            let doc = Document::new(dir.path().join(format!("mixed-{}.pdf", i)), markup);
            printer.print(doc, PageConfiguration::default(), None).await
        });
    }

    let mut direct = 0;
    while let Some(joined) = tasks.join_next().await {
        if joined.unwrap().unwrap().strategy == Strategy::Direct {
            direct += 1;
        }
    }

    assert_eq!(direct, 4);
    assert_eq!(probe.loads(), 4);
    assert_eq!(printer.pool().stats().released, 4);
}

/// Timeouts in some jobs do not leak engines needed by the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeouts_do_not_leak_engines() {
    let dir = Arc::new(tempfile::tempdir().unwrap());
    let (printer, _probe) = mock_printer(
        config(2, 40, Duration::from_millis(25)),
        MockBehavior::default().never_loads(),
    );
    let printer = Arc::new(printer);

    let mut tasks = JoinSet::new();
    for i in 0..4 {
        let printer = Arc::clone(&printer);
        let dir = Arc::clone(&dir);
        tasks.spawn(async move {
            let doc = Document::new(dir.path().join(format!("slow-{}.pdf", i)), REMOTE_MARKUP);
            printer
                .print(doc, PageConfiguration::default(), Some(Duration::from_millis(200)))
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        assert!(matches!(joined.unwrap(), Err(PrintError::Timeout(_))));
    }

    let stats = printer.pool().stats();
    assert_eq!(stats.acquired, 4);
    assert_eq!(stats.released, 4);
    assert_eq!(stats.active, 0);
}

/// Stats can be read from many tasks while jobs run.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_stats_access() {
    let (printer, _probe) = mock_printer(config(3, 0, Duration::from_millis(10)), MockBehavior::default());
    let printer = Arc::new(printer);

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let printer = Arc::clone(&printer);
        tasks.spawn(async move {
            for _ in 0..100 {
                let stats = printer.pool().stats();
                assert!(stats.live() <= 3);
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        assert!(result.is_ok(), "Task should complete without panic");
    }
}
