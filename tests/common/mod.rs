//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use lopdf::Document as PdfDocument;
use markup2pdf::engine::mock::{EngineProbe, MockBehavior};
use markup2pdf::factory::mock::MockEngineFactory;
use markup2pdf::prelude::*;

/// Markup that routes to the engine-backed path.
pub const REMOTE_MARKUP: &str =
    r#"<h1>Report</h1><p>Quarterly figures</p><img src="https://cdn.example.com/chart.png">"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config(pool_size: usize, retries: u32, retry_delay: Duration) -> PrinterConfig {
    PrinterConfigBuilder::new()
        .max_pool_size(pool_size)
        .warmup_count(0)
        .acquire_retries(retries)
        .acquire_retry_delay(retry_delay)
        .build()
        .unwrap()
}

/// Printer over a mock pool, plus the probe its engines report to.
pub fn mock_printer(config: PrinterConfig, behavior: MockBehavior) -> (Printer, EngineProbe) {
    init_logging();
    let factory = MockEngineFactory::with_behavior(behavior);
    let probe = factory.probe();
    let pool = EnginePool::builder()
        .config(config)
        .factory(Box::new(factory))
        .build()
        .unwrap();
    let printer = Printer::builder().pool(pool).build().unwrap();
    (printer, probe)
}

/// `(page count, [width, height] of the first page)` of a written PDF.
pub fn pdf_summary(path: &std::path::Path) -> (usize, Vec<f32>) {
    let doc = PdfDocument::load(path).unwrap();
    let pages = doc.get_pages();
    let first = *pages.values().next().unwrap();
    let media_box: Vec<f32> = doc
        .get_dictionary(first)
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_float().unwrap())
        .collect();
    (pages.len(), media_box[2..].to_vec())
}
