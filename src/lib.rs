//! # markup2pdf
//!
//! Print markup documents to PDF files, with a bounded pool of rendering
//! engines for content that needs one.
//!
//! Every document goes through one of two paths:
//!
//! - **Direct**: plain markup is laid out as text on a single page and
//!   written synchronously. No engine, no scripting, no resource loading.
//! - **Engine-backed**: markup that references remote images is loaded in a
//!   rendering engine (headless Chrome) borrowed from an [`EnginePool`],
//!   measured, fitted to a single page and printed.
//!
//! Both paths run under a timeout and honour a [`CancellationToken`]. On the
//! engine path the borrowed engine is returned to the pool exactly once,
//! whatever ends the job, including the caller dropping the future.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ Printer::print(document, page, timeout)               │
//! └──────────────┬────────────────────────────────────────┘
//!                ▼
//!        StrategySelector ── Direct ──▶ DirectFormatter ──┐
//!                │                                         │
//!          EngineBacked                                    │
//!                ▼                                         ▼
//! ┌─────────────────────────────┐                     PdfWriter
//! │ EngineSession               │                   (lopdf, atomic
//! │ Acquiring → Loading →       │──prepare_layout──▶  tempfile write)
//! │ Measuring → Formatting      │
//! └──────────────┬──────────────┘
//!                │ acquire / release (EngineLease)
//!                ▼
//! ┌─────────────────────────────┐
//! │ EnginePool                  │
//! │  idle [E1] [E2]  lent {E3}  │
//! └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use markup2pdf::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = PrinterConfigBuilder::new()
//!         .max_pool_size(3)
//!         .warmup_count(1)
//!         .build()?;
//!
//!     let pool = EnginePool::builder()
//!         .config(config)
//!         .factory(Box::new(ChromeEngineFactory::with_defaults()))
//!         .build()?;
//!     pool.warmup().await?;
//!
//!     let printer = Printer::builder().pool(pool).build()?;
//!     let doc = Document::new(
//!         "out/report.pdf",
//!         r#"<h1>Q3</h1><img src="https://cdn.example.com/chart.png">"#,
//!     );
//!     let report = printer.print(doc, PageConfiguration::default(), None).await?;
//!     println!("{:?} in {:?}", report.strategy, report.elapsed);
//!
//!     printer.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `env-config` | yes | [`init_printer`] and `config::env` (`app.env`, `PRINT_*` variables) |
//! | `serde` | no | `Serialize`/`Deserialize` for documents and page types |
//! | `test-utils` | no | Mock engine and factory for tests without Chrome |
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Modules
// ============================================================================

pub mod completion;
pub mod config;
pub mod direct;
pub mod document;
pub mod engine;
pub mod error;
pub mod factory;
pub mod handle;
pub mod pool;
pub mod prelude;
pub mod printer;
pub mod session;
pub mod stats;
pub mod strategy;
pub mod traits;
pub mod writer;

pub(crate) mod tracked;

// ============================================================================
// Re-exports (Public API)
// ============================================================================

pub use completion::{Completion, Resolution, race_with_timeout};
pub use config::{DEFAULT_RENDER_TIMEOUT, PrinterConfig, PrinterConfigBuilder};
pub use direct::{DirectFormatter, StaticLayout};
pub use document::{
    A4_HEIGHT, A4_WIDTH, ContentSize, Document, Margins, Orientation, PageConfiguration,
    PaperRect, PaperSize,
};
pub use engine::{ChromeEngine, ImportedLayout, LoadEvent, LoadHandler, LoadId, RenderEngine};
pub use error::{PrintError, Result};
pub use factory::{ChromeEngineFactory, EngineFactory, create_chrome_options};
pub use handle::EngineLease;
pub use pool::{EnginePool, EnginePoolBuilder};
pub use printer::{PrintReport, Printer, PrinterBuilder};
pub use session::{EngineSession, Measurement, SessionState};
pub use stats::PoolStats;
pub use strategy::{ContentInspector, InspectionError, RemoteImageInspector, Strategy, StrategySelector};
pub use traits::Healthcheck;
pub use writer::{PdfCanvas, PdfWriter, PreparedLayout};

#[cfg(feature = "env-config")]
pub use config::env::{chrome_path_from_env, from_env};

#[cfg(feature = "env-config")]
pub use printer::init_printer;

/// A printer shared across tasks.
pub type SharedPrinter = std::sync::Arc<Printer>;
