//! The print entry point.
//!
//! [`Printer`] picks a strategy per document and runs it under a timeout:
//!
//! ```text
//! print(document, page, timeout)
//!   │
//!   ├─ StrategySelector ── Direct ──────▶ DirectFormatter (blocking thread)
//!   │                                           │
//!   └──────────────────── EngineBacked ─▶ EngineSession ─▶ EnginePool
//!                                               │
//!                                               ▼
//!                                          PdfWriter ─▶ destination.pdf
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::completion::race_with_timeout;
use crate::config::PrinterConfig;
use crate::direct::DirectFormatter;
use crate::document::{Document, PageConfiguration};
use crate::error::{PrintError, Result};
use crate::pool::EnginePool;
use crate::session::EngineSession;
use crate::strategy::{ContentInspector, Strategy, StrategySelector};
use crate::writer::PdfWriter;

/// What a successful print did.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintReport {
    pub strategy: Strategy,
    pub destination: PathBuf,
    pub elapsed: Duration,
}

/// Prints documents to PDF files.
///
/// Cheap to share behind an `Arc`; every call is an independent job.
///
/// # Example
///
/// ```rust
/// use markup2pdf::{Document, EnginePool, PageConfiguration, Printer, Strategy};
/// use markup2pdf::factory::mock::MockEngineFactory;
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() -> markup2pdf::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let pool = EnginePool::builder()
///     .factory(Box::new(MockEngineFactory::new()))
///     .build()?;
/// let printer = Printer::builder().pool(pool).build()?;
///
/// let doc = Document::new(dir.path().join("hello.pdf"), "<h1>Hello</h1>");
/// let report = printer.print(doc, PageConfiguration::default(), None).await?;
/// assert_eq!(report.strategy, Strategy::Direct);
/// # Ok(())
/// # }
/// ```
pub struct Printer {
    config: PrinterConfig,
    pool: EnginePool,
    selector: StrategySelector,
    formatter: DirectFormatter,
}

impl Printer {
    pub fn builder() -> PrinterBuilder {
        PrinterBuilder::new()
    }

    /// Timeout applied when `print` gets `None`.
    pub fn default_timeout(&self) -> Duration {
        self.config.render_timeout
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Strategy `print` would use for `document`.
    pub fn choose_strategy(&self, document: &Document, page: &PageConfiguration) -> Strategy {
        self.selector.choose_strategy(document, page)
    }

    /// Print `document` to its destination.
    ///
    /// `timeout` defaults to [`default_timeout`](Self::default_timeout).
    pub async fn print(
        &self,
        document: Document,
        configuration: PageConfiguration,
        timeout: Option<Duration>,
    ) -> Result<PrintReport> {
        self.print_with_cancel(document, configuration, timeout, &CancellationToken::new())
            .await
    }

    /// [`print`](Self::print) that also ends with [`PrintError::Cancelled`]
    /// once `cancel` fires.
    pub async fn print_with_cancel(
        &self,
        document: Document,
        configuration: PageConfiguration,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<PrintReport> {
        if cancel.is_cancelled() {
            return Err(PrintError::Cancelled);
        }
        let timeout = timeout.unwrap_or(self.config.render_timeout);
        let strategy = self.selector.choose_strategy(&document, &configuration);
        let destination = document.destination().to_path_buf();
        let started = Instant::now();

        log::info!(
            "🖨️ Printing {:?} via {} strategy (timeout {:?})",
            destination,
            strategy,
            timeout
        );

        let document = Arc::new(document);
        match strategy {
            Strategy::Direct => {
                self.print_direct(document, configuration, timeout, cancel)
                    .await?
            }
            Strategy::EngineBacked => {
                EngineSession::new(self.pool.clone(), document, configuration, timeout)
                    .with_config(&self.config)
                    .run_with_cancel(cancel)
                    .await?
            }
        }

        Ok(PrintReport {
            strategy,
            destination,
            elapsed: started.elapsed(),
        })
    }

    async fn print_direct(
        &self,
        document: Arc<Document>,
        configuration: PageConfiguration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let formatter = self.formatter;
        let destination = document.destination().to_path_buf();

        // The formatter commits the file only if it resolves `job` before
        // the timer does.
        let outcome = race_with_timeout(timeout, cancel, |job| async move {
            tokio::task::spawn_blocking(move || {
                formatter.render_for_job(&document, &configuration, &job)
            })
            .await
            .map_err(|e| PrintError::Internal(format!("direct formatting task failed: {}", e)))?
            .map(|_| ())
        })
        .await;

        match &outcome {
            Ok(()) => log::info!("✅ Printed {:?} directly", destination),
            Err(e) if e.is_cancellation() => log::debug!("Direct print of {:?} cancelled", destination),
            Err(e) => log::error!("❌ Direct print of {:?} failed: {}", destination, e),
        }
        outcome
    }

    /// Shut down the engine pool.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PrinterBuilder
// ============================================================================

/// Builder for [`Printer`].
#[derive(Default)]
pub struct PrinterBuilder {
    config: Option<PrinterConfig>,
    pool: Option<EnginePool>,
    inspector: Option<Box<dyn ContentInspector>>,
}

impl PrinterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for both print paths. Defaults to the pool's configuration.
    ///
    /// Pool sizing and warmup stay with the pool; acquisition retries,
    /// reference paper width, directory creation and the default timeout
    /// come from here.
    pub fn config(mut self, config: PrinterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Required.
    pub fn pool(mut self, pool: EnginePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Replace the default remote-image inspector.
    pub fn inspector(mut self, inspector: Box<dyn ContentInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// # Errors
    ///
    /// [`PrintError::Configuration`] when no pool was given.
    pub fn build(self) -> Result<Printer> {
        let pool = self
            .pool
            .ok_or_else(|| PrintError::Configuration("No engine pool provided".to_string()))?;
        let config = self.config.unwrap_or_else(|| pool.config().clone());
        let selector = match self.inspector {
            Some(inspector) => StrategySelector::new(inspector),
            None => StrategySelector::default(),
        };
        let formatter = DirectFormatter::new(PdfWriter::new(config.create_parent_dirs));

        Ok(Printer {
            config,
            pool,
            selector,
            formatter,
        })
    }
}

// ============================================================================
// Environment Initialization (feature-gated)
// ============================================================================

/// Build a Chrome-backed [`Printer`] from the environment and warm its pool.
///
/// Reads `app.env` and the `PRINT_*` variables (see
/// [`config::env::from_env`](crate::config::env::from_env)) plus
/// `CHROME_PATH`.
///
/// # Errors
///
/// Configuration errors, or warmup failures from the pool.
#[cfg(feature = "env-config")]
pub async fn init_printer() -> Result<Printer> {
    use crate::config::env::{chrome_path_from_env, from_env};
    use crate::factory::{ChromeEngineFactory, EngineFactory};

    log::info!("🚀 Initializing printer from environment...");

    let config = from_env()?;
    let chrome_path = chrome_path_from_env();

    log::info!("📋 Printer configuration from environment:");
    log::info!("   - Max pool size: {}", config.max_pool_size);
    log::info!("   - Warmup count: {}", config.warmup_count);
    log::info!(
        "   - Acquire: {} retries every {:?}",
        config.acquire_retries,
        config.acquire_retry_delay
    );
    log::info!("   - Render timeout: {:?}", config.render_timeout);
    log::info!(
        "   - Chrome path: {}",
        chrome_path.as_deref().unwrap_or("auto-detect")
    );

    let factory: Box<dyn EngineFactory> = match chrome_path {
        Some(path) => Box::new(ChromeEngineFactory::with_path(path)),
        None => Box::new(ChromeEngineFactory::with_defaults()),
    };

    let pool = EnginePool::builder()
        .config(config.clone())
        .factory(factory)
        .build()?;

    pool.warmup().await.inspect_err(|e| {
        log::error!("❌ Failed to warm up engine pool: {}", e);
    })?;

    let printer = Printer::builder().config(config).pool(pool).build()?;
    log::info!("✅ Printer ready - {}", printer.pool().stats());
    Ok(printer)
}

// ============================================================================
// Unit Tests
// ============================================================================
