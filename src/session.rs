//! One engine-backed print job.
//!
//! An [`EngineSession`] walks a single document through the engine path:
//!
//! ```text
//! Idle ─▶ Acquiring ─▶ Loading ─▶ Measuring ─▶ Formatting ─▶ Completed
//!             │            │           │             │
//!             └────────────┴───────────┴─────────────┴──▶ Failed / TimedOut / Cancelled
//! ```
//!
//! The timeout covers everything after acquisition. Whatever ends the job
//! (success, load failure, timeout, cancellation, any error) the borrowed
//! engine has its load handler detached and goes back to the pool exactly
//! once. An engine abandoned while a load or engine call is still running
//! is retired by the pool rather than lent to the next job, and load events
//! are matched by [`LoadId`] so a stale one is never taken for the job's
//! own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::completion::{Completion, race_with_timeout};
use crate::config::PrinterConfig;
use crate::document::{Document, PageConfiguration};
use crate::engine::{LoadEvent, LoadHandler, LoadId};
use crate::error::{PrintError, Result};
use crate::handle::EngineLease;
use crate::pool::EnginePool;
use crate::writer::{PdfWriter, PreparedLayout};

static NEXT_LOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Acquiring,
    Loading,
    Measuring,
    Formatting,
    Completed,
    TimedOut,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::Failed | Self::Cancelled
        )
    }

    fn for_outcome(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => Self::Completed,
            Err(PrintError::Timeout(_)) => Self::TimedOut,
            Err(PrintError::Cancelled) => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }
}

/// How the page for the engine layout was sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// Paper rescaled to the measured content.
    Measured,
    /// Content size unusable; paper matches the engine viewport.
    Fallback,
}

/// Per-job state machine owning at most one borrowed engine.
pub struct EngineSession {
    pool: EnginePool,
    document: Arc<Document>,
    page: PageConfiguration,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    reference_width: f64,
    writer: PdfWriter,
    history: Vec<SessionState>,
    measurement: Option<Measurement>,
}

impl EngineSession {
    /// Session printing `document` with `page`, borrowing from `pool`.
    ///
    /// Acquisition policy, reference paper width and the writer's
    /// directory handling come from the pool's [`PrinterConfig`]; use
    /// [`with_config`](Self::with_config) to take them from another one.
    pub fn new(
        pool: EnginePool,
        document: Arc<Document>,
        page: PageConfiguration,
        timeout: Duration,
    ) -> Self {
        let config = pool.config().clone();
        Self {
            pool,
            document,
            page,
            timeout,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            reference_width: 0.0,
            writer: PdfWriter::default(),
            history: vec![SessionState::Idle],
            measurement: None,
        }
        .with_config(&config)
    }

    /// Take the acquisition policy, reference paper width and directory
    /// handling from `config`.
    pub fn with_config(mut self, config: &PrinterConfig) -> Self {
        self.max_retries = config.acquire_retries;
        self.retry_delay = config.acquire_retry_delay;
        self.reference_width = config.reference_paper_width;
        self.writer = PdfWriter::new(config.create_parent_dirs);
        self
    }

    /// Override the acquisition retry policy.
    pub fn acquire_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn state(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// How the engine page was sized; `None` before measuring.
    pub fn measurement(&self) -> Option<Measurement> {
        self.measurement
    }

    /// The working page configuration; replaced by the fitted one once
    /// formatting succeeded.
    pub fn page(&self) -> &PageConfiguration {
        &self.page
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Run the job to a terminal state.
    pub async fn run(&mut self) -> Result<()> {
        self.run_with_cancel(&CancellationToken::new()).await
    }

    /// Run the job; cancelling `cancel` ends it with [`PrintError::Cancelled`].
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | pool exhausted after retries | [`PrintError::EngineUnavailable`] |
    /// | engine reports a failed load | [`PrintError::Load`] |
    /// | timeout elapsed | [`PrintError::Timeout`] |
    /// | `cancel` fired | [`PrintError::Cancelled`] |
    /// | layout or write failure | the underlying error |
    /// | session already ran | [`PrintError::Internal`] |
    pub async fn run_with_cancel(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(PrintError::Internal(format!(
                "session for {:?} already ran",
                self.document.destination()
            )));
        }
        let started = Instant::now();

        self.transition(SessionState::Acquiring);
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PrintError::Cancelled),
            lease = self.pool.acquire(self.max_retries, self.retry_delay) => lease,
        };

        match acquired {
            Ok(mut lease) => {
                let timeout = self.timeout;
                let outcome =
                    race_with_timeout(timeout, cancel, |signal| self.drive(&mut lease, signal)).await;
                self.finish(Some(lease), outcome, started)
            }
            Err(e) => self.finish(None, Err(e), started),
        }
    }

    async fn drive(&mut self, lease: &mut EngineLease, signal: Completion<Result<()>>) -> Result<()> {
        // Stays set if this future is dropped mid-call, so the pool retires
        // the engine instead of lending it with work still running.
        lease.set_busy(true);
        let prepared = self.use_engine(lease).await;
        lease.set_busy(false);
        let (page, layout) = prepared?;

        self.page = page;
        let written = self
            .writer
            .write_in_background(
                layout,
                self.page.paper_rect(),
                self.document.destination().to_path_buf(),
                signal,
            )
            .await?;
        if !written {
            log::debug!("Job for {:?} ended before its PDF was committed", self.document.destination());
        }
        Ok(())
    }

    /// Load, measure and lay out the document on the borrowed engine.
    async fn use_engine(
        &mut self,
        lease: &mut EngineLease,
    ) -> Result<(PageConfiguration, Box<dyn PreparedLayout>)> {
        self.transition(SessionState::Loading);
        let load = NEXT_LOAD_ID.fetch_add(1, Ordering::Relaxed);
        let (handler, mut events) = load_handler(load);
        lease.set_load_handler(Some(handler));
        lease
            .load_markup(load, self.document.markup(), self.page.base_url.as_ref())
            .await?;

        match events.recv().await {
            Some(LoadEvent::Finished { .. }) => {}
            Some(LoadEvent::Failed { reason, .. }) => {
                log::warn!("❌ Content failed to load: {}", reason);
                return Err(PrintError::Load(reason));
            }
            None => {
                return Err(PrintError::Internal(format!(
                    "load handler for load {} dropped before the load settled",
                    load
                )));
            }
        }

        self.transition(SessionState::Measuring);
        let page = self.measure(lease).await;

        self.transition(SessionState::Formatting);
        let layout = lease.prepare_layout(&page).await?;
        Ok((page, layout))
    }

    /// Fit the page to the loaded content, falling back to the viewport.
    async fn measure(&mut self, lease: &mut EngineLease) -> PageConfiguration {
        let fitted = match lease.content_size().await {
            Ok(size) => self
                .page
                .fit_to_content(size, self.reference_width)
                .ok_or_else(|| format!("unusable content size {}x{}", size.width, size.height)),
            Err(e) => Err(e.to_string()),
        };

        match fitted {
            Ok(page) => {
                self.measurement = Some(Measurement::Measured);
                page
            }
            Err(reason) => {
                let viewport = lease.viewport_size().await;
                log::warn!(
                    "⚠️ Measurement failed for {:?} ({}), using viewport {}x{}",
                    self.document.destination(),
                    reason,
                    viewport.width,
                    viewport.height
                );
                self.measurement = Some(Measurement::Fallback);
                self.page.fit_to_viewport(viewport)
            }
        }
    }

    /// Terminal transition and cleanup. Runs once per session.
    fn finish(
        &mut self,
        lease: Option<EngineLease>,
        outcome: Result<()>,
        started: Instant,
    ) -> Result<()> {
        if let Some(mut lease) = lease {
            lease.set_load_handler(None);
            self.pool.release(lease);
        }

        let terminal = SessionState::for_outcome(&outcome);
        self.transition(terminal);

        match &outcome {
            Ok(()) => log::info!(
                "✅ Printed {:?} via engine in {:?}",
                self.document.destination(),
                started.elapsed()
            ),
            Err(e) if e.is_cancellation() => log::debug!(
                "Print of {:?} ended as {:?}: {}",
                self.document.destination(),
                terminal,
                e
            ),
            Err(e) => log::error!(
                "❌ Print of {:?} failed after {:?}: {}",
                self.document.destination(),
                started.elapsed(),
                e
            ),
        }
        outcome
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!(
            "📍 Session {:?}: {:?} → {:?}",
            self.document.destination(),
            self.state(),
            next
        );
        self.history.push(next);
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("destination", &self.document.destination())
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Handler forwarding the events of load `load` and dropping any other.
fn load_handler(load: LoadId) -> (LoadHandler, mpsc::UnboundedReceiver<LoadEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: LoadHandler = Arc::new(move |event: LoadEvent| {
        if event.load() == load {
            let _ = tx.send(event);
        } else {
            log::debug!("Ignoring stale event for load {} (expecting {})", event.load(), load);
        }
    });
    (handler, rx)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrinterConfigBuilder;
    use crate::document::{ContentSize, Margins, Orientation, PaperSize};
    use crate::engine::mock::MockBehavior;
    use crate::factory::mock::MockEngineFactory;
    use SessionState::*;

    fn pool(factory: MockEngineFactory) -> EnginePool {
        EnginePool::builder()
            .config(PrinterConfigBuilder::new().max_pool_size(1).build().unwrap())
            .factory(Box::new(factory))
            .build()
            .unwrap()
    }

    fn session(pool: &EnginePool, dest: &std::path::Path, timeout: Duration) -> EngineSession {
        let doc = Arc::new(Document::new(dest, "<h1>Chart</h1><p>Rows</p>"));
        EngineSession::new(pool.clone(), doc, PageConfiguration::default(), timeout)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_run_visits_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEngineFactory::with_behavior(
            MockBehavior::default().content_size(ContentSize::new(800.0, 2000.0)),
        );
        let probe = factory.probe();
        let pool = pool(factory);

        let mut job = session(&pool, &dir.path().join("ok.pdf"), Duration::from_secs(5));
        job.run().await.unwrap();

        assert_eq!(
            job.history(),
            &[Idle, Acquiring, Loading, Measuring, Formatting, Completed]
        );
        assert_eq!(job.measurement(), Some(Measurement::Measured));
        assert_eq!(job.page().paper, PaperSize::new(595.0, 1487.5));
        assert_eq!(job.page().margins, Margins::zero());
        assert!(dir.path().join("ok.pdf").exists());

        assert_eq!(probe.detaches(), 1);
        assert_eq!(pool.stats().released, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(MockEngineFactory::new());
        let mut job = session(&pool, &dir.path().join("once.pdf"), Duration::from_secs(5));

        job.run().await.unwrap();
        assert!(matches!(job.run().await, Err(PrintError::Internal(_))));
        assert_eq!(pool.stats().acquired, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_failure_fails_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(MockEngineFactory::with_behavior(
            MockBehavior::default().load_fails("net::ERR_NAME_NOT_RESOLVED"),
        ));
        let dest = dir.path().join("never.pdf");

        let mut job = session(&pool, &dest, Duration::from_secs(5));
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PrintError::Load(ref r) if r.contains("NAME_NOT_RESOLVED")));
        assert_eq!(job.state(), Failed);
        assert!(!job.history().contains(&Measuring));
        assert!(!dest.exists());
        assert_eq!(pool.stats().released, 1);
    }

    /// Unusable measurements use the viewport, without margins.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_measurement_fallback_uses_viewport() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEngineFactory::with_behavior(
            MockBehavior::default()
                .content_size(ContentSize::new(0.0, 0.0))
                .viewport(ContentSize::new(1280.0, 720.0)),
        );
        let probe = factory.probe();
        let pool = pool(factory);

        let mut job = session(&pool, &dir.path().join("fallback.pdf"), Duration::from_secs(5));
        job.run().await.unwrap();

        assert_eq!(job.measurement(), Some(Measurement::Fallback));
        let used = probe.last_layout().unwrap();
        assert_eq!(used.margins, Margins::zero());
        assert_eq!(used.orientation, Orientation::Landscape);
        assert_eq!(used.paper_rect().width, 1280.0);
        assert_eq!(used.paper_rect().height, 720.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_format_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(MockEngineFactory::with_behavior(
            MockBehavior::default().format_fails("out of paper"),
        ));

        let mut job = session(&pool, &dir.path().join("x.pdf"), Duration::from_secs(5));
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PrintError::Format(ref m) if m == "out of paper"));
        assert_eq!(job.state(), Failed);
        assert_eq!(pool.stats().released, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_releases_engine() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEngineFactory::with_behavior(MockBehavior::default().never_loads());
        let probe = factory.probe();
        let pool = pool(factory);

        let mut job = session(&pool, &dir.path().join("slow.pdf"), Duration::from_millis(150));
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, PrintError::Timeout(_)));
        assert_eq!(job.state(), TimedOut);
        assert_eq!(probe.detaches(), 1);
        // Its load never settled, so the engine is retired, not reused.
        let stats = pool.stats();
        assert_eq!((stats.released, stats.active, stats.available), (1, 0, 0));
    }

    /// A job after a timed-out one waits for its own load, not the
    /// leftover one.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_next_job_ignores_abandoned_load() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEngineFactory::with_behavior(
            MockBehavior::default().load_delay(Duration::from_millis(400)),
        );
        let created = factory.counter();
        let pool = pool(factory);

        let mut first = session(&pool, &dir.path().join("a.pdf"), Duration::from_millis(100));
        assert!(matches!(first.run().await, Err(PrintError::Timeout(_))));

        let started = std::time::Instant::now();
        let mut second = session(&pool, &dir.path().join("b.pdf"), Duration::from_secs(5));
        second.run().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400), "finished after {:?}", started.elapsed());
        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(!dir.path().join("a.pdf").exists());
        assert!(dir.path().join("b.pdf").exists());
    }

    #[test]
    fn test_load_handler_drops_other_loads() {
        let (handler, mut events) = load_handler(5);
        handler(LoadEvent::Finished { load: 4 });
        handler(LoadEvent::Failed {
            load: 6,
            reason: "late".to_string(),
        });
        handler(LoadEvent::Finished { load: 5 });

        assert_eq!(events.try_recv().unwrap(), LoadEvent::Finished { load: 5 });
        assert!(events.try_recv().is_err());
    }

    /// Settings given with `with_config` win over the pool's.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_with_config_overrides_pool_settings() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockEngineFactory::with_behavior(
            MockBehavior::default().content_size(ContentSize::new(800.0, 2000.0)),
        );
        let pool = pool(factory);
        let config = PrinterConfigBuilder::new()
            .reference_paper_width(1000.0)
            .build()
            .unwrap();

        let mut job = session(&pool, &dir.path().join("wide.pdf"), Duration::from_secs(5))
            .with_config(&config);
        job.run().await.unwrap();

        assert_eq!(job.page().paper, PaperSize::new(1000.0, 2500.0));
    }

    /// Cancellation while waiting for a free engine never borrows one.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_while_acquiring() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(MockEngineFactory::new());
        let held = pool.acquire(0, Duration::ZERO).await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let mut job = session(&pool, &dir.path().join("c.pdf"), Duration::from_secs(5))
            .acquire_policy(100, Duration::from_millis(20));
        let err = job.run_with_cancel(&token).await.unwrap_err();

        assert!(matches!(err, PrintError::Cancelled));
        assert_eq!(job.history(), &[Idle, Acquiring, Cancelled]);
        assert_eq!(pool.stats().acquired, 1);

        pool.release(held);
    }
}
