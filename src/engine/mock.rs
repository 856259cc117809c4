//! Scriptable engine for tests.
//!
//! [`MockEngine`] needs no browser: load timing and outcome, measurement,
//! viewport, layout failures and health are all dictated by a
//! [`MockBehavior`]. An [`EngineProbe`] shared with the test records what
//! the orchestrator did to the engine.
//!
//! # Feature Flag
//!
//! Only available with the `test-utils` feature or under `cfg(test)`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use markup2pdf::ContentSize;
//! use markup2pdf::engine::mock::MockBehavior;
//!
//! let behavior = MockBehavior::default()
//!     .load_delay(Duration::from_millis(100))
//!     .content_size(ContentSize::new(800.0, 2000.0));
//! assert_eq!(behavior.load_delay, Duration::from_millis(100));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{LoadEvent, LoadHandler, LoadId, RenderEngine};
use crate::direct::StaticLayout;
use crate::document::{ContentSize, PageConfiguration};
use crate::error::{PrintError, Result};
use crate::traits::Healthcheck;
use crate::writer::PreparedLayout;

/// How a mock load settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockLoad {
    /// Report [`LoadEvent::Finished`] after the load delay.
    Finish,
    /// Report [`LoadEvent::Failed`] after the load delay.
    Fail(String),
    /// Never report anything.
    Never,
}

/// Script for a [`MockEngine`].
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub load_delay: Duration,
    pub load: MockLoad,
    /// Result of `content_size()`; `Err` carries the failure message.
    pub content_size: std::result::Result<ContentSize, String>,
    pub viewport: ContentSize,
    pub format_error: Option<String>,
    pub healthy: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(10),
            load: MockLoad::Finish,
            content_size: Ok(ContentSize::new(800.0, 1000.0)),
            viewport: ContentSize::new(1024.0, 768.0),
            format_error: None,
            healthy: true,
        }
    }
}

impl MockBehavior {
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn load_fails<S: Into<String>>(mut self, reason: S) -> Self {
        self.load = MockLoad::Fail(reason.into());
        self
    }

    pub fn never_loads(mut self) -> Self {
        self.load = MockLoad::Never;
        self
    }

    pub fn content_size(mut self, size: ContentSize) -> Self {
        self.content_size = Ok(size);
        self
    }

    pub fn measurement_fails<S: Into<String>>(mut self, reason: S) -> Self {
        self.content_size = Err(reason.into());
        self
    }

    pub fn viewport(mut self, viewport: ContentSize) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn format_fails<S: Into<String>>(mut self, reason: S) -> Self {
        self.format_error = Some(reason.into());
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }
}

/// Shared record of what happened to the engines of one factory.
///
/// Cheap to clone; all clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct EngineProbe {
    inner: Arc<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    loads: AtomicUsize,
    events: AtomicUsize,
    detaches: AtomicUsize,
    pings: AtomicUsize,
    layouts: Mutex<Vec<PageConfiguration>>,
}

impl EngineProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls to `load_markup`.
    pub fn loads(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Load events delivered to a registered handler.
    pub fn delivered_events(&self) -> usize {
        self.inner.events.load(Ordering::SeqCst)
    }

    /// Calls to `set_load_handler(None)`.
    pub fn detaches(&self) -> usize {
        self.inner.detaches.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.inner.pings.load(Ordering::SeqCst)
    }

    /// Page configurations passed to `prepare_layout`, oldest first.
    pub fn layouts(&self) -> Vec<PageConfiguration> {
        match self.inner.layouts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last_layout(&self) -> Option<PageConfiguration> {
        self.layouts().pop()
    }

    fn record_layout(&self, page: &PageConfiguration) {
        match self.inner.layouts.lock() {
            Ok(mut guard) => guard.push(page.clone()),
            Err(poisoned) => poisoned.into_inner().push(page.clone()),
        }
    }
}

/// Engine that follows a [`MockBehavior`].
pub struct MockEngine {
    behavior: MockBehavior,
    probe: EngineProbe,
    handler: Arc<Mutex<Option<LoadHandler>>>,
    markup: String,
}

impl MockEngine {
    pub fn new(behavior: MockBehavior, probe: EngineProbe) -> Self {
        Self {
            behavior,
            probe,
            handler: Arc::new(Mutex::new(None)),
            markup: String::new(),
        }
    }

    /// Whether a load handler is currently registered.
    pub fn has_load_handler(&self) -> bool {
        self.handler.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    fn set_load_handler(&mut self, handler: Option<LoadHandler>) {
        if handler.is_none() {
            self.probe.inner.detaches.fetch_add(1, Ordering::SeqCst);
        }
        match self.handler.lock() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    async fn load_markup(&mut self, load: LoadId, markup: &str, _base_url: Option<&Url>) -> Result<()> {
        self.probe.inner.loads.fetch_add(1, Ordering::SeqCst);
        self.markup = markup.to_string();

        let event = match &self.behavior.load {
            MockLoad::Finish => LoadEvent::Finished { load },
            MockLoad::Fail(reason) => LoadEvent::Failed {
                load,
                reason: reason.clone(),
            },
            MockLoad::Never => return Ok(()),
        };

        let delay = self.behavior.load_delay;
        let slot = Arc::clone(&self.handler);
        let probe = self.probe.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let handler = match slot.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            if let Some(handler) = handler {
                probe.inner.events.fetch_add(1, Ordering::SeqCst);
                handler(event);
            }
        });
        Ok(())
    }

    async fn content_size(&mut self) -> Result<ContentSize> {
        self.behavior
            .content_size
            .clone()
            .map_err(PrintError::Format)
    }

    async fn viewport_size(&mut self) -> ContentSize {
        self.behavior.viewport
    }

    async fn prepare_layout(&mut self, page: &PageConfiguration) -> Result<Box<dyn PreparedLayout>> {
        self.probe.record_layout(page);
        if let Some(reason) = &self.behavior.format_error {
            return Err(PrintError::Format(reason.clone()));
        }
        Ok(Box::new(StaticLayout::from_markup(&self.markup, page)?))
    }
}

impl Healthcheck for MockEngine {
    fn ping(&self) -> Result<()> {
        self.probe.inner.pings.fetch_add(1, Ordering::SeqCst);
        if self.behavior.healthy {
            Ok(())
        } else {
            Err(PrintError::HealthCheckFailed("mock engine unhealthy".to_string()))
        }
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("behavior", &self.behavior)
            .field("has_load_handler", &self.has_load_handler())
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
