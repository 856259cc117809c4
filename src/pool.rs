//! Bounded pool of rendering engines.
//!
//! Engines are expensive to start, so the pool keeps idle ones around and
//! lends each to exactly one borrower at a time. New engines are created on
//! demand until `max_pool_size` engines are alive; past that, acquisition
//! retries with a fixed delay and then gives up with
//! [`PrintError::EngineUnavailable`].
//!
//! # Architecture
//!
//! ```text
//! EnginePool (Clone)
//!   └── Arc<EnginePoolInner>
//!         ├── available: Mutex<Vec<TrackedEngine>>   idle, pinged before lending
//!         ├── active:    Mutex<HashMap<id, Instant>> lent out
//!         ├── creating:  AtomicUsize                 creations in flight
//!         └── factory:   Box<dyn EngineFactory>
//! ```
//!
//! Lock order is always `active` then `available`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use markup2pdf::EnginePool;
//! use markup2pdf::factory::mock::MockEngineFactory;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> markup2pdf::Result<()> {
//! let pool = EnginePool::builder()
//!     .factory(Box::new(MockEngineFactory::new()))
//!     .build()?;
//!
//! let lease = pool.acquire(3, Duration::from_millis(50)).await?;
//! pool.release(lease);
//!
//! assert_eq!(pool.stats().available, 1);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::PrinterConfig;
use crate::error::{PrintError, Result};
use crate::factory::EngineFactory;
use crate::handle::EngineLease;
use crate::stats::PoolStats;
use crate::traits::Healthcheck;
use crate::tracked::TrackedEngine;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// EnginePoolInner
// ============================================================================

/// Shared pool state. Leases hold an `Arc` to it so they can return their
/// engine from `Drop`.
pub(crate) struct EnginePoolInner {
    config: PrinterConfig,

    available: Mutex<Vec<TrackedEngine>>,

    /// Lent engines by id, with the time they were lent.
    active: Mutex<HashMap<u64, Instant>>,

    factory: Box<dyn EngineFactory>,

    shutting_down: AtomicBool,

    creating: AtomicUsize,

    acquired: AtomicU64,

    released: AtomicU64,
}

impl EnginePoolInner {
    fn new(config: PrinterConfig, factory: Box<dyn EngineFactory>) -> Arc<Self> {
        log::info!(
            "🏊 Initializing engine pool with capacity {}",
            config.max_pool_size
        );

        Arc::new(Self {
            config,
            available: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            factory,
            shutting_down: AtomicBool::new(false),
            creating: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        })
    }

    #[inline]
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// One acquisition attempt. Blocking: pings and creation may do I/O.
    ///
    /// `Ok(None)` means every slot is taken.
    fn checkout(self: &Arc<Self>) -> Result<Option<EngineLease>> {
        if self.is_shutting_down() {
            return Err(PrintError::ShuttingDown);
        }

        // Idle engines first; each is marked lent before the ping so it is
        // never invisible to the capacity check.
        loop {
            let popped = {
                let mut active = lock(&self.active);
                let mut available = lock(&self.available);
                available.pop().inspect(|tracked| {
                    active.insert(tracked.id(), Instant::now());
                })
            };

            let Some(tracked) = popped else { break };

            match tracked.ping() {
                Ok(()) => {
                    log::debug!("♻️ Reusing engine {}", tracked.id());
                    return Ok(Some(self.lend(tracked)));
                }
                Err(_) => {
                    log::warn!("🗑️ Discarding unhealthy engine {}", tracked.id());
                    lock(&self.active).remove(&tracked.id());
                }
            }
        }

        if !self.reserve_creation_slot() {
            log::trace!("All {} engine slots taken", self.config.max_pool_size);
            return Ok(None);
        }

        log::debug!("🛠️ Creating new engine via factory...");
        let created = self.factory.create();

        let tracked = {
            let mut active = lock(&self.active);
            self.creating.fetch_sub(1, Ordering::SeqCst);
            match created {
                Ok(engine) => {
                    let tracked = TrackedEngine::new(engine);
                    active.insert(tracked.id(), Instant::now());
                    tracked
                }
                Err(e) => {
                    log::error!("❌ Engine creation failed: {}", e);
                    return Err(e);
                }
            }
        };

        log::info!("✅ Created new engine {}", tracked.id());
        Ok(Some(self.lend(tracked)))
    }

    fn lend(self: &Arc<Self>, tracked: TrackedEngine) -> EngineLease {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        EngineLease::new(tracked, Arc::clone(self))
    }

    /// Claim a slot for one engine creation if the pool is below capacity.
    fn reserve_creation_slot(&self) -> bool {
        let active = lock(&self.active);
        let available = lock(&self.available);
        let creating = self.creating.load(Ordering::SeqCst);

        if active.len() + available.len() + creating >= self.config.max_pool_size {
            return false;
        }
        self.creating.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Create an idle engine straight into `available` (warmup).
    fn create_idle(&self) -> Result<u64> {
        if self.is_shutting_down() {
            return Err(PrintError::ShuttingDown);
        }
        if !self.reserve_creation_slot() {
            return Err(PrintError::EngineUnavailable("pool already full".to_string()));
        }

        let created = self.factory.create();

        let _active = lock(&self.active);
        let mut available = lock(&self.available);
        self.creating.fetch_sub(1, Ordering::SeqCst);
        let tracked = TrackedEngine::new(created?);
        let id = tracked.id();
        available.push(tracked);
        Ok(id)
    }

    /// Take back a lent engine.
    ///
    /// Unknown ids are ignored; engines are discarded when `retire` is set
    /// (work still in flight), the pool is shutting down, or the pool
    /// already holds `max_pool_size` idle engines.
    pub(crate) fn return_engine(self_arc: &Arc<Self>, tracked: TrackedEngine, retire: bool) {
        let id = tracked.id();

        let discarded = {
            let mut active = lock(&self_arc.active);
            let mut available = lock(&self_arc.available);

            if active.remove(&id).is_none() {
                log::warn!(
                    "❌ Engine {} not in active tracking (already returned?), ignoring",
                    id
                );
                Some(tracked)
            } else {
                self_arc.released.fetch_add(1, Ordering::SeqCst);

                if retire {
                    log::warn!("🗑️ Retiring engine {} with work still in flight", id);
                    Some(tracked)
                } else if self_arc.is_shutting_down() {
                    log::debug!("🛑 Pool shutting down, discarding engine {}", id);
                    Some(tracked)
                } else if available.len() < self_arc.config.max_pool_size {
                    available.push(tracked);
                    log::info!(
                        "♻️ Engine {} returned to pool (idle: {}/{})",
                        id,
                        available.len(),
                        self_arc.config.max_pool_size
                    );
                    None
                } else {
                    log::debug!("🗑️ Pool full, discarding engine {}", id);
                    Some(tracked)
                }
            }
        };

        // Engines can block while shutting down; never under the locks.
        drop(discarded);
    }

    fn stats(&self) -> PoolStats {
        let active = lock(&self.active).len();
        let available = lock(&self.available).len();
        PoolStats {
            available,
            active,
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }
}

// ============================================================================
// EnginePool
// ============================================================================

/// Handle to a shared engine pool. Clones refer to the same pool.
#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<EnginePoolInner>,
}

impl EnginePool {
    pub fn builder() -> EnginePoolBuilder {
        EnginePoolBuilder::new()
    }

    /// Borrow an engine.
    ///
    /// Makes `1 + max_retries` attempts, sleeping `retry_delay` before each
    /// retry (no backoff). An attempt reuses a healthy idle engine or
    /// creates a new one if the pool is below capacity; creation errors
    /// are retried like a full pool.
    ///
    /// Dropping the returned future mid-attempt is safe: an engine checked
    /// out by the abandoned attempt goes straight back to the pool.
    ///
    /// # Errors
    ///
    /// - [`PrintError::EngineUnavailable`] once every attempt failed
    /// - [`PrintError::ShuttingDown`] if the pool is shutting down
    pub async fn acquire(&self, max_retries: u32, retry_delay: Duration) -> Result<EngineLease> {
        let attempts = max_retries.saturating_add(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                log::debug!(
                    "⏳ No engine free, retry {}/{} in {:?}",
                    attempt - 1,
                    max_retries,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
            }

            let inner = Arc::clone(&self.inner);
            match tokio::task::spawn_blocking(move || inner.checkout()).await {
                Ok(Ok(Some(lease))) => {
                    log::debug!("🔑 Acquired engine {} on attempt {}", lease.id(), attempt);
                    return Ok(lease);
                }
                Ok(Ok(None)) => {
                    last_reason = format!("all {} engines busy", self.inner.config.max_pool_size);
                }
                Ok(Err(PrintError::ShuttingDown)) => return Err(PrintError::ShuttingDown),
                Ok(Err(e)) => last_reason = e.to_string(),
                Err(e) => last_reason = format!("checkout task failed: {}", e),
            }
        }

        log::error!(
            "❌ No engine after {} attempts: {}",
            attempts,
            last_reason
        );
        Err(PrintError::EngineUnavailable(format!(
            "no engine after {} attempts: {}",
            attempts, last_reason
        )))
    }

    /// Return a borrowed engine.
    ///
    /// The lease's load handler should already be detached.
    pub fn release(&self, lease: EngineLease) {
        if !Arc::ptr_eq(lease.pool(), &self.inner) {
            log::warn!(
                "⚠️ Engine {} released to a pool it was not borrowed from, returning to its owner",
                lease.id()
            );
        }
        lease.release();
    }

    pub fn stats(&self) -> PoolStats {
        let stats = self.inner.stats();
        log::trace!("📊 {}", stats);
        stats
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.inner.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.is_shutting_down()
    }

    /// Pre-create `warmup_count` idle engines.
    ///
    /// # Errors
    ///
    /// - [`PrintError::Timeout`] if warmup exceeds `warmup_timeout`
    /// - [`PrintError::EngineCreation`] if engines were requested and none
    ///   could be created
    pub async fn warmup(&self) -> Result<()> {
        let count = self.inner.config.warmup_count;
        let warmup_timeout = self.inner.config.warmup_timeout;

        log::info!(
            "🔥 Starting engine pool warmup with {} instances (timeout: {}s)",
            count,
            warmup_timeout.as_secs()
        );

        match tokio::time::timeout(warmup_timeout, self.warmup_internal(count)).await {
            Ok(Ok(created)) => {
                log::info!(
                    "✅ Warmup completed: {}/{} engines ready",
                    created,
                    count
                );
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("❌ Warmup failed: {}", e);
                Err(e)
            }
            Err(_) => {
                log::error!("❌ Warmup timed out after {}s", warmup_timeout.as_secs());
                Err(PrintError::Timeout(warmup_timeout))
            }
        }
    }

    async fn warmup_internal(&self, count: usize) -> Result<usize> {
        let mut created = 0;
        let mut last_error = None;

        for i in 0..count {
            let inner = Arc::clone(&self.inner);
            match tokio::task::spawn_blocking(move || inner.create_idle()).await {
                Ok(Ok(id)) => {
                    created += 1;
                    log::info!("✅ Warmup engine {} ready ({}/{})", id, i + 1, count);
                }
                Ok(Err(e)) => {
                    log::error!("❌ Failed to create warmup engine {}/{}: {}", i + 1, count, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    log::error!("❌ Warmup engine {}/{} task panicked: {:?}", i + 1, count, e);
                    last_error = Some(PrintError::Internal(e.to_string()));
                }
            }
        }

        match last_error {
            Some(e) if created == 0 => Err(PrintError::EngineCreation(format!(
                "warmup created no engines: {}",
                e
            ))),
            _ => Ok(created),
        }
    }

    /// Stop lending and discard idle engines.
    ///
    /// Engines still lent out are discarded when they come back.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            log::debug!("Pool already shut down");
            return;
        }
        log::info!("🛑 Shutting down engine pool...");

        let idle: Vec<TrackedEngine> = std::mem::take(&mut *lock(&self.inner.available));
        let discarded = idle.len();
        if let Err(e) = tokio::task::spawn_blocking(move || drop(idle)).await {
            log::error!("❌ Failed to discard idle engines: {}", e);
        }

        let stats = self.stats();
        log::info!(
            "✅ Pool shut down: {} idle engines discarded, {} still lent",
            discarded,
            stats.active
        );
    }
}

impl std::fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool")
            .field("stats", &self.inner.stats())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

// ============================================================================
// EnginePoolBuilder
// ============================================================================

/// Builder for [`EnginePool`].
pub struct EnginePoolBuilder {
    config: Option<PrinterConfig>,
    factory: Option<Box<dyn EngineFactory>>,
}

impl EnginePoolBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            factory: None,
        }
    }

    /// Pool limits; defaults to [`PrinterConfig::default`].
    pub fn config(mut self, config: PrinterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Required.
    pub fn factory(mut self, factory: Box<dyn EngineFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// # Errors
    ///
    /// [`PrintError::Configuration`] when no factory was given.
    pub fn build(self) -> Result<EnginePool> {
        let config = self.config.unwrap_or_default();
        let factory = self.factory.ok_or_else(|| {
            PrintError::Configuration("No engine factory provided".to_string())
        })?;

        log::debug!("🏗️ Building engine pool with config: {:?}", config);

        Ok(EnginePool {
            inner: EnginePoolInner::new(config, factory),
        })
    }
}

impl Default for EnginePoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
