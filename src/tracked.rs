//! Engine with pool bookkeeping attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::engine::RenderEngine;
use crate::error::Result;
use crate::traits::Healthcheck;

/// A pooled engine: the engine itself plus a process-unique id and its
/// creation time.
pub(crate) struct TrackedEngine {
    id: u64,
    engine: Box<dyn RenderEngine>,
    created_at: Instant,
}

impl TrackedEngine {
    pub(crate) fn new(engine: Box<dyn RenderEngine>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            engine,
            created_at: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn engine(&self) -> &(dyn RenderEngine + 'static) {
        self.engine.as_ref()
    }

    #[inline]
    pub(crate) fn engine_mut(&mut self) -> &mut (dyn RenderEngine + 'static) {
        self.engine.as_mut()
    }

    #[inline]
    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Healthcheck for TrackedEngine {
    fn ping(&self) -> Result<()> {
        log::trace!("🔍 Pinging engine {}...", self.id);
        self.engine.ping().inspect_err(|e| {
            log::warn!("❌ Engine {} ping failed: {}", self.id, e);
        })
    }
}

impl std::fmt::Debug for TrackedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedEngine")
            .field("id", &self.id)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
