//! RAII lease on a pooled engine.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::RenderEngine;
use crate::pool::EnginePoolInner;
use crate::tracked::TrackedEngine;

/// Exclusive loan of one engine from an [`EnginePool`](crate::EnginePool).
///
/// Derefs to [`RenderEngine`]. Hand it back with
/// [`EnginePool::release`](crate::EnginePool::release); a lease that is
/// dropped instead (for instance because the future holding it was
/// dropped) detaches the engine's load handler and returns it itself, so
/// the engine is released exactly once either way.
///
/// A lease marked [busy](Self::set_busy) when it is released has engine
/// work that may still be running; the pool retires that engine instead of
/// lending it again.
pub struct EngineLease {
    /// `None` only once the engine went back to the pool.
    tracked: Option<TrackedEngine>,

    pool: Arc<EnginePoolInner>,

    busy: bool,
}

impl EngineLease {
    pub(crate) fn new(tracked: TrackedEngine, pool: Arc<EnginePoolInner>) -> Self {
        Self {
            tracked: Some(tracked),
            pool,
            busy: false,
        }
    }

    /// Pool-assigned engine id.
    pub fn id(&self) -> u64 {
        self.tracked.as_ref().map(TrackedEngine::id).unwrap_or(0)
    }

    /// Time since the engine was created.
    pub fn age(&self) -> Duration {
        self.tracked
            .as_ref()
            .map(TrackedEngine::age)
            .unwrap_or_default()
    }

    /// Mark whether an engine call or load is in flight.
    ///
    /// Set before starting engine work and cleared once it settled. If the
    /// job is abandoned in between, the flag stays set.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Give the engine back to the pool it came from.
    pub(crate) fn release(mut self) {
        if let Some(tracked) = self.tracked.take() {
            log::debug!("🔙 Releasing engine {} (busy: {})", tracked.id(), self.busy);
            EnginePoolInner::return_engine(&self.pool, tracked, self.busy);
        }
    }

    pub(crate) fn pool(&self) -> &Arc<EnginePoolInner> {
        &self.pool
    }
}

impl std::ops::Deref for EngineLease {
    type Target = dyn RenderEngine;

    fn deref(&self) -> &Self::Target {
        self.tracked
            .as_ref()
            .expect("engine lease used after release")
            .engine()
    }
}

impl std::ops::DerefMut for EngineLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracked
            .as_mut()
            .expect("engine lease used after release")
            .engine_mut()
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if let Some(mut tracked) = self.tracked.take() {
            log::warn!(
                "⚠️ Lease on engine {} dropped without release, returning to pool",
                tracked.id()
            );
            tracked.engine_mut().set_load_handler(None);
            EnginePoolInner::return_engine(&self.pool, tracked, self.busy);
        }
    }
}

impl std::fmt::Debug for EngineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tracked {
            Some(tracked) => f
                .debug_struct("EngineLease")
                .field("id", &tracked.id())
                .field("age", &tracked.age())
                .field("busy", &self.busy)
                .finish(),
            None => f
                .debug_struct("EngineLease")
                .field("state", &"released")
                .finish(),
        }
    }
}
