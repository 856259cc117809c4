//! Mock engine factory for testing.
//!
//! Produces [`MockEngine`]s, so pool and session behavior can be tested
//! without Chrome installed. Every engine from one factory shares the
//! factory's [`EngineProbe`].
//!
//! # Example
//!
//! ```rust
//! use markup2pdf::EngineFactory;
//! use markup2pdf::factory::mock::MockEngineFactory;
//!
//! let factory = MockEngineFactory::fail_after_n(2, "out of memory");
//! assert!(factory.create().is_ok());
//! assert!(factory.create().is_ok());
//! assert!(factory.create().is_err());
//! assert_eq!(factory.creation_count(), 3);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::EngineFactory;
use crate::engine::RenderEngine;
use crate::engine::mock::{EngineProbe, MockBehavior, MockEngine};
use crate::error::{PrintError, Result};

/// Factory for scripted engines.
pub struct MockEngineFactory {
    behavior: MockBehavior,
    probe: EngineProbe,

    /// Fail every creation with `error_message`.
    should_fail: bool,

    error_message: String,

    /// Creation attempts, shared with [`counter`](Self::counter).
    creation_count: Arc<AtomicUsize>,

    /// Fail once this many engines were created.
    fail_after: Option<usize>,
}

impl MockEngineFactory {
    /// Factory whose engines follow the default [`MockBehavior`].
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            probe: EngineProbe::new(),
            should_fail: false,
            error_message: String::new(),
            creation_count: Arc::new(AtomicUsize::new(0)),
            fail_after: None,
        }
    }

    /// Factory that never produces an engine.
    pub fn always_fails<S: Into<String>>(message: S) -> Self {
        Self {
            should_fail: true,
            error_message: message.into(),
            ..Self::new()
        }
    }

    /// Factory that fails after `n` successful creations.
    pub fn fail_after_n<S: Into<String>>(n: usize, message: S) -> Self {
        Self {
            error_message: message.into(),
            fail_after: Some(n),
            ..Self::new()
        }
    }

    /// Replace the behavior of engines created from now on.
    pub fn behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Probe shared by every engine this factory creates.
    pub fn probe(&self) -> EngineProbe {
        self.probe.clone()
    }

    pub fn creation_count(&self) -> usize {
        self.creation_count.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) {
        self.creation_count.store(0, Ordering::SeqCst);
    }

    /// Creation counter that stays readable after the factory moved into a pool.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.creation_count)
    }
}

impl Default for MockEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self) -> Result<Box<dyn RenderEngine>> {
        let count = self.creation_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            log::debug!("MockEngineFactory: returning configured failure");
            return Err(PrintError::EngineCreation(self.error_message.clone()));
        }

        if let Some(limit) = self.fail_after
            && count >= limit
        {
            log::debug!("MockEngineFactory: failing after {} creations", limit);
            return Err(PrintError::EngineCreation(self.error_message.clone()));
        }

        log::debug!("MockEngineFactory: creating mock engine #{}", count + 1);
        Ok(Box::new(MockEngine::new(
            self.behavior.clone(),
            self.probe.clone(),
        )))
    }
}

impl std::fmt::Debug for MockEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngineFactory")
            .field("behavior", &self.behavior)
            .field("should_fail", &self.should_fail)
            .field("error_message", &self.error_message)
            .field("creation_count", &self.creation_count())
            .field("fail_after", &self.fail_after)
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
