//! Engine factories.
//!
//! The pool creates engines on demand through an [`EngineFactory`], which
//! keeps launch details (binary path, flags) out of the pool and lets tests
//! substitute scripted engines.
//!
//! | Factory | Description |
//! |---------|-------------|
//! | [`ChromeEngineFactory`] | Launches headless Chrome/Chromium |
//! | [`mock::MockEngineFactory`] | Scripted engines for tests (feature-gated) |
//!
//! # Custom Factory
//!
//! ```rust,ignore
//! use markup2pdf::{EngineFactory, RenderEngine, Result};
//!
//! struct PooledRemoteFactory { endpoint: String }
//!
//! impl EngineFactory for PooledRemoteFactory {
//!     fn create(&self) -> Result<Box<dyn RenderEngine>> {
//!         // connect to a remote engine here
//!         todo!()
//!     }
//! }
//! ```

mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chrome::{ChromeEngineFactory, create_chrome_options};

use crate::engine::RenderEngine;
use crate::error::Result;

/// Creates rendering engines for the pool.
///
/// Shared across threads by the pool; `create` is called from tokio's
/// blocking pool and may block.
pub trait EngineFactory: Send + Sync {
    /// Create a new, validated engine.
    ///
    /// # Errors
    ///
    /// - [`PrintError::Configuration`](crate::PrintError::Configuration) for
    ///   invalid launch options
    /// - [`PrintError::EngineCreation`](crate::PrintError::EngineCreation)
    ///   when the engine cannot be started
    fn create(&self) -> Result<Box<dyn RenderEngine>>;
}
