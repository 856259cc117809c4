//! Rendering engine capability.
//!
//! A [`RenderEngine`] loads markup, measures the loaded content and prepares
//! a paginated layout for the [`PdfWriter`](crate::PdfWriter). Engines are
//! owned by the [`EnginePool`](crate::EnginePool) and borrowed for exactly
//! one job at a time through an [`EngineLease`](crate::EngineLease).
//!
//! Load completion is reported asynchronously through a [`LoadHandler`]
//! registered on the engine. Every load carries a caller-chosen [`LoadId`]
//! that its event echoes, so a handler can tell its own load from a late
//! notification of an earlier one. The handler is also detached
//! (`set_load_handler(None)`) before the engine goes back to the pool.
//!
//! # Available Engines
//!
//! | Engine | Description |
//! |--------|-------------|
//! | [`ChromeEngine`] | Headless Chrome/Chromium via CDP |
//! | [`mock::MockEngine`] | Scriptable engine for tests (feature-gated) |

mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chrome::{ChromeEngine, ImportedLayout};

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::document::{ContentSize, PageConfiguration};
use crate::error::Result;
use crate::traits::Healthcheck;
use crate::writer::PreparedLayout;

/// Identifies one [`load_markup`](RenderEngine::load_markup) call.
pub type LoadId = u64;

/// Outcome of a markup load, delivered to the registered [`LoadHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// Content and its resources finished loading.
    Finished { load: LoadId },
    /// Loading failed; carries the engine's reason.
    Failed { load: LoadId, reason: String },
}

impl LoadEvent {
    /// The load this event settles.
    pub fn load(&self) -> LoadId {
        match self {
            Self::Finished { load } | Self::Failed { load, .. } => *load,
        }
    }
}

/// Callback receiving load notifications.
///
/// May be invoked from any thread, at most once per
/// [`load_markup`](RenderEngine::load_markup) call.
pub type LoadHandler = Arc<dyn Fn(LoadEvent) + Send + Sync>;

/// A rendering engine that can be borrowed from the pool.
#[async_trait]
pub trait RenderEngine: Healthcheck + Send + Sync {
    /// Register, replace or (with `None`) detach the load handler.
    fn set_load_handler(&mut self, handler: Option<LoadHandler>);

    /// Start loading `markup` as load `load`.
    ///
    /// Returns once the load is under way. Completion is reported, tagged
    /// with `load`, through the load handler registered at the time the
    /// load settles; an `Err` here means the load could not be started at
    /// all.
    async fn load_markup(&mut self, load: LoadId, markup: &str, base_url: Option<&Url>) -> Result<()>;

    /// Natural size of the loaded content.
    async fn content_size(&mut self) -> Result<ContentSize>;

    /// Size of the engine's default viewport.
    ///
    /// Infallible; used as the measurement fallback.
    async fn viewport_size(&mut self) -> ContentSize;

    /// Lay out the loaded content on pages described by `page`.
    async fn prepare_layout(&mut self, page: &PageConfiguration) -> Result<Box<dyn PreparedLayout>>;
}
