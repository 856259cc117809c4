//! Health check for pooled engines.

use crate::error::Result;

/// A cheap liveness probe.
///
/// Called by the pool on a blocking thread right before an idle engine is
/// handed to a borrower. A failing engine is discarded and the pool moves
/// on to the next idle one, or creates a fresh engine.
///
/// ```rust
/// use markup2pdf::{Healthcheck, PrintError, Result};
///
/// struct Remote { reachable: bool }
///
/// impl Healthcheck for Remote {
///     fn ping(&self) -> Result<()> {
///         if self.reachable {
///             Ok(())
///         } else {
///             Err(PrintError::HealthCheckFailed("connection refused".into()))
///         }
///     }
/// }
///
/// assert!(Remote { reachable: true }.ping().is_ok());
/// ```
pub trait Healthcheck: Send + Sync {
    /// Returns `Err(PrintError::HealthCheckFailed)` when the engine is unusable.
    fn ping(&self) -> Result<()>;
}
