//! Error types for print jobs.
//!
//! This module provides [`PrintError`], a unified error type for every
//! print operation (strategy selection never fails, so it has none), and a
//! convenient [`Result`] type alias.
//!
//! # Example
//!
//! ```rust
//! use markup2pdf::{PrintError, Result};
//!
//! fn render() -> Result<()> {
//!     Err(PrintError::Load("net::ERR_NAME_NOT_RESOLVED".to_string()))
//! }
//!
//! match render() {
//!     Ok(()) => println!("written"),
//!     Err(PrintError::Cancelled) => println!("caller gave up"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::time::Duration;

/// Errors that can terminate a print job.
///
/// Every variant is terminal for the job that produced it. The only
/// operation retried internally is engine acquisition, and its exhaustion
/// surfaces as [`PrintError::EngineUnavailable`].
///
/// # Example
///
/// ```rust
/// use markup2pdf::PrintError;
/// use std::time::Duration;
///
/// fn describe(error: &PrintError) -> &'static str {
///     match error {
///         PrintError::EngineUnavailable(_) => "pool exhausted",
///         PrintError::Timeout(_) => "too slow",
///         PrintError::Cancelled => "abandoned",
///         _ => "failed",
///     }
/// }
///
/// assert_eq!(describe(&PrintError::Timeout(Duration::from_secs(1))), "too slow");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum PrintError {
    /// No engine could be borrowed from the pool within the retry budget.
    ///
    /// # Common Causes
    ///
    /// - Every engine is checked out by other jobs
    /// - The pool is at `max_pool_size` and replacements keep failing
    ///
    /// # Example
    ///
    /// ```rust
    /// use markup2pdf::PrintError;
    ///
    /// let error = PrintError::EngineUnavailable("8 retries exhausted".to_string());
    /// assert_eq!(error.to_string(), "Rendering engine unavailable: 8 retries exhausted");
    /// ```
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine factory failed to create a new instance.
    ///
    /// Typically a missing or broken Chrome/Chromium binary.
    #[error("Failed to create rendering engine: {0}")]
    EngineCreation(String),

    /// An engine failed its health check when it was checked out.
    #[error("Engine health check failed: {0}")]
    HealthCheckFailed(String),

    /// The engine reported that the document content failed to load.
    ///
    /// Network and resource errors encountered while loading embedded
    /// resources end up here.
    #[error("Content failed to load: {0}")]
    Load(String),

    /// The job did not complete before its deadline.
    #[error("Render job timed out after {0:?}")]
    Timeout(Duration),

    /// Measuring or formatting the loaded content failed.
    #[error("Formatting failed: {0}")]
    Format(String),

    /// The destination could not be created or written.
    ///
    /// The destination file is left untouched when this error is returned.
    #[error("Failed to write PDF: {0}")]
    Write(String),

    /// The job was cancelled by its caller.
    ///
    /// Cleanup still runs; this is not a generic failure and is never
    /// retried.
    #[error("Render job was cancelled")]
    Cancelled,

    /// The engine pool is shutting down.
    #[error("Engine pool is shutting down")]
    ShuttingDown,

    /// Invalid configuration provided.
    ///
    /// # Common Causes
    ///
    /// - `max_pool_size` is set to 0
    /// - `warmup_count` exceeds `max_pool_size`
    /// - A zero render timeout
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A task backing the job panicked or vanished.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrintError {
    /// Returns `true` when the job ended because its caller cancelled it.
    ///
    /// Callers usually treat cancellation as a non-event rather than a
    /// failure worth reporting.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PrintError::Cancelled)
    }

    /// Stable machine-readable code for this error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use markup2pdf::PrintError;
    ///
    /// assert_eq!(PrintError::Cancelled.error_code(), "CANCELLED");
    /// ```
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            Self::EngineCreation(_) => "ENGINE_CREATION_FAILED",
            Self::HealthCheckFailed(_) => "HEALTH_CHECK_FAILED",
            Self::Load(_) => "LOAD_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Format(_) => "FORMAT_FAILED",
            Self::Write(_) => "WRITE_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Convenience conversion from [`String`] to [`PrintError::Configuration`].
///
/// Allows using the `?` operator with functions that return `String` errors,
/// such as [`PrinterConfigBuilder::build`](crate::PrinterConfigBuilder::build).
impl From<String> for PrintError {
    fn from(msg: String) -> Self {
        PrintError::Configuration(msg)
    }
}

/// Convenience conversion from `&str` to [`PrintError::Configuration`].
impl From<&str> for PrintError {
    fn from(msg: &str) -> Self {
        PrintError::Configuration(msg.to_string())
    }
}

impl From<lopdf::Error> for PrintError {
    fn from(err: lopdf::Error) -> Self {
        PrintError::Format(err.to_string())
    }
}

/// Result type alias using [`PrintError`].
pub type Result<T> = std::result::Result<T, PrintError>;

// ============================================================================
// Unit Tests
// ============================================================================
