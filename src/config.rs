//! Configuration for the printer and its engine pool.
//!
//! This module provides [`PrinterConfig`] and [`PrinterConfigBuilder`] for
//! configuring pool size, acquisition backpressure, job deadlines and the
//! geometry used when engine-backed output is refitted to its content.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use markup2pdf::PrinterConfigBuilder;
//!
//! let config = PrinterConfigBuilder::new()
//!     .max_pool_size(4)
//!     .acquire_retries(8)
//!     .acquire_retry_delay(Duration::from_millis(200))
//!     .render_timeout(Duration::from_secs(30))
//!     .build()
//!     .expect("Invalid configuration");
//!
//! assert_eq!(config.max_pool_size, 4);
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, configuration can be loaded
//! from environment variables and an optional `app.env` file. See
//! [`mod@env`] for the variables.

use std::time::Duration;

use crate::document::A4_WIDTH;

/// Default job deadline.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for print jobs and the engine pool behind them.
///
/// # Fields Overview
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `max_pool_size` | 5 | Maximum engines in the pool |
/// | `warmup_count` | 0 | Engines to pre-create |
/// | `warmup_timeout` | 60s | Warmup time limit |
/// | `acquire_retries` | 8 | Acquisition retries after the first attempt |
/// | `acquire_retry_delay` | 200ms | Fixed delay before each retry |
/// | `render_timeout` | 30s | Default job deadline |
/// | `reference_paper_width` | 595pt | Paper width used to refit engine output |
/// | `create_parent_dirs` | true | Create missing destination directories |
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Maximum number of engines the pool owns (idle + checked out).
    ///
    /// Unlike a soft limit, acquisition never grows the pool beyond this;
    /// callers wait through the retry budget instead.
    pub max_pool_size: usize,

    /// Number of engines to create during [`EnginePool::warmup`](crate::EnginePool::warmup).
    ///
    /// Must be <= `max_pool_size`. Zero means engines are created on demand.
    pub warmup_count: usize,

    /// Maximum time allowed for warmup.
    pub warmup_timeout: Duration,

    /// How many times acquisition is retried after the first attempt.
    ///
    /// This is the only admission control against pool exhaustion.
    pub acquire_retries: u32,

    /// Fixed pause before each acquisition retry (no exponential backoff).
    pub acquire_retry_delay: Duration,

    /// Deadline applied to jobs that do not pass their own.
    pub render_timeout: Duration,

    /// Paper width, in points, that engine-backed output is rescaled from
    /// when it is fitted to its measured content.
    pub reference_paper_width: f64,

    /// Whether missing parent directories of the destination are created.
    pub create_parent_dirs: bool,
}

impl Default for PrinterConfig {
    /// Production-ready default configuration.
    ///
    /// ```rust
    /// use markup2pdf::PrinterConfig;
    /// use std::time::Duration;
    ///
    /// let config = PrinterConfig::default();
    /// assert_eq!(config.acquire_retries, 8);
    /// assert_eq!(config.acquire_retry_delay, Duration::from_millis(200));
    /// assert_eq!(config.render_timeout, Duration::from_secs(30));
    /// ```
    fn default() -> Self {
        Self {
            max_pool_size: 5,
            warmup_count: 0,
            warmup_timeout: Duration::from_secs(60),
            acquire_retries: 8,
            acquire_retry_delay: Duration::from_millis(200),
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            reference_paper_width: A4_WIDTH,
            create_parent_dirs: true,
        }
    }
}

/// Builder for [`PrinterConfig`] with validation.
///
/// # Validation
///
/// The [`build()`](Self::build) method validates:
/// - `max_pool_size` must be greater than 0
/// - `warmup_count` must be <= `max_pool_size`
/// - `render_timeout` must be non-zero
/// - `reference_paper_width` must be finite and positive
pub struct PrinterConfigBuilder {
    config: PrinterConfig,
}

impl PrinterConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: PrinterConfig::default(),
        }
    }

    /// Set maximum pool size (must be > 0).
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// Set warmup count (must be <= max_pool_size).
    pub fn warmup_count(mut self, count: usize) -> Self {
        self.config.warmup_count = count;
        self
    }

    pub fn warmup_timeout(mut self, timeout: Duration) -> Self {
        self.config.warmup_timeout = timeout;
        self
    }

    /// Set how many times acquisition is retried after the first attempt.
    ///
    /// ```rust
    /// use markup2pdf::PrinterConfigBuilder;
    ///
    /// let config = PrinterConfigBuilder::new().acquire_retries(0).build().unwrap();
    /// assert_eq!(config.acquire_retries, 0);
    /// ```
    pub fn acquire_retries(mut self, retries: u32) -> Self {
        self.config.acquire_retries = retries;
        self
    }

    pub fn acquire_retry_delay(mut self, delay: Duration) -> Self {
        self.config.acquire_retry_delay = delay;
        self
    }

    /// Set the default job deadline.
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.config.render_timeout = timeout;
        self
    }

    pub fn reference_paper_width(mut self, width: f64) -> Self {
        self.config.reference_paper_width = width;
        self
    }

    pub fn create_parent_dirs(mut self, create: bool) -> Self {
        self.config.create_parent_dirs = create;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated constraint.
    ///
    /// ```rust
    /// use markup2pdf::PrinterConfigBuilder;
    ///
    /// assert!(PrinterConfigBuilder::new().max_pool_size(0).build().is_err());
    /// assert!(PrinterConfigBuilder::new().max_pool_size(2).warmup_count(3).build().is_err());
    /// ```
    pub fn build(self) -> std::result::Result<PrinterConfig, String> {
        if self.config.max_pool_size == 0 {
            return Err("max_pool_size must be greater than 0".to_string());
        }

        if self.config.warmup_count > self.config.max_pool_size {
            return Err("warmup_count cannot exceed max_pool_size".to_string());
        }

        if self.config.render_timeout.is_zero() {
            return Err("render_timeout must be greater than 0".to_string());
        }

        let width = self.config.reference_paper_width;
        if !width.is_finite() || width <= 0.0 {
            return Err("reference_paper_width must be a positive number".to_string());
        }

        Ok(self.config)
    }
}

impl Default for PrinterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Environment Configuration (feature-gated)
// ============================================================================

/// Environment-based configuration loading.
///
/// This module is only available when the `env-config` feature is enabled.
/// It uses `dotenvy` to load an optional `app.env` file from the current
/// directory before reading variables.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `PRINT_POOL_SIZE` | usize | 5 | Maximum pool size |
/// | `PRINT_WARMUP_COUNT` | usize | 0 | Engines created at startup |
/// | `PRINT_WARMUP_TIMEOUT_SECONDS` | u64 | 60 | Warmup timeout |
/// | `PRINT_ACQUIRE_RETRIES` | u32 | 8 | Acquisition retries |
/// | `PRINT_ACQUIRE_RETRY_DELAY_MS` | u64 | 200 | Delay between retries |
/// | `PRINT_TIMEOUT_SECONDS` | u64 | 30 | Default job deadline |
/// | `PRINT_REFERENCE_PAPER_WIDTH` | f64 | 595 | Refit reference width (pt) |
/// | `PRINT_CREATE_PARENT_DIRS` | bool (`1`/`0`, `yes`/`no`, ...) | true | Create destination dirs |
/// | `CHROME_PATH` | String | auto | Custom Chrome binary path |
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;
    use crate::error::PrintError;

    /// Default environment file name.
    pub const ENV_FILE_NAME: &str = "app.env";

    /// Load environment variables from the `app.env` file.
    pub fn load_env_file() -> Result<std::path::PathBuf, dotenvy::Error> {
        dotenvy::from_filename(ENV_FILE_NAME)
    }

    fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
        let raw = std::env::var(name).ok()?;
        let parsed = raw.trim().parse().ok();
        if parsed.is_none() {
            log::warn!("⚠️ Ignoring unparsable {}={:?}, using default", name, raw);
        }
        parsed
    }

    fn flag(name: &str) -> Option<bool> {
        let raw = std::env::var(name).ok()?;
        let parsed = parse_flag(&raw);
        if parsed.is_none() {
            log::warn!("⚠️ Ignoring unparsable {}={:?}, using default", name, raw);
        }
        parsed
    }

    /// Parse `true`/`false`, `1`/`0`, `yes`/`no` or `on`/`off`, ignoring case.
    pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to the defaults above; unparsable ones
    /// too, with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PrintError::Configuration`] if the resulting values are
    /// invalid.
    pub fn from_env() -> Result<PrinterConfig, PrintError> {
        match load_env_file() {
            Ok(path) => log::info!("Loaded configuration from: {:?}", path),
            Err(e) => log::debug!(
                "No {} file found or failed to load: {} (using environment variables and defaults)",
                ENV_FILE_NAME,
                e
            ),
        }

        let defaults = PrinterConfig::default();

        let max_pool_size = var("PRINT_POOL_SIZE").unwrap_or(defaults.max_pool_size);
        let warmup_count = var("PRINT_WARMUP_COUNT").unwrap_or(defaults.warmup_count);
        let warmup_timeout = var::<u64>("PRINT_WARMUP_TIMEOUT_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.warmup_timeout);
        let acquire_retries = var("PRINT_ACQUIRE_RETRIES").unwrap_or(defaults.acquire_retries);
        let acquire_retry_delay = var::<u64>("PRINT_ACQUIRE_RETRY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.acquire_retry_delay);
        let render_timeout = var::<u64>("PRINT_TIMEOUT_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.render_timeout);
        let reference_paper_width =
            var("PRINT_REFERENCE_PAPER_WIDTH").unwrap_or(defaults.reference_paper_width);
        let create_parent_dirs =
            flag("PRINT_CREATE_PARENT_DIRS").unwrap_or(defaults.create_parent_dirs);

        log::info!("Loading printer configuration from environment:");
        log::info!("   - Max pool size: {}", max_pool_size);
        log::info!("   - Warmup count: {}", warmup_count);
        log::info!(
            "   - Acquire retries: {} x {}ms",
            acquire_retries,
            acquire_retry_delay.as_millis()
        );
        log::info!("   - Render timeout: {}s", render_timeout.as_secs());
        log::info!("   - Reference paper width: {}pt", reference_paper_width);

        PrinterConfigBuilder::new()
            .max_pool_size(max_pool_size)
            .warmup_count(warmup_count)
            .warmup_timeout(warmup_timeout)
            .acquire_retries(acquire_retries)
            .acquire_retry_delay(acquire_retry_delay)
            .render_timeout(render_timeout)
            .reference_paper_width(reference_paper_width)
            .create_parent_dirs(create_parent_dirs)
            .build()
            .map_err(PrintError::Configuration)
    }

    /// Get the Chrome binary path from `CHROME_PATH`, if set.
    pub fn chrome_path_from_env() -> Option<String> {
        std::env::var("CHROME_PATH").ok()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies that the builder sets every value.
    #[test]
    fn test_config_builder_chaining() {
        let config = PrinterConfigBuilder::new()
            .max_pool_size(8)
            .warmup_count(2)
            .warmup_timeout(Duration::from_secs(90))
            .acquire_retries(3)
            .acquire_retry_delay(Duration::from_millis(50))
            .render_timeout(Duration::from_secs(5))
            .reference_paper_width(612.0)
            .create_parent_dirs(false)
            .build()
            .unwrap();

        assert_eq!(config.max_pool_size, 8);
        assert_eq!(config.warmup_count, 2);
        assert_eq!(config.warmup_timeout.as_secs(), 90);
        assert_eq!(config.acquire_retries, 3);
        assert_eq!(config.acquire_retry_delay.as_millis(), 50);
        assert_eq!(config.render_timeout.as_secs(), 5);
        assert_eq!(config.reference_paper_width, 612.0);
        assert!(!config.create_parent_dirs);
    }

    #[test]
    fn test_config_validation_pool_size() {
        let err = PrinterConfigBuilder::new().max_pool_size(0).build().unwrap_err();
        assert!(err.contains("max_pool_size must be greater than 0"));
    }

    #[test]
    fn test_config_warmup_exceeds_pool() {
        let err = PrinterConfigBuilder::new()
            .max_pool_size(2)
            .warmup_count(5)
            .build()
            .unwrap_err();
        assert!(err.contains("warmup_count cannot exceed max_pool_size"));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let result = PrinterConfigBuilder::new()
            .render_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_bad_reference_width() {
        assert!(PrinterConfigBuilder::new().reference_paper_width(0.0).build().is_err());
        assert!(
            PrinterConfigBuilder::new()
                .reference_paper_width(f64::NAN)
                .build()
                .is_err()
        );
    }

    /// The defaults match the documented admission-control budget:
    /// 8 retries at a fixed 200ms.
    #[test]
    fn test_config_defaults() {
        let config = PrinterConfig::default();
        assert_eq!(config.max_pool_size, 5);
        assert_eq!(config.warmup_count, 0);
        assert_eq!(config.acquire_retries, 8);
        assert_eq!(config.acquire_retry_delay, Duration::from_millis(200));
        assert_eq!(config.render_timeout, DEFAULT_RENDER_TIMEOUT);
        assert_eq!(config.reference_paper_width, A4_WIDTH);
        assert!(config.create_parent_dirs);
    }

    #[cfg(feature = "env-config")]
    #[test]
    fn test_parse_flag_common_forms() {
        use super::env::parse_flag;

        for yes in ["1", "true", "TRUE", "yes", " on "] {
            assert_eq!(parse_flag(yes), Some(true), "{:?}", yes);
        }
        for no in ["0", "false", "No", "off"] {
            assert_eq!(parse_flag(no), Some(false), "{:?}", no);
        }
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_flag(""), None);
    }
}
