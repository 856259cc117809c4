//! Chrome/Chromium engine factory.

use headless_chrome::{Browser, LaunchOptions};

use super::EngineFactory;
use crate::engine::{ChromeEngine, RenderEngine};
use crate::error::{PrintError, Result};

/// Launches one headless Chrome process per engine.
///
/// ```rust,ignore
/// use markup2pdf::ChromeEngineFactory;
///
/// let auto = ChromeEngineFactory::with_defaults();
/// let pinned = ChromeEngineFactory::with_path("/usr/bin/chromium".to_string());
/// ```
pub struct ChromeEngineFactory {
    launch_options_fn: Box<dyn Fn() -> Result<LaunchOptions<'static>> + Send + Sync>,
}

impl ChromeEngineFactory {
    /// Factory using custom launch options.
    pub fn new<F>(launch_options_fn: F) -> Self
    where
        F: Fn() -> Result<LaunchOptions<'static>> + Send + Sync + 'static,
    {
        Self {
            launch_options_fn: Box::new(launch_options_fn),
        }
    }

    /// Auto-detect the Chrome binary.
    pub fn with_defaults() -> Self {
        log::debug!("🔧 Creating ChromeEngineFactory with auto-detect");
        Self::new(|| create_chrome_options(None))
    }

    pub fn with_path(chrome_path: String) -> Self {
        log::debug!("🔧 Creating ChromeEngineFactory with custom path: {}", chrome_path);
        Self::new(move || create_chrome_options(Some(&chrome_path)))
    }
}

impl EngineFactory for ChromeEngineFactory {
    fn create(&self) -> Result<Box<dyn RenderEngine>> {
        let options = (self.launch_options_fn)()?;

        log::debug!("🚀 Launching Chrome engine...");
        let browser = Browser::new(options).map_err(|e| {
            log::error!("❌ Chrome launch failed: {}", e);
            PrintError::EngineCreation(e.to_string())
        })?;

        Ok(Box::new(ChromeEngine::new(browser)?))
    }
}

impl std::fmt::Debug for ChromeEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeEngineFactory").finish_non_exhaustive()
    }
}

/// Launch options for a headless print engine.
///
/// Scripting stays enabled (content may need it to lay out) but everything
/// a print job never uses is switched off.
pub fn create_chrome_options(chrome_path: Option<&str>) -> Result<LaunchOptions<'static>> {
    let mut builder = LaunchOptions::default_builder();

    if let Some(path) = chrome_path {
        builder.path(Some(path.into()));
    }

    builder
        .headless(true)
        // Containers rarely allow the sandbox.
        .sandbox(false)
        .disable_default_args(true)
        .args(vec![
            "--disable-dev-shm-usage".as_ref(),
            "--disable-crash-reporter".as_ref(),
            "--disable-gpu".as_ref(),
            "--disable-extensions".as_ref(),
            "--disable-sync".as_ref(),
            "--disable-default-apps".as_ref(),
            "--no-first-run".as_ref(),
            "--mute-audio".as_ref(),
            "--hide-scrollbars".as_ref(),
            "--font-render-hinting=none".as_ref(),
            "--disable-background-timer-throttling".as_ref(),
            "--disable-renderer-backgrounding".as_ref(),
            "--disable-backgrounding-occluded-windows".as_ref(),
        ])
        .build()
        .map_err(|e| {
            log::error!(
                "❌ Failed to build Chrome launch options (path: {}): {}",
                chrome_path.unwrap_or("auto-detect"),
                e
            );
            PrintError::Configuration(e.to_string())
        })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_chrome_options() {
        let options = create_chrome_options(None).unwrap();
        assert!(options.headless);
        assert!(!options.sandbox);

        let options = create_chrome_options(Some("/opt/chromium/chrome")).unwrap();
        assert_eq!(
            options.path.as_deref(),
            Some(std::path::Path::new("/opt/chromium/chrome"))
        );
    }

    /// A bad options closure surfaces its error from `create` without
    /// launching anything.
    #[test]
    fn test_factory_propagates_option_errors() {
        let factory = ChromeEngineFactory::new(|| {
            Err(PrintError::Configuration("no chrome for you".to_string()))
        });
        match factory.create() {
            Err(PrintError::Configuration(msg)) => assert_eq!(msg, "no chrome for you"),
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }
}
