//! Headless Chrome/Chromium engine.
//!
//! Each [`ChromeEngine`] owns one browser process and one working tab.
//! Markup is loaded through a `data:` URL, measured with a small script and
//! printed with the DevTools `Page.printToPDF` command. The resulting PDF
//! pages are imported into the writer's canvas by [`ImportedLayout`].
//!
//! All CDP calls block, so every one of them runs on tokio's blocking pool.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, Tab};
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use lopdf::{Document as PdfDocument, ObjectId};
use url::Url;

use super::{LoadEvent, LoadHandler, LoadId, RenderEngine};
use crate::document::{ContentSize, PageConfiguration};
use crate::error::{PrintError, Result};
use crate::traits::Healthcheck;
use crate::writer::{PdfCanvas, PreparedLayout};

/// Viewport reported when the tab cannot be queried.
const FALLBACK_VIEWPORT: ContentSize = ContentSize::new(800.0, 600.0);

/// CSS pixels per point.
const PX_PER_PT: f64 = 96.0 / 72.0;

const MEASURE_SCRIPT: &str = "JSON.stringify({\
    width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),\
    height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)\
})";

const VIEWPORT_SCRIPT: &str = "JSON.stringify({width: window.innerWidth, height: window.innerHeight})";

/// Rendering engine backed by a headless Chrome process.
pub struct ChromeEngine {
    browser: Arc<Browser>,
    tab: Arc<Tab>,
    handler: Arc<Mutex<Option<LoadHandler>>>,
    measured: Option<ContentSize>,
}

impl ChromeEngine {
    /// Wrap a freshly launched browser.
    ///
    /// Opens the working tab and checks that it can navigate before the
    /// engine is accepted, so dead browsers never enter the pool.
    ///
    /// # Errors
    ///
    /// [`PrintError::EngineCreation`] if the tab cannot be opened or used.
    pub fn new(browser: Browser) -> Result<Self> {
        log::debug!("🔍 Validating new Chrome engine...");

        let tab = browser.new_tab().map_err(|e| {
            log::error!("❌ Engine validation failed at new_tab(): {}", e);
            PrintError::EngineCreation(e.to_string())
        })?;

        if let Err(e) = tab.navigate_to("data:text/html,<html></html>") {
            log::error!("❌ Engine validation failed at navigate_to(): {}", e);
            close_tab_safely(&tab);
            return Err(PrintError::EngineCreation(e.to_string()));
        }

        log::debug!("✅ Chrome engine validation passed");

        Ok(Self {
            browser: Arc::new(browser),
            tab,
            handler: Arc::new(Mutex::new(None)),
            measured: None,
        })
    }

    fn current_handler(slot: &Mutex<Option<LoadHandler>>) -> Option<LoadHandler> {
        match slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Print scale that maps the measured content width onto the paper.
    fn print_scale(&self, paper_width: f64) -> Option<f64> {
        self.measured
            .filter(ContentSize::is_usable)
            .map(|content| (paper_width * PX_PER_PT / content.width).clamp(0.1, 2.0))
    }

    async fn evaluate_size(&self, script: &'static str) -> Result<ContentSize> {
        let tab = Arc::clone(&self.tab);
        let value = run_blocking(move || {
            tab.evaluate(script, false)
                .map(|object| object.value)
                .map_err(|e| PrintError::Format(format!("script evaluation failed: {}", e)))
        })
        .await?;

        let json = value
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| PrintError::Format("script returned no dimensions".to_string()))?;
        parse_dimensions(json)
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    fn set_load_handler(&mut self, handler: Option<LoadHandler>) {
        match self.handler.lock() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    async fn load_markup(&mut self, load: LoadId, markup: &str, base_url: Option<&Url>) -> Result<()> {
        let markup = with_base_href(markup, base_url)?;
        let url = format!("data:text/html;charset=utf-8,{}", urlencoding::encode(&markup));
        log::debug!("🌐 Load {}: {} bytes of markup", load, markup.len());

        self.measured = None;
        let tab = Arc::clone(&self.tab);
        let slot = Arc::clone(&self.handler);

        // Detached: the outcome goes to whichever handler is registered
        // when navigation settles, tagged with `load`.
        tokio::task::spawn_blocking(move || {
            let event = match tab.navigate_to(&url).and_then(|t| t.wait_until_navigated()) {
                Ok(_) => LoadEvent::Finished { load },
                Err(e) => {
                    log::warn!("❌ Navigation for load {} failed: {}", load, e);
                    LoadEvent::Failed {
                        load,
                        reason: e.to_string(),
                    }
                }
            };

            match Self::current_handler(&slot) {
                Some(handler) => handler(event),
                None => log::debug!("Load settled after handler was detached: {:?}", event),
            }
        });

        Ok(())
    }

    async fn content_size(&mut self) -> Result<ContentSize> {
        let size = self.evaluate_size(MEASURE_SCRIPT).await?;
        self.measured = Some(size);
        Ok(size)
    }

    async fn viewport_size(&mut self) -> ContentSize {
        match self.evaluate_size(VIEWPORT_SCRIPT).await {
            Ok(size) if size.is_usable() => size,
            Ok(size) => {
                log::warn!("⚠️ Unusable viewport {:?}, using {:?}", size, FALLBACK_VIEWPORT);
                FALLBACK_VIEWPORT
            }
            Err(e) => {
                log::warn!("⚠️ Viewport query failed ({}), using {:?}", e, FALLBACK_VIEWPORT);
                FALLBACK_VIEWPORT
            }
        }
    }

    async fn prepare_layout(&mut self, page: &PageConfiguration) -> Result<Box<dyn PreparedLayout>> {
        let options = print_options(page, self.print_scale(page.paper_rect().width));
        let tab = Arc::clone(&self.tab);

        let bytes = run_blocking(move || {
            tab.print_to_pdf(Some(options)).map_err(|e| {
                log::error!("❌ Failed to print page: {}", e);
                PrintError::Format(e.to_string())
            })
        })
        .await?;

        log::debug!("📄 Engine produced {} bytes of PDF", bytes.len());
        Ok(Box::new(ImportedLayout::from_pdf(&bytes)?))
    }
}

impl Healthcheck for ChromeEngine {
    fn ping(&self) -> Result<()> {
        let tab = self.browser.new_tab().map_err(|e| {
            log::warn!("❌ Chrome ping failed (new_tab): {}", e);
            PrintError::HealthCheckFailed(e.to_string())
        })?;
        close_tab_safely(&tab);
        Ok(())
    }
}

impl Drop for ChromeEngine {
    fn drop(&mut self) {
        close_tab_safely(&self.tab);
    }
}

impl std::fmt::Debug for ChromeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeEngine")
            .field("measured", &self.measured)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PrintError::Internal(format!("engine task failed: {}", e)))?
}

fn close_tab_safely(tab: &Tab) {
    if let Err(e) = tab.close(true) {
        log::warn!("Failed to close tab (continuing anyway): {}", e);
    }
}

/// Insert `<base href>` so relative references resolve against `base_url`.
///
/// Goes into `head` when there is one, otherwise in front of the markup.
fn with_base_href(markup: &str, base_url: Option<&Url>) -> Result<String> {
    let Some(base) = base_url else {
        return Ok(markup.to_string());
    };
    let tag = format!("<base href=\"{}\">", base.as_str());
    let injected = Rc::new(RefCell::new(false));

    let rewritten = rewrite_str(
        markup,
        RewriteStrSettings {
            element_content_handlers: vec![element!("head", {
                let injected = Rc::clone(&injected);
                let tag = tag.clone();
                move |el| {
                    if !*injected.borrow() {
                        el.prepend(&tag, ContentType::Html);
                        *injected.borrow_mut() = true;
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| PrintError::Load(e.to_string()))?;

    if *injected.borrow() {
        Ok(rewritten)
    } else {
        Ok(format!("{}{}", tag, rewritten))
    }
}

fn parse_dimensions(json: &str) -> Result<ContentSize> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| PrintError::Format(e.to_string()))?;
    let dimension = |key: &str| {
        value
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| PrintError::Format(format!("missing {} in {}", key, json)))
    };
    Ok(ContentSize::new(dimension("width")?, dimension("height")?))
}

/// Page setup for `Page.printToPDF`. CDP takes inches.
fn print_options(page: &PageConfiguration, scale: Option<f64>) -> PrintToPdfOptions {
    let rect = page.paper_rect();
    let inches = |points: f64| Some(points / 72.0);

    PrintToPdfOptions {
        // The rect already has the orientation applied.
        landscape: Some(false),
        display_header_footer: Some(false),
        print_background: Some(true),
        scale,
        paper_width: inches(rect.width),
        paper_height: inches(rect.height),
        margin_top: inches(page.margins.top),
        margin_bottom: inches(page.margins.bottom),
        margin_left: inches(page.margins.left),
        margin_right: inches(page.margins.right),
        prefer_css_page_size: Some(false),
        ..Default::default()
    }
}

// ============================================================================
// ImportedLayout
// ============================================================================

/// Layout made of pages from an existing PDF.
pub struct ImportedLayout {
    source: PdfDocument,
    pages: Vec<ObjectId>,
}

impl ImportedLayout {
    /// Parse `bytes` as PDF and take its pages in order.
    ///
    /// # Errors
    ///
    /// [`PrintError::Format`] if the bytes are not a readable PDF.
    pub fn from_pdf(bytes: &[u8]) -> Result<Self> {
        let source = PdfDocument::load_mem(bytes)?;
        let pages = source.get_pages().into_values().collect();
        Ok(Self { source, pages })
    }
}

impl PreparedLayout for ImportedLayout {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn paint_page(&self, index: usize, canvas: &mut PdfCanvas) -> Result<()> {
        let page_id = self.pages.get(index).copied().ok_or_else(|| {
            PrintError::Format(format!(
                "page {} out of range ({} pages)",
                index,
                self.pages.len()
            ))
        })?;
        canvas.import_page(&self.source, page_id)
    }
}

impl std::fmt::Debug for ImportedLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedLayout")
            .field("pages", &self.pages.len())
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
