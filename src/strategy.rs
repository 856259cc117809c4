//! Rendering strategy selection.
//!
//! Documents whose markup references remote images need a full rendering
//! engine to fetch and lay them out; everything else can be formatted
//! directly without touching the engine pool.
//!
//! Selection is a pure function of the document content: the same markup
//! and base URL always yield the same [`Strategy`].

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use url::Url;

use crate::document::{Document, PageConfiguration};

/// How a document is turned into PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Strategy {
    /// Synchronous static layout; no engine, no scripting, no resource loading.
    Direct,
    /// Full engine render through the pool.
    EngineBacked,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Direct => f.write_str("direct"),
            Strategy::EngineBacked => f.write_str("engine-backed"),
        }
    }
}

/// Inspection could not reach a verdict.
///
/// Never escapes [`StrategySelector::choose_strategy`]; the selector logs it
/// and falls back to [`Strategy::Direct`].
#[derive(Debug, thiserror::Error)]
#[error("Markup inspection failed: {0}")]
pub struct InspectionError(pub String);

/// Decides whether markup needs a full rendering engine.
pub trait ContentInspector: Send + Sync {
    /// Returns `Ok(true)` when `markup` can only be rendered by an engine.
    fn requires_engine(
        &self,
        markup: &str,
        base_url: Option<&Url>,
    ) -> std::result::Result<bool, InspectionError>;
}

/// Flags markup that embeds images served over HTTP(S).
///
/// An `img` counts as remote when its `src` is an absolute `http`/`https`
/// URL, or a relative reference that resolves to one against the page base
/// URL. Inline `data:` images and relative paths without a remote base stay
/// direct.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteImageInspector;

impl RemoteImageInspector {
    fn is_remote(src: &str, base_url: Option<&Url>) -> bool {
        let src = src.trim();
        if src.is_empty() {
            return false;
        }

        let resolved = match Url::parse(src) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                base_url.and_then(|base| base.join(src).ok())
            }
            Err(_) => None,
        };

        matches!(
            resolved.as_ref().map(Url::scheme),
            Some("http") | Some("https")
        )
    }
}

impl ContentInspector for RemoteImageInspector {
    fn requires_engine(
        &self,
        markup: &str,
        base_url: Option<&Url>,
    ) -> std::result::Result<bool, InspectionError> {
        let found = Rc::new(RefCell::new(false));

        rewrite_str(
            markup,
            RewriteStrSettings {
                element_content_handlers: vec![element!("img[src]", {
                    let found = Rc::clone(&found);
                    move |el| {
                        if let Some(src) = el.get_attribute("src")
                            && Self::is_remote(&src, base_url)
                        {
                            *found.borrow_mut() = true;
                        }
                        Ok(())
                    }
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|e| InspectionError(e.to_string()))?;

        Ok(*found.borrow())
    }
}

/// Chooses a [`Strategy`] for each document.
pub struct StrategySelector {
    inspector: Box<dyn ContentInspector>,
}

impl StrategySelector {
    /// Selector backed by a custom inspector.
    pub fn new(inspector: Box<dyn ContentInspector>) -> Self {
        Self { inspector }
    }

    /// Pick the strategy for `document` printed with `page`.
    ///
    /// Never fails: an inconclusive inspection logs a warning and yields
    /// [`Strategy::Direct`].
    ///
    /// ```rust
    /// use markup2pdf::{Document, PageConfiguration, Strategy, StrategySelector};
    ///
    /// let selector = StrategySelector::default();
    /// let page = PageConfiguration::default();
    ///
    /// let plain = Document::new("a.pdf", "<p>Hello</p>");
    /// assert_eq!(selector.choose_strategy(&plain, &page), Strategy::Direct);
    ///
    /// let remote = Document::new("b.pdf", r#"<img src="https://cdn.example.com/logo.png">"#);
    /// assert_eq!(selector.choose_strategy(&remote, &page), Strategy::EngineBacked);
    /// ```
    pub fn choose_strategy(&self, document: &Document, page: &PageConfiguration) -> Strategy {
        match self
            .inspector
            .requires_engine(document.markup(), page.base_url.as_ref())
        {
            Ok(true) => Strategy::EngineBacked,
            Ok(false) => Strategy::Direct,
            Err(e) => {
                log::warn!(
                    "⚠️ {} for {:?}; falling back to direct formatting",
                    e,
                    document.destination()
                );
                Strategy::Direct
            }
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(Box::new(RemoteImageInspector))
    }
}

impl std::fmt::Debug for StrategySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategySelector").finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
