//! Documents and page geometry.
//!
//! Plain value types handed to a print job: the [`Document`] to print and
//! the [`PageConfiguration`] describing the paper it lands on. All lengths
//! are PostScript points (1/72 inch) unless stated otherwise.

use std::path::{Path, PathBuf};

use url::Url;

/// A4 paper width in points.
pub const A4_WIDTH: f64 = 595.0;

/// A4 paper height in points.
pub const A4_HEIGHT: f64 = 842.0;

/// A document queued for printing: markup plus the file it is printed to.
///
/// Treated as immutable once a job starts.
///
/// # Example
///
/// ```rust
/// use markup2pdf::Document;
///
/// let doc = Document::new("out/report.pdf", "<h1>Quarterly report</h1>");
/// assert_eq!(doc.markup(), "<h1>Quarterly report</h1>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    destination: PathBuf,
    markup: String,
}

impl Document {
    /// Create a document that prints `markup` to `destination`.
    pub fn new(destination: impl Into<PathBuf>, markup: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            markup: markup.into(),
        }
    }

    /// Path of the PDF this document is printed to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Raw markup content.
    pub fn markup(&self) -> &str {
        &self.markup
    }
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Margins {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl Margins {
    /// The same margin on every side.
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            left: value,
            bottom: value,
            right: value,
        }
    }

    /// No margins at all.
    pub const fn zero() -> Self {
        Self::uniform(0.0)
    }
}

/// Paper size in points, as given in portrait orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaperSize {
    pub width: f64,
    pub height: f64,
}

impl PaperSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub const fn a4() -> Self {
        Self::new(A4_WIDTH, A4_HEIGHT)
    }

    pub const fn letter() -> Self {
        Self::new(612.0, 792.0)
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Final page rectangle handed to the PDF writer.
///
/// Unlike [`PaperSize`] this already has the orientation applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperRect {
    pub width: f64,
    pub height: f64,
}

/// Natural size of loaded content, as measured by an engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentSize {
    pub width: f64,
    pub height: f64,
}

impl ContentSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are finite and strictly positive.
    ///
    /// ```rust
    /// use markup2pdf::ContentSize;
    ///
    /// assert!(ContentSize::new(800.0, 2000.0).is_usable());
    /// assert!(!ContentSize::new(0.0, 2000.0).is_usable());
    /// assert!(!ContentSize::new(f64::NAN, 10.0).is_usable());
    /// ```
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Page layout for one print job.
///
/// A value type: jobs copy it and may recompute their working copy from
/// measured content (see [`PageConfiguration::fit_to_content`]).
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `margins` | 36pt on every side |
/// | `paper` | A4 (595 x 842) |
/// | `base_url` | none |
/// | `orientation` | portrait |
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PageConfiguration {
    pub margins: Margins,
    pub paper: PaperSize,
    /// Base URL relative resources in the markup resolve against.
    pub base_url: Option<Url>,
    pub orientation: Orientation,
}

impl Default for PageConfiguration {
    fn default() -> Self {
        Self {
            margins: Margins::uniform(36.0),
            paper: PaperSize::a4(),
            base_url: None,
            orientation: Orientation::Portrait,
        }
    }
}

impl PageConfiguration {
    /// Configuration for the given paper size with default margins.
    pub fn with_paper(paper: PaperSize) -> Self {
        Self {
            paper,
            ..Self::default()
        }
    }

    /// Set the base URL for relative resources.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    /// Same configuration without margins.
    pub fn with_zero_margins(&self) -> Self {
        Self {
            margins: Margins::zero(),
            ..self.clone()
        }
    }

    /// The page rectangle with orientation applied.
    ///
    /// ```rust
    /// use markup2pdf::{Orientation, PageConfiguration};
    ///
    /// let page = PageConfiguration::default().orientation(Orientation::Landscape);
    /// let rect = page.paper_rect();
    /// assert!(rect.width > rect.height);
    /// ```
    pub fn paper_rect(&self) -> PaperRect {
        let (short, long) = if self.paper.width <= self.paper.height {
            (self.paper.width, self.paper.height)
        } else {
            (self.paper.height, self.paper.width)
        };
        match self.orientation {
            Orientation::Portrait => PaperRect {
                width: short,
                height: long,
            },
            Orientation::Landscape => PaperRect {
                width: long,
                height: short,
            },
        }
    }

    /// Area inside the margins, as `(x, y_from_top, width, height)`.
    pub fn printable_rect(&self) -> (f64, f64, f64, f64) {
        let rect = self.paper_rect();
        let width = (rect.width - self.margins.left - self.margins.right).max(0.0);
        let height = (rect.height - self.margins.top - self.margins.bottom).max(0.0);
        (self.margins.left, self.margins.top, width, height)
    }

    /// Recompute this configuration so `content` fits a single page.
    ///
    /// Margins are zeroed and the paper is rescaled from `reference_width`
    /// so the full content height fits one page at the content's native
    /// aspect ratio. Content wider than it is tall gets a landscape page.
    /// Returns `None` when `content` has no usable dimensions.
    ///
    /// ```rust
    /// use markup2pdf::{ContentSize, PageConfiguration};
    ///
    /// let page = PageConfiguration::default()
    ///     .fit_to_content(ContentSize::new(800.0, 2000.0), 595.0)
    ///     .unwrap();
    /// assert_eq!(page.paper.width, 595.0);
    /// assert_eq!(page.paper.height, 1487.5);
    /// assert_eq!(page.margins.top, 0.0);
    /// ```
    pub fn fit_to_content(&self, content: ContentSize, reference_width: f64) -> Option<Self> {
        if !content.is_usable() {
            return None;
        }
        let height = reference_width * content.height / content.width;
        let orientation = if reference_width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        Some(Self {
            margins: Margins::zero(),
            paper: PaperSize::new(reference_width, height),
            base_url: self.base_url.clone(),
            orientation,
        })
    }

    /// One page exactly the size of an engine viewport, without margins.
    ///
    /// Used when content measurement yields nothing usable.
    pub fn fit_to_viewport(&self, viewport: ContentSize) -> Self {
        let orientation = if viewport.width > viewport.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        Self {
            margins: Margins::zero(),
            paper: PaperSize::new(viewport.width, viewport.height),
            base_url: self.base_url.clone(),
            orientation,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_configuration() {
        let page = PageConfiguration::default();
        assert_eq!(page.paper, PaperSize::a4());
        assert_eq!(page.margins, Margins::uniform(36.0));
        assert_eq!(page.orientation, Orientation::Portrait);
        assert!(page.base_url.is_none());
    }

    /// Landscape swaps the long edge onto the x axis regardless of how the
    /// paper size was given.
    #[test]
    fn test_paper_rect_orientation() {
        let portrait = PageConfiguration::with_paper(PaperSize::letter());
        assert_eq!(
            portrait.paper_rect(),
            PaperRect {
                width: 612.0,
                height: 792.0
            }
        );

        let landscape = portrait.clone().orientation(Orientation::Landscape);
        assert_eq!(
            landscape.paper_rect(),
            PaperRect {
                width: 792.0,
                height: 612.0
            }
        );
    }

    #[test]
    fn test_printable_area() {
        let page = PageConfiguration::with_paper(PaperSize::new(200.0, 300.0))
            .margins(Margins::uniform(10.0));
        assert_eq!(page.printable_rect(), (10.0, 10.0, 180.0, 280.0));
    }

    #[test]
    fn test_printable_area_never_negative() {
        let page = PageConfiguration::with_paper(PaperSize::new(20.0, 20.0))
            .margins(Margins::uniform(50.0));
        let (_, _, w, h) = page.printable_rect();
        assert_eq!((w, h), (0.0, 0.0));
    }

    /// Rescaling keeps the content's aspect ratio at the reference width.
    #[test]
    fn test_fit_to_content_scales_proportionally() {
        let base = Url::parse("https://example.com/").unwrap();
        let page = PageConfiguration::default().base_url(base.clone());

        let fitted = page
            .fit_to_content(ContentSize::new(800.0, 2000.0), 600.0)
            .unwrap();

        assert_eq!(fitted.paper, PaperSize::new(600.0, 1500.0));
        assert_eq!(fitted.margins, Margins::zero());
        assert_eq!(fitted.base_url, Some(base));
        assert_eq!(fitted.orientation, Orientation::Portrait);
    }

    #[test]
    fn test_fit_to_content_keeps_wide_content_wide() {
        let page = PageConfiguration::default()
            .fit_to_content(ContentSize::new(1600.0, 800.0), 595.0)
            .unwrap();

        assert_eq!(page.orientation, Orientation::Landscape);
        let rect = page.paper_rect();
        assert_eq!((rect.width, rect.height), (595.0, 297.5));
    }

    #[test]
    fn test_fit_to_content_rejects_unusable_sizes() {
        let page = PageConfiguration::default();
        assert!(page.fit_to_content(ContentSize::new(0.0, 100.0), 595.0).is_none());
        assert!(page.fit_to_content(ContentSize::new(100.0, -1.0), 595.0).is_none());
        assert!(
            page.fit_to_content(ContentSize::new(f64::INFINITY, 100.0), 595.0)
                .is_none()
        );
    }

    #[test]
    fn test_fit_to_viewport() {
        let fitted = PageConfiguration::default().fit_to_viewport(ContentSize::new(1280.0, 720.0));
        assert_eq!(fitted.margins, Margins::zero());
        assert_eq!(
            fitted.paper_rect(),
            PaperRect {
                width: 1280.0,
                height: 720.0
            }
        );
    }
}
