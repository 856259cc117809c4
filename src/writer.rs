//! PDF output.
//!
//! [`PdfWriter`] paginates a [`PreparedLayout`] into a [`PdfCanvas`] (an
//! in-memory `lopdf` document) and writes the result atomically: bytes go
//! to a temporary file next to the destination which is then renamed over
//! it, so a failed write never leaves a truncated PDF behind.
//!
//! # Architecture
//!
//! ```text
//! PreparedLayout ──paint_page(i)──▶ PdfCanvas ──finish()──▶ bytes
//!                                                            │
//!                                   tempfile in dest dir ◀───┘
//!                                            │ persist (rename)
//!                                            ▼
//!                                       destination.pdf
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use lopdf::content::Content;
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId, Stream, dictionary};

use tempfile::NamedTempFile;

use crate::completion::Completion;
use crate::document::PaperRect;
use crate::error::{PrintError, Result};

/// Resource name of the built-in Helvetica font on every content page.
pub const BODY_FONT: &str = "F1";

/// Content laid out and ready to be painted page by page.
///
/// Implementations must be `Send` so layouts can be handed to a blocking
/// writer thread.
pub trait PreparedLayout: Send + Sync {
    /// Number of pages this layout paints. Zero is rejected by the writer.
    fn page_count(&self) -> usize;

    /// Paint page `index` (zero-based) onto `canvas`.
    ///
    /// Every call must append exactly one page.
    fn paint_page(&self, index: usize, canvas: &mut PdfCanvas) -> Result<()>;
}

// ============================================================================
// PdfCanvas
// ============================================================================

/// Drawing context backed by an in-memory `lopdf` document.
///
/// Every page the canvas creates uses the canvas paper as its MediaBox.
pub struct PdfCanvas {
    document: PdfDocument,
    pages_id: ObjectId,
    resources_id: ObjectId,
    page_ids: Vec<ObjectId>,
    paper: PaperRect,
}

impl PdfCanvas {
    pub(crate) fn new(paper: PaperRect) -> Self {
        let mut document = PdfDocument::with_version("1.7");
        let pages_id = document.new_object_id();

        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { BODY_FONT => font_id },
        });

        Self {
            document,
            pages_id,
            resources_id,
            page_ids: Vec::new(),
            paper,
        }
    }

    /// Paper every page is created with.
    pub fn paper(&self) -> PaperRect {
        self.paper
    }

    /// Pages painted so far.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn media_box(&self) -> Vec<Object> {
        vec![
            0.into(),
            0.into(),
            (self.paper.width as f32).into(),
            (self.paper.height as f32).into(),
        ]
    }

    /// Append a page drawn by `content`.
    ///
    /// The page can refer to the Helvetica font as [`BODY_FONT`].
    pub fn add_page(&mut self, content: Content) -> Result<()> {
        let encoded = content.encode()?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => self.media_box(),
            "Contents" => content_id,
            "Resources" => self.resources_id,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Append a copy of page `page_id` from another PDF.
    ///
    /// The page and everything it references (content streams, fonts,
    /// images) are deep-copied; the page is re-parented onto this canvas and
    /// gets the canvas paper as its MediaBox.
    pub fn import_page(&mut self, source: &PdfDocument, page_id: ObjectId) -> Result<()> {
        let mut page = source.get_dictionary(page_id)?.clone();

        // Inheritable attributes the copy would otherwise lose with its parent.
        for key in [&b"Resources"[..], &b"Rotate"[..], &b"CropBox"[..]] {
            if !page.has(key)
                && let Some(value) = inherited_attribute(source, &page, key)
            {
                page.set(key.to_vec(), value);
            }
        }
        page.remove(b"Parent");

        let mut copier = ObjectCopier::new(source, &mut self.document);
        let mut copied = match copier.remap_references(Object::Dictionary(page))? {
            Object::Dictionary(dict) => dict,
            _ => return Err(PrintError::Format("imported page is not a dictionary".to_string())),
        };
        copied.set("Parent", self.pages_id);
        copied.set("MediaBox", self.media_box());

        let new_id = self.document.add_object(copied);
        self.page_ids.push(new_id);
        Ok(())
    }

    /// Serialize the canvas into PDF bytes.
    fn finish(mut self) -> Result<Vec<u8>> {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        let count = self.page_ids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.document
            .save_to(&mut bytes)
            .map_err(|e| PrintError::Write(format!("failed to serialize PDF: {}", e)))?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for PdfCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfCanvas")
            .field("paper", &self.paper)
            .field("pages", &self.page_ids.len())
            .finish_non_exhaustive()
    }
}

/// Walk up the page tree of `source` looking for an inheritable attribute.
fn inherited_attribute(source: &PdfDocument, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Bounded walk; malformed files can contain parent cycles.
    for _ in 0..32 {
        let node = source.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Deep-copies objects between documents, remapping references.
///
/// Each source object is copied once; a placeholder is registered before
/// recursing so reference cycles terminate.
struct ObjectCopier<'a> {
    source: &'a PdfDocument,
    target: &'a mut PdfDocument,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a PdfDocument, target: &'a mut PdfDocument) -> Self {
        Self {
            source,
            target,
            id_map: HashMap::new(),
        }
    }

    fn copy_object(&mut self, source_id: ObjectId) -> std::result::Result<ObjectId, lopdf::Error> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let object = self.source.get_object(source_id)?.clone();
        let remapped = self.remap_references(object)?;
        self.target.objects.insert(new_id, remapped);

        Ok(new_id)
    }

    fn remap_references(&mut self, object: Object) -> std::result::Result<Object, lopdf::Error> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(items) => items
                .into_iter()
                .map(|item| self.remap_references(item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Object::Array),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.remap_dictionary(&dict)?)),
            Object::Stream(mut stream) => {
                stream.dict = self.remap_dictionary(&stream.dict)?;
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }

    fn remap_dictionary(&mut self, dict: &Dictionary) -> std::result::Result<Dictionary, lopdf::Error> {
        let mut remapped = Dictionary::new();
        for (key, value) in dict.iter() {
            remapped.set(key.clone(), self.remap_references(value.clone())?);
        }
        Ok(remapped)
    }
}

/// Encode text for a literal string in the built-in WinAnsi font.
///
/// Characters outside Latin-1 become `?`.
pub(crate) fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 255 { c as u8 } else { b'?' })
        .collect()
}

// ============================================================================
// PdfWriter
// ============================================================================

/// Writes prepared layouts to PDF files.
///
/// # Example
///
/// ```rust,no_run
/// use markup2pdf::{PageConfiguration, PdfWriter, StaticLayout};
///
/// let page = PageConfiguration::default();
/// let layout = StaticLayout::from_markup("<h1>Invoice</h1>", &page).expect("layout failed");
///
/// PdfWriter::new(true)
///     .write(&layout, page.paper_rect(), "out/invoice.pdf".as_ref())
///     .expect("write failed");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PdfWriter {
    create_parent_dirs: bool,
}

impl PdfWriter {
    /// Writer that creates missing destination directories when
    /// `create_parent_dirs` is set.
    pub fn new(create_parent_dirs: bool) -> Self {
        Self { create_parent_dirs }
    }

    /// Paint every page of `layout` on `paper` and write it to `destination`.
    ///
    /// # Errors
    ///
    /// - [`PrintError::Format`] if the layout has no pages or fails to paint
    /// - [`PrintError::Write`] if the destination cannot be created or written;
    ///   the destination is left untouched in that case
    pub fn write(&self, layout: &dyn PreparedLayout, paper: PaperRect, destination: &Path) -> Result<()> {
        let bytes = self.render(layout, paper)?;
        let staged = self.stage(&bytes, destination)?;
        Self::commit(staged, destination)?;
        log::debug!("PDF written to {:?} ({} bytes)", destination, bytes.len());
        Ok(())
    }

    /// [`write`](Self::write) for a job that may end before the write does.
    ///
    /// The destination is only replaced if the final rename can resolve
    /// `job` first; the rename's result becomes the job's result. If the
    /// job was already resolved (timed out, cancelled) the staged file is
    /// discarded and the destination stays untouched.
    ///
    /// Returns `Ok(true)` when the destination was replaced and `Ok(false)`
    /// when the job ended first.
    pub fn write_for_job(
        &self,
        layout: &dyn PreparedLayout,
        paper: PaperRect,
        destination: &Path,
        job: &Completion<Result<()>>,
    ) -> Result<bool> {
        if job.is_resolved() {
            log::debug!("Job for {:?} already ended, skipping write", destination);
            return Ok(false);
        }

        let bytes = self.render(layout, paper)?;
        let staged = self.stage(&bytes, destination)?;

        let mut committed = None;
        job.resolve_with(|| {
            let outcome = Self::commit(staged, destination);
            committed = Some(outcome.clone());
            outcome
        });

        match committed {
            Some(outcome) => {
                outcome?;
                log::debug!("PDF written to {:?} ({} bytes)", destination, bytes.len());
                Ok(true)
            }
            None => {
                log::debug!("Job for {:?} ended during the write, output discarded", destination);
                Ok(false)
            }
        }
    }

    /// [`write_for_job`](Self::write_for_job) on a blocking thread.
    pub async fn write_in_background(
        self,
        layout: Box<dyn PreparedLayout>,
        paper: PaperRect,
        destination: PathBuf,
        job: Completion<Result<()>>,
    ) -> Result<bool> {
        tokio::task::spawn_blocking(move || {
            self.write_for_job(layout.as_ref(), paper, &destination, &job)
        })
        .await
        .map_err(|e| PrintError::Internal(format!("PDF write task failed: {}", e)))?
    }

    fn render(&self, layout: &dyn PreparedLayout, paper: PaperRect) -> Result<Vec<u8>> {
        let pages = layout.page_count();
        if pages == 0 {
            return Err(PrintError::Format("layout has no pages".to_string()));
        }

        let mut canvas = PdfCanvas::new(paper);
        for index in 0..pages {
            let before = canvas.page_count();
            layout.paint_page(index, &mut canvas)?;
            if canvas.page_count() != before + 1 {
                return Err(PrintError::Format(format!(
                    "page {} painted {} pages instead of one",
                    index,
                    canvas.page_count() - before
                )));
            }
        }

        log::trace!("Painted {} pages at {}x{}pt", pages, paper.width, paper.height);
        canvas.finish()
    }

    /// Write `bytes` to a temporary file next to `destination`.
    fn stage(&self, bytes: &[u8], destination: &Path) -> Result<NamedTempFile> {
        let parent = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        if !parent.is_dir() {
            if self.create_parent_dirs {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PrintError::Write(format!("cannot create directory {:?}: {}", parent, e))
                })?;
            } else {
                return Err(PrintError::Write(format!(
                    "directory {:?} does not exist",
                    parent
                )));
            }
        }

        let mut file = tempfile::Builder::new()
            .prefix(".markup2pdf-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| PrintError::Write(format!("cannot create temporary file: {}", e)))?;

        file.write_all(bytes)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| PrintError::Write(e.to_string()))?;
        Ok(file)
    }

    fn commit(staged: NamedTempFile, destination: &Path) -> Result<()> {
        staged
            .persist(destination)
            .map_err(|e| PrintError::Write(format!("cannot replace {:?}: {}", destination, e.error)))?;
        Ok(())
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new(true)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
