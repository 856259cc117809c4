//! Direct formatting without a rendering engine.
//!
//! The fast path for documents that need neither scripting nor remote
//! resources. Markup is reduced to text blocks, wrapped to the printable
//! width and laid out on a single page of the configured paper. Lines that
//! do not fit are clipped.

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};

use crate::completion::Completion;
use crate::document::{Document, PageConfiguration, PaperRect};
use crate::error::{PrintError, Result};
use crate::writer::{BODY_FONT, PdfCanvas, PdfWriter, PreparedLayout, encode_text};

const BODY_SIZE: f64 = 11.0;
const LINE_SPACING: f64 = 1.3;

/// Separates blocks in the flattened text stream.
const BLOCK_BREAK: char = '\u{2029}';
/// Marks the start of a heading block; followed by the level digit.
const HEADING_MARK: char = '\u{E000}';

const BLOCK_ELEMENTS: &str = "address, article, aside, blockquote, dd, div, dl, dt, figcaption, \
     figure, footer, form, header, hr, li, main, nav, ol, p, pre, section, table, tr, ul";

/// One line of text placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Font size in points.
    pub size: f64,
    pub x: f64,
    /// Baseline distance from the top edge of the paper.
    pub baseline: f64,
}

/// Single-page text layout built from markup.
#[derive(Debug, Clone)]
pub struct StaticLayout {
    paper: PaperRect,
    lines: Vec<PlacedLine>,
    clipped: usize,
}

impl StaticLayout {
    /// Lay out `markup` on the paper described by `page`.
    ///
    /// `script`, `style` and `head` content is dropped, block elements
    /// start new lines and headings (`h1`-`h3`) are set larger.
    ///
    /// # Errors
    ///
    /// Returns [`PrintError::Format`] if the markup cannot be tokenized.
    pub fn from_markup(markup: &str, page: &PageConfiguration) -> Result<Self> {
        let blocks = extract_blocks(markup)?;
        Ok(Self::from_blocks(&blocks, page))
    }

    fn from_blocks(blocks: &[TextBlock], page: &PageConfiguration) -> Self {
        let paper = page.paper_rect();
        let (x, top, width, height) = page.printable_rect();
        let bottom = top + height;

        let mut lines = Vec::new();
        let mut clipped = 0;
        let mut cursor = top;

        for block in blocks {
            let leading = block.size * LINE_SPACING;
            for text in wrap(&block.text, block.size, width) {
                let baseline = cursor + block.size;
                if baseline > bottom {
                    clipped += 1;
                    continue;
                }
                lines.push(PlacedLine {
                    text,
                    size: block.size,
                    x,
                    baseline,
                });
                cursor += leading;
            }
            // Paragraph gap.
            cursor += block.size * 0.5;
        }

        if clipped > 0 {
            log::debug!("Static layout clipped {} overflowing lines", clipped);
        }

        Self {
            paper,
            lines,
            clipped,
        }
    }

    /// Lines that made it onto the page, top to bottom.
    pub fn lines(&self) -> &[PlacedLine] {
        &self.lines
    }

    /// Number of wrapped lines dropped because they overflowed the page.
    pub fn clipped_lines(&self) -> usize {
        self.clipped
    }

    pub fn paper(&self) -> PaperRect {
        self.paper
    }
}

impl PreparedLayout for StaticLayout {
    fn page_count(&self) -> usize {
        1
    }

    fn paint_page(&self, index: usize, canvas: &mut PdfCanvas) -> Result<()> {
        if index != 0 {
            return Err(PrintError::Format(format!(
                "static layout has one page, asked for page {}",
                index
            )));
        }

        let height = canvas.paper().height;
        let mut operations = vec![Operation::new("BT", vec![])];
        let mut current_size = None;

        for line in &self.lines {
            if current_size != Some(line.size) {
                operations.push(Operation::new(
                    "Tf",
                    vec![BODY_FONT.into(), (line.size as f32).into()],
                ));
                current_size = Some(line.size);
            }
            operations.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    (line.x as f32).into(),
                    ((height - line.baseline) as f32).into(),
                ],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_text(&line.text), StringFormat::Literal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));

        canvas.add_page(Content { operations })
    }
}

// ============================================================================
// Markup flattening
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct TextBlock {
    text: String,
    size: f64,
}

fn heading_size(level: char) -> f64 {
    match level {
        '1' => 20.0,
        '2' => 16.0,
        _ => 13.0,
    }
}

/// Flatten markup into text blocks.
///
/// Two passes: the first strips invisible elements and marks block
/// boundaries, the second collects the remaining text.
fn extract_blocks(markup: &str) -> Result<Vec<TextBlock>> {
    let format_err = |e: lol_html::errors::RewritingError| PrintError::Format(e.to_string());
    let brk = BLOCK_BREAK.to_string();

    let marked = rewrite_str(
        markup,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script, style, head, template, noscript", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("h1, h2, h3", |el| {
                    let level = el.tag_name().chars().nth(1).unwrap_or('3');
                    el.before(&format!("{}{}{}", BLOCK_BREAK, HEADING_MARK, level), ContentType::Text);
                    el.after(&brk, ContentType::Text);
                    Ok(())
                }),
                element!("h4, h5, h6", |el| {
                    el.before(&brk, ContentType::Text);
                    el.after(&brk, ContentType::Text);
                    Ok(())
                }),
                element!(BLOCK_ELEMENTS, |el| {
                    el.before(&brk, ContentType::Text);
                    el.after(&brk, ContentType::Text);
                    Ok(())
                }),
                element!("br", |el| {
                    el.after(&brk, ContentType::Text);
                    Ok(())
                }),
                element!("td, th", |el| {
                    el.after(" ", ContentType::Text);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(format_err)?;

    let collected = Rc::new(RefCell::new(String::with_capacity(marked.len())));
    rewrite_str(
        &marked,
        RewriteStrSettings {
            element_content_handlers: vec![text!("*", {
                let collected = Rc::clone(&collected);
                move |chunk| {
                    collected.borrow_mut().push_str(chunk.as_str());
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(format_err)?;

    let flattened = collected.borrow();
    let mut blocks = Vec::new();
    for raw in flattened.split(BLOCK_BREAK) {
        let mut raw = raw;
        let mut size = BODY_SIZE;
        if let Some(rest) = raw.strip_prefix(HEADING_MARK) {
            let mut chars = rest.chars();
            size = heading_size(chars.next().unwrap_or('3'));
            raw = chars.as_str();
        }

        let text = collapse_whitespace(&decode_entities(raw));
        if !text.is_empty() {
            blocks.push(TextBlock { text, size });
        }
    }
    Ok(blocks)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the named entities common in generated markup plus numeric ones.
///
/// Unknown entities are kept verbatim.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('©'),
                "reg" => Some('®'),
                "euro" => Some('€'),
                "mdash" => Some('\u{2014}'),
                "ndash" => Some('\u{2013}'),
                "hellip" => Some('\u{2026}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Approximate Helvetica advance of `c` in 1/1000 em.
fn advance(c: char) -> f64 {
    match c {
        'i' | 'j' | 'l' | '\'' | '|' | '.' | ',' | ':' | ';' | '!' => 250.0,
        ' ' | 'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '/' => 300.0,
        'm' | 'w' | 'M' | 'W' | '@' | '%' => 850.0,
        c if c.is_ascii_uppercase() => 680.0,
        c if c.is_ascii_digit() => 556.0,
        _ => 520.0,
    }
}

fn text_width(text: &str, size: f64) -> f64 {
    text.chars().map(advance).sum::<f64>() * size / 1000.0
}

/// Greedy word wrap; words wider than the line are split by character.
fn wrap(text: &str, size: f64, max_width: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split(' ') {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };

        if text_width(&candidate, size) <= max_width {
            line = candidate;
            continue;
        }

        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }

        if text_width(word, size) <= max_width {
            line = word.to_string();
        } else {
            for c in word.chars() {
                if !line.is_empty() && text_width(&line, size) + advance(c) * size / 1000.0 > max_width {
                    lines.push(std::mem::take(&mut line));
                }
                line.push(c);
            }
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

// ============================================================================
// DirectFormatter
// ============================================================================

/// Formats documents synchronously, bypassing the engine pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFormatter {
    writer: PdfWriter,
}

impl DirectFormatter {
    pub fn new(writer: PdfWriter) -> Self {
        Self { writer }
    }

    /// Lay out `document` on `page` and write it to the document destination.
    ///
    /// Blocking; async callers run it on a blocking thread. Nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// [`PrintError::Format`] for markup that cannot be tokenized,
    /// [`PrintError::Write`] for filesystem failures.
    pub fn render(&self, document: &Document, page: &PageConfiguration) -> Result<()> {
        let layout = StaticLayout::from_markup(document.markup(), page)?;
        log::debug!(
            "Direct layout for {:?}: {} lines ({} clipped)",
            document.destination(),
            layout.lines().len(),
            layout.clipped_lines()
        );
        self.writer
            .write(&layout, page.paper_rect(), document.destination())
    }

    /// [`render`](Self::render) for a job raced against a deadline.
    ///
    /// The destination is only replaced if the job has not ended by the
    /// time the PDF is ready; see [`PdfWriter::write_for_job`].
    pub fn render_for_job(
        &self,
        document: &Document,
        page: &PageConfiguration,
        job: &Completion<Result<()>>,
    ) -> Result<bool> {
        if job.is_resolved() {
            return Ok(false);
        }
        let layout = StaticLayout::from_markup(document.markup(), page)?;
        self.writer
            .write_for_job(&layout, page.paper_rect(), document.destination(), job)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
