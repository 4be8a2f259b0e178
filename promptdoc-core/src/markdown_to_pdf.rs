//! Render an assembled [`Document`] to PDF bytes with `printpdf`.
//!
//! Embedded DejaVu Sans / Sans Mono fonts (full Unicode text, not WinAnsi) on A4
//! pages, greedy word wrapping by an average glyph width. Each document section
//! starts on a new page. Headings up to `toc_level` become PDF bookmarks, which
//! readers show as the outline / table of contents.
//!
//! Layout ([`layout_document`]) is kept separate from PDF emission so it can be
//! checked without parsing PDF output.

use printpdf::{
    FontId, Mm, Op, ParsedFont, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt, TextItem,
};
use tracing::{debug, info};

use crate::contract::WriteError;
use crate::document::Document;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const MM_TO_PT: f32 = 2.834_646;
const LINE_SPACING: f32 = 1.4;
const BLANK_HEIGHT_PT: f32 = 6.0;

static SANS_REGULAR: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
static SANS_BOLD: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");
static SANS_MONO: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

/// Which embedded face a line is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
    Mono,
}

impl FontFace {
    fn bytes(&self) -> &'static [u8] {
        match self {
            FontFace::Regular => SANS_REGULAR,
            FontFace::Bold => SANS_BOLD,
            FontFace::Mono => SANS_MONO,
        }
    }
}

/// Embedded font ids of one PDF document.
struct FontSet {
    regular: FontId,
    bold: FontId,
    mono: FontId,
}

impl FontSet {
    fn load(doc: &mut PdfDocument) -> Result<Self, WriteError> {
        let mut add = |face: FontFace| -> Result<FontId, WriteError> {
            let mut warnings = Vec::new();
            let parsed = ParsedFont::from_bytes(face.bytes(), 0, &mut warnings)
                .ok_or_else(|| WriteError::Pdf(format!("failed to parse embedded {face:?} font")))?;
            Ok(doc.add_font(&parsed))
        };
        Ok(Self {
            regular: add(FontFace::Regular)?,
            bold: add(FontFace::Bold)?,
            mono: add(FontFace::Mono)?,
        })
    }

    fn id(&self, face: FontFace) -> &FontId {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
            FontFace::Mono => &self.mono,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineStyle {
    Heading(usize),
    Body,
    Bold,
    Code,
    Blank,
}

impl LineStyle {
    pub fn face(&self) -> FontFace {
        match self {
            LineStyle::Heading(_) | LineStyle::Bold => FontFace::Bold,
            LineStyle::Code => FontFace::Mono,
            LineStyle::Body | LineStyle::Blank => FontFace::Regular,
        }
    }

    pub fn size(&self) -> f32 {
        match self {
            LineStyle::Heading(1) => 20.0,
            LineStyle::Heading(2) => 16.0,
            LineStyle::Heading(3) => 14.0,
            LineStyle::Heading(_) => 12.0,
            LineStyle::Body | LineStyle::Bold => 11.0,
            LineStyle::Code => 9.5,
            LineStyle::Blank => 0.0,
        }
    }

    fn height(&self) -> f32 {
        match self {
            LineStyle::Blank => BLANK_HEIGHT_PT,
            other => other.size() * LINE_SPACING,
        }
    }

    fn max_chars(&self) -> usize {
        let glyph = match self {
            LineStyle::Code => 0.6,
            _ => 0.52,
        };
        let usable = (PAGE_WIDTH_MM - 2.0 * MARGIN_MM) * MM_TO_PT;
        let size = self.size().max(1.0);
        ((usable / (size * glyph)) as usize).max(10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyledLine {
    pub style: LineStyle,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub style: LineStyle,
    pub text: String,
    /// Baseline, in points from the bottom edge.
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
    /// Bookmark title and zero-based page index.
    pub bookmarks: Vec<(String, usize)>,
}

/// Drop control characters the text operators cannot carry; tabs become spaces.
fn clean_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Strip inline emphasis and code markers, keep link text and target.
fn strip_inline(text: &str) -> String {
    let mut out = text.replace("**", "").replace("__", "").replace('`', "");
    while let Some(open) = out.find('[') {
        let Some(mid) = out[open..].find("](").map(|i| open + i) else {
            break;
        };
        let Some(close) = out[mid..].find(')').map(|i| mid + i) else {
            break;
        };
        let label = out[open + 1..mid].to_string();
        let target = out[mid + 2..close].to_string();
        out.replace_range(open..=close, &format!("{label} ({target})"));
    }
    clean_text(&out)
}

pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: String = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            let rest = word.split_off(split_at);
            lines.push(word);
            word = rest;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn is_rule(line: &str) -> bool {
    let t: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    t.len() >= 3
        && (t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*') || t.chars().all(|c| c == '_'))
}

/// Turn Markdown into wrapped, styled lines.
pub fn layout_markdown(markdown: &str) -> Vec<StyledLine> {
    let mut out = Vec::new();
    let mut in_code = false;
    let push = |style: LineStyle, text: &str, out: &mut Vec<StyledLine>| {
        for piece in wrap(text, style.max_chars()) {
            out.push(StyledLine { style, text: piece });
        }
    };

    for raw in markdown.lines() {
        let trimmed = raw.trim();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            let code = clean_text(raw.trim_end());
            if code.is_empty() {
                out.push(StyledLine { style: LineStyle::Blank, text: String::new() });
            } else {
                push(LineStyle::Code, &code, &mut out);
            }
            continue;
        }
        if trimmed.is_empty() || is_rule(trimmed) {
            if !matches!(out.last(), Some(StyledLine { style: LineStyle::Blank, .. })) {
                out.push(StyledLine { style: LineStyle::Blank, text: String::new() });
            }
            continue;
        }
        if trimmed.starts_with('#') {
            let depth = trimmed.chars().take_while(|c| *c == '#').count();
            let title = strip_inline(trimmed[depth..].trim());
            push(LineStyle::Heading(depth), &title, &mut out);
            continue;
        }
        if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            push(LineStyle::Body, &format!("- {}", strip_inline(item)), &mut out);
            continue;
        }
        let style = if trimmed.len() > 4 && trimmed.starts_with("**") && trimmed.ends_with("**") {
            LineStyle::Bold
        } else {
            LineStyle::Body
        };
        push(style, &strip_inline(trimmed), &mut out);
    }
    out
}

/// Paginate every section; sections start on fresh pages.
pub fn layout_document(document: &Document, toc_level: usize) -> DocumentLayout {
    let top = (PAGE_HEIGHT_MM - MARGIN_MM) * MM_TO_PT;
    let bottom = MARGIN_MM * MM_TO_PT;
    let mut layout = DocumentLayout::default();

    for section in &document.sections {
        layout.pages.push(PageLayout::default());
        let mut y = top;
        for line in layout_markdown(&section.to_markdown()) {
            let height = line.style.height();
            let on_fresh_page = layout.pages.last().map(|p| p.lines.is_empty()).unwrap_or(true);
            if line.style == LineStyle::Blank && on_fresh_page {
                continue;
            }
            if y - height < bottom && !on_fresh_page {
                layout.pages.push(PageLayout::default());
                y = top;
                if line.style == LineStyle::Blank {
                    continue;
                }
            }
            y -= height;
            let page_index = layout.pages.len() - 1;
            if let LineStyle::Heading(depth) = line.style {
                if depth <= toc_level {
                    layout.bookmarks.push((line.text.clone(), page_index));
                }
            }
            if let Some(page) = layout.pages.last_mut() {
                page.lines.push(PlacedLine {
                    style: line.style,
                    text: line.text,
                    y,
                });
            }
        }
    }
    layout
}

/// Render to PDF bytes. `optimize` is forwarded to the PDF save options.
pub fn render_pdf(document: &Document, toc_level: usize, optimize: bool) -> Result<Vec<u8>, WriteError> {
    if document.sections.is_empty() {
        return Err(WriteError::EmptyDocument);
    }
    let layout = layout_document(document, toc_level);
    if layout.pages.is_empty() {
        return Err(WriteError::Pdf("layout produced no pages".into()));
    }

    let title = document
        .sections
        .iter()
        .find_map(|s| s.heading())
        .map(|h| strip_inline(h.trim_start_matches('#').trim()))
        .unwrap_or_else(|| "promptdoc".to_string());
    let mut doc = PdfDocument::new(&title);
    let fonts = FontSet::load(&mut doc)?;

    let margin = MARGIN_MM * MM_TO_PT;
    let pages: Vec<PdfPage> = layout
        .pages
        .iter()
        .map(|page| {
            let mut ops = Vec::new();
            for line in page.lines.iter().filter(|l| !l.text.is_empty()) {
                let font = fonts.id(line.style.face());
                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(margin),
                        y: Pt(line.y),
                    },
                });
                ops.push(Op::SetFontSize {
                    size: Pt(line.style.size()),
                    font: font.clone(),
                });
                ops.push(Op::WriteText {
                    items: vec![TextItem::Text(line.text.clone())],
                    font: font.clone(),
                });
                ops.push(Op::EndTextSection);
            }
            PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops)
        })
        .collect();

    for (name, page_index) in &layout.bookmarks {
        doc.add_bookmark(name, page_index + 1);
    }

    let options = PdfSaveOptions {
        optimize,
        ..Default::default()
    };
    let mut warnings = Vec::new();
    let bytes = doc.with_pages(pages).save(&options, &mut warnings);
    debug!(warnings = warnings.len(), "PDF serialized");
    info!(
        pages = layout.pages.len(),
        bookmarks = layout.bookmarks.len(),
        size = bytes.len(),
        "Rendered PDF"
    );
    if bytes.is_empty() {
        return Err(WriteError::Pdf("serializer returned no bytes".into()));
    }
    Ok(bytes)
}
