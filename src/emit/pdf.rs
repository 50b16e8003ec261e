//! Minimal PDF 1.4 writer: catalog, page tree, three base-14 fonts, one
//! uncompressed content stream per page, optional DCT-encoded (JPEG) image
//! XObjects, xref table, trailer.
//!
//! Layout is a greedy top-down cursor with character-estimate line wrapping.
//! Text outside the ASCII range is replaced with '?'; embedding a Unicode
//! font is out of reach for a hand-assembled file.

use super::{image_dimensions, is_svg_url, EmitError, FetchedImage};
use crate::fetch::ImageFetcher;
use crate::model::Block;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const LINE_FACTOR: f32 = 1.4;

/// Average glyph width as a fraction of the font size, per font.
const BODY_CHAR_FACTOR: f32 = 0.5;
const MONO_CHAR_FACTOR: f32 = 0.6;

const FONT_BODY: &str = "F1";
const FONT_BOLD: &str = "F2";
const FONT_MONO: &str = "F3";

const HEADING_SIZES: [f32; 6] = [24.0, 18.0, 15.0, 13.0, 12.0, 11.0];
const BODY_SIZE: f32 = 11.0;
const CODE_SIZE: f32 = 9.0;

struct JpegXObject {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Write blocks as a PDF. `title` is rendered when the block list is empty
/// so the file is never blank.
pub fn write_pdf(
    blocks: &[Block],
    title: &str,
    images: &mut dyn ImageFetcher,
) -> Result<Vec<u8>, EmitError> {
    let mut layout = Layout::new();
    let mut xobjects: Vec<JpegXObject> = Vec::new();

    if blocks.is_empty() {
        layout.text_block(FONT_BOLD, 18.0, MARGIN, TEXT_WIDTH, BODY_CHAR_FACTOR, title);
    }
    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let size = HEADING_SIZES[usize::from((*level).clamp(1, 6)) - 1];
                layout.gap(size * 0.6);
                layout.text_block(FONT_BOLD, size, MARGIN, TEXT_WIDTH, BODY_CHAR_FACTOR, text);
            }
            Block::Paragraph { text } => {
                layout.text_block(FONT_BODY, BODY_SIZE, MARGIN, TEXT_WIDTH, BODY_CHAR_FACTOR, text);
                layout.gap(BODY_SIZE * 0.5);
            }
            Block::CodeBlock { text, .. } => {
                layout.gap(CODE_SIZE * 0.5);
                for line in text.trim_end_matches('\n').split('\n') {
                    layout.text_block(
                        FONT_MONO,
                        CODE_SIZE,
                        MARGIN + 10.0,
                        TEXT_WIDTH - 20.0,
                        MONO_CHAR_FACTOR,
                        line,
                    );
                }
                layout.gap(CODE_SIZE * 0.5);
            }
            Block::Blockquote { text } => {
                layout.text_block(
                    FONT_BODY,
                    BODY_SIZE,
                    MARGIN + 20.0,
                    TEXT_WIDTH - 20.0,
                    BODY_CHAR_FACTOR,
                    text,
                );
                layout.gap(BODY_SIZE * 0.5);
            }
            Block::Image {
                alt_text,
                source_url,
            } => {
                append_image(&mut layout, &mut xobjects, images, source_url, alt_text);
            }
            Block::Table { header_cells, rows } => {
                if header_cells.is_empty() && rows.is_empty() {
                    continue;
                }
                // Tables render as fixed-pitch text; proportional column
                // layout is not worth a page description language fight.
                layout.text_block(
                    FONT_MONO,
                    CODE_SIZE,
                    MARGIN,
                    TEXT_WIDTH,
                    MONO_CHAR_FACTOR,
                    &header_cells.join(" | "),
                );
                layout.text_block(FONT_MONO, CODE_SIZE, MARGIN, TEXT_WIDTH, MONO_CHAR_FACTOR, "---");
                for row in rows {
                    layout.text_block(
                        FONT_MONO,
                        CODE_SIZE,
                        MARGIN,
                        TEXT_WIDTH,
                        MONO_CHAR_FACTOR,
                        &row.join(" | "),
                    );
                }
                layout.gap(CODE_SIZE * 0.5);
            }
        }
    }

    Ok(assemble(layout.into_pages(), &xobjects))
}

fn append_image(
    layout: &mut Layout,
    xobjects: &mut Vec<JpegXObject>,
    images: &mut dyn ImageFetcher,
    source_url: &str,
    alt_text: &str,
) {
    let label = if alt_text.trim().is_empty() {
        source_url
    } else {
        alt_text
    };
    let placeholder = |layout: &mut Layout| {
        layout.text_block(
            FONT_BODY,
            BODY_SIZE,
            MARGIN,
            TEXT_WIDTH,
            BODY_CHAR_FACTOR,
            &format!("[image: {label}]"),
        );
        layout.gap(BODY_SIZE * 0.5);
    };
    if is_svg_url(source_url) {
        placeholder(layout);
        return;
    }
    let Some(staged) = FetchedImage::fetch(images, source_url) else {
        placeholder(layout);
        return;
    };
    // Only JPEG can be embedded without re-encoding (DCTDecode passthrough).
    if staged.extension() != "jpg" {
        placeholder(layout);
        return;
    }
    let data = match staged.bytes() {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Warning: could not read staged image {source_url}: {e}");
            placeholder(layout);
            return;
        }
    };
    let Some((width, height)) = image_dimensions(&data) else {
        placeholder(layout);
        return;
    };
    let scale = (TEXT_WIDTH / width as f32).min(1.0);
    let draw_w = width as f32 * scale;
    let draw_h = height as f32 * scale;
    xobjects.push(JpegXObject {
        width,
        height,
        data,
    });
    layout.image(xobjects.len(), draw_w, draw_h);
    if !alt_text.trim().is_empty() {
        layout.text_block(FONT_BODY, 9.0, MARGIN, TEXT_WIDTH, BODY_CHAR_FACTOR, alt_text);
    }
    layout.gap(BODY_SIZE * 0.5);
}

/// Top-down page cursor producing one content stream string per page.
struct Layout {
    done: Vec<String>,
    current: String,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: String::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn break_page(&mut self) {
        self.done.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < MARGIN && !self.current.is_empty() {
            self.break_page();
        }
    }

    fn gap(&mut self, points: f32) {
        self.y -= points;
    }

    /// Wrapped text lines at `x`, breaking pages as needed.
    fn text_block(
        &mut self,
        font: &str,
        size: f32,
        x: f32,
        width: f32,
        char_factor: f32,
        text: &str,
    ) {
        let line_height = size * LINE_FACTOR;
        for line in wrap_text(text, size, char_factor, width) {
            self.ensure_room(line_height);
            self.y -= line_height;
            self.current.push_str(&format!(
                "BT /{font} {size:.1} Tf {x:.1} {y:.1} Td ({text}) Tj ET\n",
                y = self.y,
                text = escape_pdf_text(&line)
            ));
        }
    }

    fn image(&mut self, index: usize, width: f32, height: f32) {
        self.ensure_room(height + 4.0);
        self.y -= height + 4.0;
        self.current.push_str(&format!(
            "q {w:.1} 0 0 {h:.1} {x:.1} {y:.1} cm /Im{index} Do Q\n",
            w = width,
            h = height,
            x = MARGIN,
            y = self.y,
        ));
    }

    fn into_pages(mut self) -> Vec<String> {
        if !self.current.is_empty() || self.done.is_empty() {
            self.done.push(self.current);
        }
        self.done
    }
}

/// Greedy word wrap on an average-glyph-width estimate.
fn wrap_text(text: &str, size: f32, char_factor: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * char_factor)) as usize).max(8);
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        if raw_line.chars().count() <= max_chars {
            lines.push(raw_line.to_string());
            continue;
        }
        let mut line = String::new();
        let mut line_len = 0usize;
        for word in raw_line.split(' ') {
            let word_len = word.chars().count();
            if line_len > 0 && line_len + 1 + word_len > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            // Words longer than the line budget are hard-split.
            if word_len > max_chars {
                for c in word.chars() {
                    if line_len >= max_chars {
                        lines.push(std::mem::take(&mut line));
                        line_len = 0;
                    }
                    line.push(c);
                    line_len += 1;
                }
            } else {
                line.push_str(word);
                line_len += word_len;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Literal-string escaping, non-ASCII replaced since only base-14 fonts with
/// standard encoding are available.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("    "),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Serialize the object graph: fixed ids 1 catalog, 2 pages, 3-5 fonts, then
/// image XObjects, then alternating content stream / page objects.
fn assemble(pages: Vec<String>, xobjects: &[JpegXObject]) -> Vec<u8> {
    let image_base = 6;
    let page_base = image_base + xobjects.len();
    let object_count = page_base + 2 * pages.len() - 1;

    let mut objects: Vec<(usize, Vec<u8>)> = Vec::new();

    objects.push((1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()));

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", page_base + 2 * i + 1))
        .collect();
    let mut xobject_dict = String::new();
    if !xobjects.is_empty() {
        xobject_dict.push_str(" /XObject <<");
        for (i, _) in xobjects.iter().enumerate() {
            xobject_dict.push_str(&format!(" /Im{} {} 0 R", i + 1, image_base + i));
        }
        xobject_dict.push_str(" >>");
    }
    objects.push((
        2,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >>{xobject_dict} >> >>",
            kids.join(" "),
            pages.len(),
        )
        .into_bytes(),
    ));

    for (id, name) in [(3, "Helvetica"), (4, "Helvetica-Bold"), (5, "Courier")] {
        objects.push((
            id,
            format!("<< /Type /Font /Subtype /Type1 /BaseFont /{name} >>").into_bytes(),
        ));
    }

    for (i, image) in xobjects.iter().enumerate() {
        let mut obj = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB \
             /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
            image.width,
            image.height,
            image.data.len()
        )
        .into_bytes();
        obj.extend_from_slice(&image.data);
        obj.extend_from_slice(b"\nendstream");
        objects.push((image_base + i, obj));
    }

    for (i, content) in pages.iter().enumerate() {
        let content_id = page_base + 2 * i;
        let page_id = content_id + 1;
        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(content.as_bytes());
        stream.extend_from_slice(b"endstream");
        objects.push((content_id, stream));
        objects.push((
            page_id,
            format!("<< /Type /Page /Parent 2 0 R /Contents {content_id} 0 R >>").into_bytes(),
        ));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
    let mut offsets = vec![0usize; object_count + 1];
    for (id, body) in &objects {
        offsets[*id] = out.len();
        out.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", object_count + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::test_support::{FailingImages, PngImages};
    use crate::fetch::{FetchError, ImageFetcher};

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// SOI, APP0 stub, SOF0 with height 20 / width 40, EOI.
    struct JpegImages;

    impl ImageFetcher for JpegImages {
        fn get(&mut self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(vec![
                0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x0B, 0x08,
                0x00, 0x14, 0x00, 0x28, 0x01, 0x01, 0x11, 0x00, 0xFF, 0xD9,
            ])
        }
    }

    #[test]
    fn output_has_pdf_framing() {
        let mut images = FailingImages;
        let bytes = write_pdf(
            &[Block::Paragraph {
                text: "hello world".to_string(),
            }],
            "Doc",
            &mut images,
        )
        .unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
        let text = as_text(&bytes);
        assert!(text.contains("xref"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("(hello world) Tj"));
    }

    #[test]
    fn empty_block_list_renders_the_title() {
        let mut images = FailingImages;
        let bytes = write_pdf(&[], "Lonely Title", &mut images).unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("/Type /Page"));
        assert!(text.contains("(Lonely Title) Tj"));
    }

    #[test]
    fn parentheses_and_backslashes_are_escaped() {
        let mut images = FailingImages;
        let bytes = write_pdf(
            &[Block::Paragraph {
                text: r"f(x) = a\b".to_string(),
            }],
            "Doc",
            &mut images,
        )
        .unwrap();
        assert!(as_text(&bytes).contains(r"(f\(x\) = a\\b) Tj"));
    }

    #[test]
    fn long_paragraph_spills_onto_more_pages() {
        let mut images = FailingImages;
        let long = "word ".repeat(4000);
        let bytes = write_pdf(
            &[Block::Paragraph { text: long }],
            "Doc",
            &mut images,
        )
        .unwrap();
        let text = as_text(&bytes);
        assert!(text.matches("/Type /Page ").count() >= 2);
    }

    #[test]
    fn non_jpeg_image_degrades_to_placeholder() {
        let mut images = PngImages;
        let bytes = write_pdf(
            &[Block::Image {
                alt_text: "a chart".to_string(),
                source_url: "https://example.com/chart.png".to_string(),
            }],
            "Doc",
            &mut images,
        )
        .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("[image: a chart]"));
        assert!(!text.contains("/DCTDecode"));
    }

    #[test]
    fn jpeg_image_is_embedded_as_xobject() {
        let mut images = JpegImages;
        let bytes = write_pdf(
            &[Block::Image {
                alt_text: String::new(),
                source_url: "https://example.com/photo.jpg".to_string(),
            }],
            "Doc",
            &mut images,
        )
        .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("/DCTDecode"));
        assert!(text.contains("/Width 40"));
        assert!(text.contains("/Height 20"));
        assert!(text.contains("/Im1 Do"));
    }

    #[test]
    fn emission_leaves_no_staged_image_files() {
        use crate::emit::test_support::{assert_no_staged_images_leaked, staged_image_files};
        let before = staged_image_files();
        let blocks = [Block::Image {
            alt_text: "pic".to_string(),
            source_url: "https://example.com/pic.jpg".to_string(),
        }];
        let mut fetched = JpegImages;
        write_pdf(&blocks, "Doc", &mut fetched).unwrap();
        let mut failing = FailingImages;
        write_pdf(&blocks, "Doc", &mut failing).unwrap();
        let mut wrong_format = PngImages;
        write_pdf(&blocks, "Doc", &mut wrong_format).unwrap();
        assert_no_staged_images_leaked(&before);
    }

    #[test]
    fn wrap_text_respects_width_budget() {
        let lines = wrap_text(&"ab ".repeat(100), 10.0, 0.5, 100.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.chars().count() <= 20);
        }
    }

    #[test]
    fn wrap_text_hard_splits_oversized_words() {
        let lines = wrap_text(&"x".repeat(100), 10.0, 0.5, 100.0);
        assert!(lines.len() >= 5);
    }

    #[test]
    fn table_renders_as_fixed_pitch_rows() {
        let mut images = FailingImages;
        let bytes = write_pdf(
            &[Block::Table {
                header_cells: vec!["A".to_string(), "B".to_string()],
                rows: vec![vec!["1".to_string(), "2".to_string()]],
            }],
            "Doc",
            &mut images,
        )
        .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("(A | B) Tj"));
        assert!(text.contains("(1 | 2) Tj"));
    }
}
