//! Format emitters. Every emitter consumes the same `Page` / `Block` model
//! and produces in-memory bytes; nothing here writes to the output path.
//!
//! Merge policy lives at this level: merged requests get one document with a
//! top-level heading per page, split requests get one output unit per page.
//! EPUB is the exception; it has native chapters and keeps one per page under
//! either policy.

pub mod docx;
pub mod epub;
pub mod markdown;
pub mod pdf;

use crate::fetch::ImageFetcher;
use crate::model::{Block, Page};
use std::io::Write;
use thiserror::Error;

const DEFAULT_FONT_FAMILY: &str = "Noto Sans KR";

/// Target document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Epub,
    Markdown,
    Docx,
    Pdf,
}

impl OutputFormat {
    /// Parse a user-facing format name, aliases included.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "epub" => Ok(OutputFormat::Epub),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "docx" | "doc" => Ok(OutputFormat::Docx),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!(
                "unknown format '{other}' (expected epub, markdown, docx, or pdf)"
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Markdown => "md",
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Presentation knobs shared by the emitters.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub font_family: String,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Failed to write document: {0}")]
    Io(#[from] std::io::Error),
}

/// Finished document bytes plus the extension they should be saved under.
/// The extension can differ from the requested format when a split request
/// bundles per-page files into a ZIP.
#[derive(Debug)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Emit `pages` as one document (merged) or one output unit per page.
pub fn emit(
    format: OutputFormat,
    pages: &[Page],
    title: &str,
    style: &StyleOptions,
    images: &mut dyn ImageFetcher,
    merge_pages: bool,
) -> Result<Document, EmitError> {
    match format {
        OutputFormat::Epub => {
            // One chapter per page regardless of merge policy; collapsing
            // pages would drop the chapter list and the visible TOC page.
            let bytes = epub::write_epub(pages, title, style, images)?;
            Ok(Document {
                bytes,
                extension: "epub",
            })
        }
        OutputFormat::Markdown => {
            if merge_pages || pages.len() <= 1 {
                let merged = merge(pages, title);
                Ok(Document {
                    bytes: markdown::page_to_markdown(&merged).into_bytes(),
                    extension: "md",
                })
            } else {
                Ok(Document {
                    bytes: markdown::write_markdown_bundle(pages, title)?,
                    extension: "zip",
                })
            }
        }
        OutputFormat::Docx => {
            if merge_pages || pages.len() <= 1 {
                let merged = merge(pages, title);
                Ok(Document {
                    bytes: docx::write_docx(&merged.blocks, style, images)?,
                    extension: "docx",
                })
            } else {
                let bytes = per_page_zip(pages, "docx", |page| {
                    docx::write_docx(&page.blocks, style, &mut *images)
                })?;
                Ok(Document {
                    bytes,
                    extension: "zip",
                })
            }
        }
        OutputFormat::Pdf => {
            if merge_pages || pages.len() <= 1 {
                let merged = merge(pages, title);
                Ok(Document {
                    bytes: pdf::write_pdf(&merged.blocks, &merged.title, images)?,
                    extension: "pdf",
                })
            } else {
                let bytes = per_page_zip(pages, "pdf", |page| {
                    pdf::write_pdf(&page.blocks, &page.title, &mut *images)
                })?;
                Ok(Document {
                    bytes,
                    extension: "zip",
                })
            }
        }
    }
}

/// Collapse pages into one. A single page keeps its blocks as-is; multiple
/// pages are separated by a level-1 heading carrying each page title.
fn merge(pages: &[Page], title: &str) -> Page {
    if pages.len() == 1 {
        let mut page = pages[0].clone();
        page.title = title.to_string();
        return page;
    }
    let mut blocks = Vec::new();
    for page in pages {
        blocks.push(Block::Heading {
            level: 1,
            text: page.title.clone(),
        });
        blocks.extend(page.blocks.iter().cloned());
    }
    Page {
        title: title.to_string(),
        raw_content: String::new(),
        blocks,
    }
}

/// ZIP of one document per page, `NN_title.ext`, index order preserved.
fn per_page_zip<F>(pages: &[Page], extension: &str, mut render: F) -> Result<Vec<u8>, EmitError>
where
    F: FnMut(&Page) -> Result<Vec<u8>, EmitError>,
{
    let cursor = std::io::Cursor::new(Vec::new());
    let mut archive = zip::ZipWriter::new(cursor);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (i, page) in pages.iter().enumerate() {
        let name = format!("{:02}_{}.{}", i + 1, sanitize_file_stem(&page.title), extension);
        archive.start_file(name, options)?;
        archive.write_all(&render(page)?)?;
    }
    Ok(archive.finish()?.into_inner())
}

/// Filesystem-safe stem: alphanumerics kept, separators collapsed to single
/// hyphens, lowercased, bounded length.
pub fn sanitize_file_stem(title: &str) -> String {
    let mut out = String::new();
    let mut prev_hyphen = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen {
            out.push('-');
            prev_hyphen = true;
        }
    }
    let trimmed = out.trim_matches('-');
    let stem: String = trimmed.chars().take(64).collect();
    let stem = stem.trim_matches('-').to_string();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

/// Escape text for XML/XHTML element content and attribute values.
pub(crate) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Fetched image staged in a named temp file. The file is removed when the
/// guard drops, success or failure.
pub(crate) struct FetchedImage {
    file: tempfile::NamedTempFile,
    extension: &'static str,
}

impl FetchedImage {
    /// Fetch and stage one image. Any failure returns None after a warning;
    /// callers degrade to a placeholder.
    pub(crate) fn fetch(images: &mut dyn ImageFetcher, url: &str) -> Option<Self> {
        let bytes = match images.get(url) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Warning: could not fetch image {url}: {e}");
                return None;
            }
        };
        let extension = sniff_image_extension(&bytes, url);
        let mut file = match tempfile::Builder::new()
            .prefix("webtome-img-")
            .suffix(&format!(".{extension}"))
            .tempfile()
        {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Warning: could not stage image {url}: {e}");
                return None;
            }
        };
        if let Err(e) = file.write_all(&bytes) {
            eprintln!("Warning: could not stage image {url}: {e}");
            return None;
        }
        Some(Self { file, extension })
    }

    pub(crate) fn bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }

    pub(crate) fn extension(&self) -> &'static str {
        self.extension
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> std::path::PathBuf {
        self.file.path().to_path_buf()
    }
}

/// Extension from magic bytes, falling back to the URL path, then png.
pub(crate) fn sniff_image_extension(bytes: &[u8], url: &str) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "jpg";
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "png";
    }
    if bytes.starts_with(b"GIF8") {
        return "gif";
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "jpg",
        Some(ext) if ext == "gif" => "gif",
        _ => "png",
    }
}

/// Pixel dimensions from the image header: JPEG start-of-frame, PNG IHDR,
/// or the GIF logical screen descriptor.
pub(crate) fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(bytes);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) && bytes.len() >= 24 && &bytes[12..16] == b"IHDR"
    {
        let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        if width == 0 || height == 0 {
            return None;
        }
        return Some((width, height));
    }
    if bytes.starts_with(b"GIF8") && bytes.len() >= 10 {
        let width = u32::from(u16::from_le_bytes([bytes[6], bytes[7]]));
        let height = u32::from(u16::from_le_bytes([bytes[8], bytes[9]]));
        if width == 0 || height == 0 {
            return None;
        }
        return Some((width, height));
    }
    None
}

/// Image size from the JPEG start-of-frame marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 9 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        // SOF0..SOF15, excluding DHT/JPG/DAC markers.
        if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC {
            let height = u32::from(data[i + 5]) << 8 | u32::from(data[i + 6]);
            let width = u32::from(data[i + 7]) << 8 | u32::from(data[i + 8]);
            if width == 0 || height == 0 {
                return None;
            }
            return Some((width, height));
        }
        let segment_len = usize::from(data[i + 2]) << 8 | usize::from(data[i + 3]);
        if segment_len < 2 {
            return None;
        }
        i += 2 + segment_len;
    }
    None
}

pub(crate) fn image_media_type(extension: &str) -> &'static str {
    match extension {
        "jpg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

/// True for references the raster embedders cannot place directly.
pub(crate) fn is_svg_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".svg")
}
