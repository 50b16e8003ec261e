//! Canonical data model for converted documents.
//!
//! Every page goes through the same pipeline: raw HTML -> canonical HTML ->
//! ordered `Block` sequence. The emitters consume this as the single source
//! of truth; no emitter ever looks at raw HTML again.

use crate::emit::{OutputFormat, StyleOptions};
use crate::translate::ProviderKind;
use serde::{Deserialize, Serialize};

/// One piece of document content, tagged by kind.
///
/// Block order is document order. Blocks never nest: tables and code blocks
/// are leaves, and inline markup inside them is flattened to text (except for
/// the language tag on code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Block {
    Heading {
        /// 1..=6, from the tag name suffix.
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    CodeBlock {
        /// From a `language-xxx` class on the inner code element, if any.
        language: Option<String>,
        text: String,
    },
    Blockquote {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        alt_text: String,
        /// Absolute URL, resolved against the page's base URL.
        source_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Table {
        header_cells: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl Block {
    /// Text that a translation provider may rewrite. Code block text and
    /// table cells are deliberately excluded to avoid corrupting identifiers.
    pub fn translatable_text(&self) -> Option<&str> {
        match self {
            Block::Heading { text, .. } => Some(text),
            Block::Paragraph { text } => Some(text),
            Block::Blockquote { text } => Some(text),
            Block::Image { alt_text, .. } => Some(alt_text),
            Block::CodeBlock { .. } | Block::Table { .. } => None,
        }
    }

    /// Replace the translatable text. No-op for blocks with none.
    pub fn set_translatable_text(&mut self, new_text: String) {
        match self {
            Block::Heading { text, .. } => *text = new_text,
            Block::Paragraph { text } => *text = new_text,
            Block::Blockquote { text } => *text = new_text,
            Block::Image { alt_text, .. } => *alt_text = new_text,
            Block::CodeBlock { .. } | Block::Table { .. } => {}
        }
    }
}

/// One fetched page. `blocks` is populated after sanitize + extract and is
/// what the emitters consume. Owned exclusively by the job that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    #[serde(rename = "rawContent")]
    pub raw_content: String,
    pub blocks: Vec<Block>,
}

/// Where the pages come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// A rendered page (optionally a batch of pages linked from a menu).
    Url {
        url: String,
        /// CSS selector for the content subtree; the whole body if absent.
        content_selector: Option<String>,
        /// CSS selector for a menu whose links enumerate the pages to fetch.
        menu_selector: Option<String>,
    },
    /// Raw multi-page text; pages split on blank lines.
    Text { content: String },
}

/// Immutable description of one document-generation request.
///
/// Validated when the job starts; never mutated afterward.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub title: String,
    pub source: Source,
    pub format: OutputFormat,
    /// true: one document with a heading per page; false: per-page output.
    pub merge_pages: bool,
    pub target_lang: Option<String>,
    pub provider: ProviderKind,
    pub style: StyleOptions,
}

/// A per-unit translation outcome. Unit-level so a failed unit can fall back
/// to its original text without discarding the rest of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    #[serde(rename = "originalText")]
    pub original_text: String,
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}
