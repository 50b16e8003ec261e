//! Markdown emitter. Generated from the block sequence directly, never by
//! converting HTML, so the output carries no markup residue.
//!
//! Multi-page split requests bundle per-page files with a linking index into
//! a ZIP; everything else is a single .md file.

use super::{sanitize_file_stem, EmitError};
use crate::model::{Block, Page};
use std::io::Write;

/// Render one block to Markdown, trailing blank line included.
pub fn block_to_markdown(block: &Block) -> String {
    match block {
        Block::Heading { level, text } => {
            let level = (*level).clamp(1, 6) as usize;
            format!("{} {}\n\n", "#".repeat(level), text)
        }
        Block::Paragraph { text } => format!("{text}\n\n"),
        Block::CodeBlock { language, text } => {
            let lang = language.as_deref().unwrap_or("");
            let body = text.trim_end_matches('\n');
            format!("```{lang}\n{body}\n```\n\n")
        }
        Block::Blockquote { text } => {
            let mut out = String::new();
            for line in text.lines() {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
            out
        }
        Block::Image {
            alt_text,
            source_url,
        } => {
            let mut out = format!("![{alt_text}]({source_url})\n\n");
            if !alt_text.trim().is_empty() {
                out.push_str(&format!("*{alt_text}*\n\n"));
            }
            out
        }
        Block::Table { header_cells, rows } => {
            if header_cells.is_empty() && rows.is_empty() {
                return String::new();
            }
            let width = header_cells
                .len()
                .max(rows.iter().map(Vec::len).max().unwrap_or(0));
            let mut out = String::new();
            out.push_str(&table_row(header_cells, width));
            out.push_str(&separator_row(width));
            for row in rows {
                out.push_str(&table_row(row, width));
            }
            out.push('\n');
            out
        }
    }
}

fn table_row(cells: &[String], width: usize) -> String {
    let mut out = String::from("|");
    for i in 0..width {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        out.push_str(&format!(" {} |", cell.replace('|', "\\|")));
    }
    out.push('\n');
    out
}

fn separator_row(width: usize) -> String {
    let mut out = String::from("|");
    for _ in 0..width {
        out.push_str(" --- |");
    }
    out.push('\n');
    out
}

pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    blocks.iter().map(block_to_markdown).collect()
}

/// Render one page. An empty page degrades to its title so the output is
/// never zero bytes.
pub fn page_to_markdown(page: &Page) -> String {
    if page.blocks.is_empty() {
        return format!("# {}\n\n", page.title);
    }
    blocks_to_markdown(&page.blocks)
}

/// ZIP of per-page Markdown files plus a `00_index.md` linking them in order.
pub fn write_markdown_bundle(pages: &[Page], title: &str) -> Result<Vec<u8>, EmitError> {
    let cursor = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(cursor);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let names: Vec<String> = pages
        .iter()
        .enumerate()
        .map(|(i, page)| format!("{:02}_{}.md", i + 1, sanitize_file_stem(&page.title)))
        .collect();

    let mut index = format!("# {title}\n\n");
    for (page, name) in pages.iter().zip(&names) {
        index.push_str(&format!("1. [{}]({})\n", page.title, name));
    }
    zip.start_file("00_index.md", options)?;
    zip.write_all(index.as_bytes())?;

    for (page, name) in pages.iter().zip(&names) {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(page_to_markdown(page).as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::read::ZipArchive;

    #[test]
    fn renders_heading_and_paragraph() {
        let blocks = vec![
            Block::Heading {
                level: 1,
                text: "Title".to_string(),
            },
            Block::Paragraph {
                text: "Hello".to_string(),
            },
        ];
        assert_eq!(blocks_to_markdown(&blocks), "# Title\n\nHello\n\n");
    }

    #[test]
    fn code_block_carries_language_fence() {
        let block = Block::CodeBlock {
            language: Some("rust".to_string()),
            text: "fn main() {}\n".to_string(),
        };
        assert_eq!(block_to_markdown(&block), "```rust\nfn main() {}\n```\n\n");
    }

    #[test]
    fn code_block_without_language_has_bare_fence() {
        let block = Block::CodeBlock {
            language: None,
            text: "x".to_string(),
        };
        assert_eq!(block_to_markdown(&block), "```\nx\n```\n\n");
    }

    #[test]
    fn blockquote_prefixes_each_line() {
        let block = Block::Blockquote {
            text: "first\nsecond".to_string(),
        };
        assert_eq!(block_to_markdown(&block), "> first\n> second\n\n");
    }

    #[test]
    fn image_gets_italic_caption_when_alt_present() {
        let block = Block::Image {
            alt_text: "chart".to_string(),
            source_url: "https://e.com/a.png".to_string(),
        };
        assert_eq!(
            block_to_markdown(&block),
            "![chart](https://e.com/a.png)\n\n*chart*\n\n"
        );
        let bare = Block::Image {
            alt_text: String::new(),
            source_url: "https://e.com/a.png".to_string(),
        };
        assert_eq!(block_to_markdown(&bare), "![](https://e.com/a.png)\n\n");
    }

    #[test]
    fn table_renders_header_separator_then_rows() {
        let block = Block::Table {
            header_cells: vec!["A".to_string(), "B".to_string()],
            rows: vec![vec!["1".to_string(), "2".to_string()]],
        };
        assert_eq!(
            block_to_markdown(&block),
            "| A | B |\n| --- | --- |\n| 1 | 2 |\n\n"
        );
    }

    #[test]
    fn ragged_table_rows_are_padded() {
        let block = Block::Table {
            header_cells: vec!["A".to_string()],
            rows: vec![vec!["1".to_string(), "2".to_string()]],
        };
        let md = block_to_markdown(&block);
        assert!(md.starts_with("| A |  |\n| --- | --- |\n"));
    }

    #[test]
    fn empty_page_degrades_to_title_heading() {
        let page = Page {
            title: "Empty".to_string(),
            raw_content: String::new(),
            blocks: vec![],
        };
        assert_eq!(page_to_markdown(&page), "# Empty\n\n");
    }

    #[test]
    fn bundle_contains_index_and_numbered_pages() {
        let pages = vec![
            Page {
                title: "Getting Started".to_string(),
                raw_content: String::new(),
                blocks: vec![Block::Paragraph {
                    text: "go".to_string(),
                }],
            },
            Page {
                title: "Reference".to_string(),
                raw_content: String::new(),
                blocks: vec![],
            },
        ];
        let bytes = write_markdown_bundle(&pages, "Docs").unwrap();
        let mut zip = ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"00_index.md".to_string()));
        assert!(names.contains(&"01_getting-started.md".to_string()));
        assert!(names.contains(&"02_reference.md".to_string()));
        let mut index = String::new();
        zip.by_name("00_index.md")
            .unwrap()
            .read_to_string(&mut index)
            .unwrap();
        assert!(index.contains("# Docs"));
        assert!(index.contains("[Getting Started](01_getting-started.md)"));
    }
}
