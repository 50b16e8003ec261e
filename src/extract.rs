//! Block extraction: canonical HTML in, ordered `Block` sequence out.
//!
//! Runs only on sanitizer output, so the tag set here is the sanitizer's
//! allowed set. Unknown containers (lists mostly) are traversed, not mapped.

use crate::model::Block;
use reqwest::Url;
use scraper::{ElementRef, Html};

/// Extract the ordered block sequence from canonical HTML.
///
/// `base_url` resolves relative image references; pass the page's own URL so
/// multi-page batches resolve each page against itself.
pub fn extract(canonical_html: &str, base_url: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(canonical_html);
    let mut blocks = Vec::new();
    collect_blocks(fragment.root_element(), base_url, &mut blocks);
    blocks
}

fn collect_blocks(el: ElementRef, base_url: &str, out: &mut Vec<Block>) {
    for child in el.children() {
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        match child_el.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = heading_level(child_el.value().name());
                let text = collapse_text(child_el);
                if !text.is_empty() {
                    out.push(Block::Heading { level, text });
                }
            }
            "p" => {
                // Captions already travel on the image block as alt text.
                if child_el.value().attr("class") == Some("image-caption") {
                    continue;
                }
                let text = collapse_text(child_el);
                if !text.is_empty() {
                    out.push(Block::Paragraph { text });
                }
            }
            "pre" => out.push(code_block(child_el)),
            "blockquote" => {
                let text = collapse_text(child_el);
                if !text.is_empty() {
                    out.push(Block::Blockquote { text });
                }
            }
            "img" => {
                let alt_text = child_el.value().attr("alt").unwrap_or("").to_string();
                let src = child_el.value().attr("src").unwrap_or("");
                out.push(Block::Image {
                    alt_text,
                    source_url: resolve_url(base_url, src),
                });
            }
            "table" => out.push(table_block(child_el)),
            _ => collect_blocks(child_el, base_url, out),
        }
    }
}

fn heading_level(name: &str) -> u8 {
    name.as_bytes()
        .last()
        .map(|b| b.saturating_sub(b'0'))
        .filter(|l| (1..=6).contains(l))
        .unwrap_or(1)
}

/// Flattened text with inline markup dropped, surrounding whitespace trimmed.
fn collapse_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn code_block(pre: ElementRef) -> Block {
    let mut language = pre.value().attr("data-lang").map(String::from);
    let mut text = None;
    for node in pre.descendants() {
        let Some(code) = ElementRef::wrap(node) else {
            continue;
        };
        if code.value().name() != "code" {
            continue;
        }
        if language.is_none() {
            language = code
                .value()
                .classes()
                .find(|c| c.starts_with("language-"))
                .map(|c| c.trim_start_matches("language-").to_string());
        }
        // First code element wins; whitespace kept verbatim.
        if text.is_none() {
            text = Some(code.text().collect::<String>());
        }
    }
    Block::CodeBlock {
        language: language.filter(|l| !l.is_empty()),
        text: text.unwrap_or_else(|| pre.text().collect::<String>()),
    }
}

fn table_block(table: ElementRef) -> Block {
    let mut header_cells = Vec::new();
    let mut rows = Vec::new();
    for node in table.descendants() {
        let Some(tr) = ElementRef::wrap(node) else {
            continue;
        };
        if tr.value().name() != "tr" {
            continue;
        }
        let cells: Vec<String> = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "th" | "td"))
            .map(collapse_text)
            .collect();
        if cells.is_empty() {
            continue;
        }
        if header_cells.is_empty() && rows.is_empty() {
            header_cells = cells;
        } else {
            rows.push(cells);
        }
    }
    Block::Table { header_cells, rows }
}

/// Absolute URLs pass through; relative ones resolve against the base. An
/// unresolvable reference is returned as-is rather than dropped.
fn resolve_url(base_url: &str, src: &str) -> String {
    if src.is_empty() {
        return String::new();
    }
    if Url::parse(src).is_ok() {
        return src.to_string();
    }
    match Url::parse(base_url).and_then(|base| base.join(src)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://docs.example.com/guide/intro";

    #[test]
    fn maps_headings_with_levels() {
        let blocks = extract("<h1>Top</h1><h3>Deep</h3>", BASE);
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Top".to_string()
                },
                Block::Heading {
                    level: 3,
                    text: "Deep".to_string()
                },
            ]
        );
    }

    #[test]
    fn drops_empty_paragraphs() {
        let blocks = extract("<p>   </p><p>kept</p><p></p>", BASE);
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                text: "kept".to_string()
            }]
        );
    }

    #[test]
    fn code_text_is_not_trimmed() {
        let blocks = extract(
            "<pre data-lang=\"rust\"><code class=\"language-rust\">  indented\nline two\n</code></pre>",
            BASE,
        );
        assert_eq!(
            blocks,
            vec![Block::CodeBlock {
                language: Some("rust".to_string()),
                text: "  indented\nline two\n".to_string()
            }]
        );
    }

    #[test]
    fn pre_without_code_child_uses_own_text() {
        let blocks = extract("<pre>raw text</pre>", BASE);
        assert_eq!(
            blocks,
            vec![Block::CodeBlock {
                language: None,
                text: "raw text".to_string()
            }]
        );
    }

    #[test]
    fn resolves_relative_image_urls() {
        let blocks = extract(r#"<img src="../img/a.png" alt="pic"/>"#, BASE);
        assert_eq!(
            blocks,
            vec![Block::Image {
                alt_text: "pic".to_string(),
                source_url: "https://docs.example.com/img/a.png".to_string()
            }]
        );
    }

    #[test]
    fn absolute_image_urls_pass_through() {
        let blocks = extract(r#"<img src="https://cdn.example.com/a.jpg" alt=""/>"#, BASE);
        assert_eq!(
            blocks,
            vec![Block::Image {
                alt_text: String::new(),
                source_url: "https://cdn.example.com/a.jpg".to_string()
            }]
        );
    }

    #[test]
    fn caption_paragraphs_are_not_duplicated_as_blocks() {
        let html = r#"<img src="a.png" alt="cap"/><p class="image-caption">cap</p><p>body</p>"#;
        let blocks = extract(html, BASE);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0], Block::Image { .. }));
        assert_eq!(
            blocks[1],
            Block::Paragraph {
                text: "body".to_string()
            }
        );
    }

    #[test]
    fn first_row_becomes_table_header() {
        let html = "<table><thead><tr><th>Name</th><th>Age</th></tr></thead>\
                    <tbody><tr><td>Ana</td><td>3</td></tr><tr><td>Bo</td><td>5</td></tr></tbody></table>";
        let blocks = extract(html, BASE);
        assert_eq!(
            blocks,
            vec![Block::Table {
                header_cells: vec!["Name".to_string(), "Age".to_string()],
                rows: vec![
                    vec!["Ana".to_string(), "3".to_string()],
                    vec!["Bo".to_string(), "5".to_string()],
                ],
            }]
        );
    }

    #[test]
    fn blockquote_text_is_flattened() {
        let blocks = extract("<blockquote><p>inner</p> tail</blockquote>", BASE);
        assert_eq!(
            blocks,
            vec![Block::Blockquote {
                text: "inner tail".to_string()
            }]
        );
    }

    #[test]
    fn list_items_are_traversed_for_nested_blocks() {
        let blocks = extract("<ul><li><p>one</p></li><li><p>two</p></li></ul>", BASE);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(extract("", BASE).is_empty());
        assert!(extract("   \n  ", BASE).is_empty());
    }
}
