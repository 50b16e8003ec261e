//! EPUB 3 writer. Consumes block sequences and writes the archive in memory
//! (mimetype, container, OPF, nav, cover, optional toc page, chapters,
//! embedded images).

use super::{
    image_media_type, sanitize_file_stem, xml_escape, EmitError, FetchedImage, StyleOptions,
};
use crate::fetch::ImageFetcher;
use crate::model::{Block, Page};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

struct ChapterDoc {
    title: String,
    body: String,
}

struct ImageResource {
    href: String,
    data: Vec<u8>,
    media_type: &'static str,
}

/// Write pages as an EPUB 3 archive, one chapter per page.
///
/// Image references are fetched and embedded; a failed fetch keeps the
/// remote URL in the chapter and warns to stderr, it never fails the write.
/// A visible table-of-contents page is included when there is more than one
/// chapter.
pub fn write_epub(
    pages: &[Page],
    title: &str,
    style: &StyleOptions,
    images: &mut dyn ImageFetcher,
) -> Result<Vec<u8>, EmitError> {
    let mut resources: Vec<ImageResource> = Vec::new();
    let mut chapters: Vec<ChapterDoc> = Vec::new();
    for page in pages {
        chapters.push(ChapterDoc {
            title: page.title.clone(),
            body: blocks_to_xhtml(&page.blocks, images, &mut resources),
        });
    }
    if chapters.is_empty() {
        chapters.push(ChapterDoc {
            title: title.to_string(),
            body: String::new(),
        });
    }
    let include_toc_page = chapters.len() > 1;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed (required by the EPUB container format).
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_css(style, &mut zip, options_deflate)?;
    write_opf(
        title,
        &chapters,
        &resources,
        include_toc_page,
        &mut zip,
        options_deflate,
    )?;
    write_nav_xhtml(&chapters, &mut zip, options_deflate)?;
    write_cover_xhtml(title, &mut zip, options_deflate)?;
    if include_toc_page {
        write_toc_page_xhtml(&chapters, &mut zip, options_deflate)?;
    }
    write_chapters(&chapters, &mut zip, options_deflate)?;
    for resource in &resources {
        zip.start_file(format!("{}{}", OEBPS_PREFIX, resource.href), options_deflate)?;
        zip.write_all(&resource.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Render blocks to the chapter body, embedding fetched images as archive
/// resources as a side effect.
fn blocks_to_xhtml(
    blocks: &[Block],
    images: &mut dyn ImageFetcher,
    resources: &mut Vec<ImageResource>,
) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let level = (*level).clamp(1, 6);
                body.push_str(&format!(
                    "  <h{level}>{}</h{level}>\n",
                    xml_escape(text)
                ));
            }
            Block::Paragraph { text } => {
                body.push_str(&format!("  <p>{}</p>\n", xml_escape(text)));
            }
            Block::CodeBlock { language, text } => {
                let code = match language {
                    Some(lang) => format!(
                        r#"<code class="language-{}">{}</code>"#,
                        xml_escape(lang),
                        xml_escape(text)
                    ),
                    None => format!("<code>{}</code>", xml_escape(text)),
                };
                body.push_str(&format!("  <pre>{code}</pre>\n"));
            }
            Block::Blockquote { text } => {
                body.push_str(&format!(
                    "  <blockquote><p>{}</p></blockquote>\n",
                    xml_escape(text)
                ));
            }
            Block::Image {
                alt_text,
                source_url,
            } => {
                let src = match FetchedImage::fetch(images, source_url) {
                    Some(staged) => match staged.bytes() {
                        Ok(data) => {
                            let href =
                                format!("images/img-{}.{}", resources.len() + 1, staged.extension());
                            resources.push(ImageResource {
                                href: href.clone(),
                                media_type: image_media_type(staged.extension()),
                                data,
                            });
                            href
                        }
                        Err(e) => {
                            eprintln!(
                                "Warning: could not read staged image {source_url}: {e}. Keeping remote reference."
                            );
                            source_url.clone()
                        }
                    },
                    None => source_url.clone(),
                };
                body.push_str(&format!(
                    "  <img src=\"{}\" alt=\"{}\"/>\n",
                    xml_escape(&src),
                    xml_escape(alt_text)
                ));
                if !alt_text.trim().is_empty() {
                    body.push_str(&format!(
                        "  <p class=\"image-caption\">{}</p>\n",
                        xml_escape(alt_text)
                    ));
                }
            }
            Block::Table { header_cells, rows } => {
                if header_cells.is_empty() && rows.is_empty() {
                    continue;
                }
                body.push_str("  <table>\n    <thead>\n      <tr>");
                for cell in header_cells {
                    body.push_str(&format!("<th>{}</th>", xml_escape(cell)));
                }
                body.push_str("</tr>\n    </thead>\n    <tbody>\n");
                for row in rows {
                    body.push_str("      <tr>");
                    for cell in row {
                        body.push_str(&format!("<td>{}</td>", xml_escape(cell)));
                    }
                    body.push_str("</tr>\n");
                }
                body.push_str("    </tbody>\n  </table>\n");
            }
        }
    }
    body
}

fn write_css(
    style: &StyleOptions,
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    let css = format!(
        r#"body {{
  font-family: "{font}", sans-serif;
  line-height: 1.6;
  margin: 1em;
}}
pre {{
  background: #f6f8fa;
  padding: 0.8em;
  overflow-x: auto;
}}
code {{
  font-family: "Consolas", monospace;
}}
blockquote {{
  border-left: 3px solid #ccc;
  margin-left: 0;
  padding-left: 1em;
  color: #555;
}}
img {{
  max-width: 100%;
  height: auto;
}}
.image-caption {{
  text-align: center;
  font-style: italic;
  font-size: 0.9em;
}}
table {{
  border-collapse: collapse;
}}
th, td {{
  border: 1px solid #dfe2e5;
  padding: 0.4em 0.8em;
}}
"#,
        font = style.font_family
    );
    zip.start_file(format!("{}style/default.css", OEBPS_PREFIX), options)?;
    zip.write_all(css.as_bytes())?;
    Ok(())
}

fn write_opf(
    title: &str,
    chapters: &[ChapterDoc],
    resources: &[ImageResource],
    include_toc_page: bool,
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    let id = format!("urn:webtome:{}", sanitize_file_stem(title));
    let title = xml_escape(title);

    let mut manifest = String::from(
        r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
  <item id="css" href="style/default.css" media-type="text/css"/>
  <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
"#,
    );
    if include_toc_page {
        manifest.push_str(
            r#"  <item id="toc-page" href="toc.xhtml" media-type="application/xhtml+xml"/>
"#,
        );
    }
    for (i, _) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            r#"  <item id="chapter-{}" href="chapter-{}.xhtml" media-type="application/xhtml+xml"/>
"#,
            i + 1,
            i + 1
        ));
    }
    for (i, resource) in resources.iter().enumerate() {
        manifest.push_str(&format!(
            r#"  <item id="img-{}" href="{}" media-type="{}"/>
"#,
            i + 1,
            resource.href,
            resource.media_type
        ));
    }

    // Spine is reading order: cover, optional toc page, then chapters.
    let mut spine = String::from(r#"  <itemref idref="cover"/>"#);
    if include_toc_page {
        spine.push_str("\n  <itemref idref=\"toc-page\"/>");
    }
    for (i, _) in chapters.iter().enumerate() {
        spine.push_str(&format!("\n  <itemref idref=\"chapter-{}\"/>", i + 1));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0"
  xmlns:dc="http://purl.org/dc/elements/1.1/">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
  {manifest}</manifest>
  <spine>
{spine}
  </spine>
  <guide>
    <reference type="cover" href="cover.xhtml" title="Cover"/>
  </guide>
</package>
"#,
        id = xml_escape(&id),
        title = title,
        manifest = manifest,
        spine = spine
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn chapter_list_items(chapters: &[ChapterDoc]) -> String {
    let mut items = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        items.push_str(&format!(
            r#"    <li><a href="chapter-{}.xhtml">{}</a></li>
"#,
            i + 1,
            xml_escape(&chapter.title)
        ));
    }
    items
}

fn write_nav_xhtml(
    chapters: &[ChapterDoc],
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    let nav = format!(
        r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}
    </ol>
  </nav>
</body>
</html>
"#,
        chapter_list_items(chapters)
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_toc_page_xhtml(
    chapters: &[ChapterDoc],
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    let toc_xhtml = format!(
        r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
  <link rel="stylesheet" type="text/css" href="style/default.css"/>
</head>
<body>
  <h1>Table of Contents</h1>
  <ol>
{}
  </ol>
</body>
</html>
"#,
        chapter_list_items(chapters)
    );
    zip.start_file(format!("{}toc.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(toc_xhtml.as_bytes())?;
    Ok(())
}

fn write_cover_xhtml(
    title: &str,
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    let cover_xhtml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
  <link rel="stylesheet" type="text/css" href="style/default.css"/>
</head>
<body>
  <div style="text-align: center; margin-top: 3em;">
    <h1 style="font-size: 1.5em;">{}</h1>
  </div>
</body>
</html>
"#,
        xml_escape(title)
    );
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(cover_xhtml.as_bytes())?;
    Ok(())
}

fn write_chapters(
    chapters: &[ChapterDoc],
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), EmitError> {
    for (i, chapter) in chapters.iter().enumerate() {
        let html = format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
  <link rel="stylesheet" type="text/css" href="style/default.css"/>
</head>
<body>
{}</body>
</html>
"#,
            xml_escape(&chapter.title),
            chapter.body
        );
        let name = format!("{}chapter-{}.xhtml", OEBPS_PREFIX, i + 1);
        zip.start_file(name, options)?;
        zip.write_all(html.as_bytes())?;
    }
    Ok(())
}
