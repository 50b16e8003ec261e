//! DOCX writer. A .docx file is a ZIP of WordprocessingML parts; this module
//! assembles the minimal part set by hand (content types, relationships,
//! styles, document body, embedded media).

use super::{
    image_dimensions, image_media_type, is_svg_url, xml_escape, EmitError, FetchedImage,
    StyleOptions,
};
use crate::fetch::ImageFetcher;
use crate::model::Block;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Embedded image display width: 6 inches at 914400 EMU per inch. Height
/// follows the image's own aspect ratio, 4:3 when the header is unreadable.
const IMAGE_CX_EMU: u64 = 5_486_400;
const IMAGE_CY_FALLBACK_EMU: u64 = 3_657_600;

/// First relationship id used for media; rId1 is reserved for styles.
const MEDIA_RID_BASE: usize = 10;

struct MediaPart {
    name: String,
    data: Vec<u8>,
}

/// Write one block sequence as a complete .docx archive.
///
/// Raster images are fetched, staged in temp files, and embedded; SVG and
/// unfetchable images degrade to a bracketed placeholder paragraph. The
/// write itself only fails on archive errors.
pub fn write_docx(
    blocks: &[Block],
    style: &StyleOptions,
    images: &mut dyn ImageFetcher,
) -> Result<Vec<u8>, EmitError> {
    let mut body = String::new();
    let mut media: Vec<MediaPart> = Vec::new();

    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let level = (*level).clamp(1, 6);
                body.push_str(&styled_paragraph(&format!("Heading{level}"), text));
            }
            Block::Paragraph { text } => body.push_str(&plain_paragraph(text)),
            Block::CodeBlock { text, .. } => {
                // One Code-styled paragraph per line keeps indentation intact.
                let lines: Vec<&str> = text.trim_end_matches('\n').split('\n').collect();
                for line in lines {
                    body.push_str(&styled_paragraph("Code", line));
                }
            }
            Block::Blockquote { text } => body.push_str(&styled_paragraph("Quote", text)),
            Block::Image {
                alt_text,
                source_url,
            } => {
                append_image(&mut body, &mut media, images, source_url, alt_text);
            }
            Block::Table { header_cells, rows } => {
                if header_cells.is_empty() && rows.is_empty() {
                    continue;
                }
                body.push_str(&table_xml(header_cells, rows));
            }
        }
    }
    if body.is_empty() {
        body.push_str(&plain_paragraph(""));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(&media).as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(document_rels_xml(&media).as_bytes())?;

    zip.start_file("word/styles.xml", options)?;
    zip.write_all(styles_xml(style).as_bytes())?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(document_xml(&body).as_bytes())?;

    for part in &media {
        zip.start_file(format!("word/media/{}", part.name), options)?;
        zip.write_all(&part.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn append_image(
    body: &mut String,
    media: &mut Vec<MediaPart>,
    images: &mut dyn ImageFetcher,
    source_url: &str,
    alt_text: &str,
) {
    let label = if alt_text.trim().is_empty() {
        source_url
    } else {
        alt_text
    };
    if is_svg_url(source_url) {
        body.push_str(&styled_paragraph("Caption", &format!("[SVG image: {label}]")));
        return;
    }
    let Some(staged) = FetchedImage::fetch(images, source_url) else {
        body.push_str(&styled_paragraph(
            "Caption",
            &format!("[Image unavailable: {label}]"),
        ));
        return;
    };
    let data = match staged.bytes() {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Warning: could not read staged image {source_url}: {e}");
            body.push_str(&styled_paragraph(
                "Caption",
                &format!("[Image unavailable: {label}]"),
            ));
            return;
        }
    };
    let cy = image_dimensions(&data)
        .map(|(width, height)| IMAGE_CX_EMU * u64::from(height) / u64::from(width))
        .unwrap_or(IMAGE_CY_FALLBACK_EMU);
    let index = media.len() + 1;
    let name = format!("image{}.{}", index, staged.extension());
    media.push(MediaPart { name, data });
    body.push_str(&drawing_xml(index, cy));
    if !alt_text.trim().is_empty() {
        body.push_str(&styled_paragraph("Caption", alt_text));
    }
}

fn plain_paragraph(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        xml_escape(text)
    )
}

fn styled_paragraph(style_id: &str, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="{style_id}"/></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        xml_escape(text)
    )
}

fn table_xml(header_cells: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::from(
        r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/><w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/><w:left w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/><w:right w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="DFE2E5"/></w:tblBorders></w:tblPr>"#,
    );
    if !header_cells.is_empty() {
        out.push_str("<w:tr>");
        for cell in header_cells {
            out.push_str(&format!(
                r#"<w:tc><w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:tc>"#,
                xml_escape(cell)
            ));
        }
        out.push_str("</w:tr>");
    }
    for row in rows {
        out.push_str("<w:tr>");
        for cell in row {
            out.push_str(&format!(
                r#"<w:tc><w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p></w:tc>"#,
                xml_escape(cell)
            ));
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
    out
}

fn drawing_xml(index: usize, cy: u64) -> String {
    let rid = MEDIA_RID_BASE + index;
    format!(
        r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{index}" name="Image {index}"/><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="{index}" name="Image {index}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="rId{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
        cx = IMAGE_CX_EMU,
        cy = cy,
        index = index,
        rid = rid
    )
}

fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440"/></w:sectPr></w:body></w:document>"#
    )
}

fn content_types_xml(media: &[MediaPart]) -> String {
    let mut defaults = String::from(
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#,
    );
    for ext in ["png", "jpg", "gif"] {
        if media.iter().any(|m| m.name.ends_with(ext)) {
            defaults.push_str(&format!(
                r#"<Default Extension="{ext}" ContentType="{}"/>"#,
                image_media_type(ext)
            ));
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">{defaults}<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#
    )
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn document_rels_xml(media: &[MediaPart]) -> String {
    let mut rels = String::from(
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
    );
    for (i, part) in media.iter().enumerate() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
            MEDIA_RID_BASE + i + 1,
            part.name
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

fn styles_xml(style: &StyleOptions) -> String {
    let font = xml_escape(&style.font_family);
    let mut headings = String::new();
    for level in 1u8..=6 {
        // Half-point sizes: 32, 30, 28, 26, 24, 22 for levels 1..6.
        let size = 2 * (16 - u32::from(level) + 1);
        headings.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:before="240" w:after="120"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:eastAsia="{font}"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:styleId="Normal" w:default="1"><w:name w:val="Normal"/></w:style>{headings}<w:style w:type="paragraph" w:styleId="Code"><w:name w:val="Code"/><w:basedOn w:val="Normal"/><w:pPr><w:shd w:val="clear" w:color="auto" w:fill="F6F8FA"/><w:ind w:left="360" w:right="360"/></w:pPr><w:rPr><w:rFonts w:ascii="Consolas" w:hAnsi="Consolas"/><w:sz w:val="20"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Quote"><w:name w:val="Quote"/><w:basedOn w:val="Normal"/><w:pPr><w:ind w:left="360"/></w:pPr><w:rPr><w:i/><w:color w:val="555555"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Caption"><w:name w:val="caption"/><w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:i/><w:sz w:val="18"/></w:rPr></w:style></w:styles>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::test_support::{
        assert_no_staged_images_leaked, staged_image_files, FailingImages, PngImages,
    };
    use crate::fetch::FetchError;
    use std::io::Read;
    use zip::read::ZipArchive;

    /// Returns a complete PNG header for a 200x100 image.
    struct WidePngImages;

    impl ImageFetcher for WidePngImages {
        fn get(&mut self, _url: &str) -> Result<Vec<u8>, FetchError> {
            let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
            png.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
            png.extend_from_slice(b"IHDR");
            png.extend_from_slice(&200u32.to_be_bytes());
            png.extend_from_slice(&100u32.to_be_bytes());
            png.extend_from_slice(&[8, 6, 0, 0, 0]);
            Ok(png)
        }
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut zip = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn archive_contains_required_parts() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[Block::Paragraph {
                text: "hello".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let zip = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/document.xml",
            "word/styles.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part.to_string()), "missing {part}");
        }
        assert!(read_entry(&bytes, "word/document.xml").contains("hello"));
    }

    #[test]
    fn headings_and_quotes_use_their_styles() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[
                Block::Heading {
                    level: 2,
                    text: "Setup".to_string(),
                },
                Block::Blockquote {
                    text: "wise words".to_string(),
                },
            ],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        assert!(doc.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(doc.contains(r#"<w:pStyle w:val="Quote"/>"#));
    }

    #[test]
    fn code_block_becomes_one_paragraph_per_line() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[Block::CodeBlock {
                language: Some("rust".to_string()),
                text: "line one\nline two\n".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        assert_eq!(doc.matches(r#"<w:pStyle w:val="Code"/>"#).count(), 2);
        assert!(doc.contains("line one"));
        assert!(doc.contains("line two"));
    }

    #[test]
    fn table_header_row_is_bold() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[Block::Table {
                header_cells: vec!["Name".to_string()],
                rows: vec![vec!["Ana".to_string()]],
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        let bold_header = doc.find("<w:b/>").unwrap();
        let data_cell = doc.find("Ana").unwrap();
        assert!(bold_header < data_cell);
    }

    #[test]
    fn fetched_image_is_embedded_with_relationship() {
        let mut images = PngImages;
        let bytes = write_docx(
            &[Block::Image {
                alt_text: "chart".to_string(),
                source_url: "https://example.com/chart.png".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let zip = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"word/media/image1.png".to_string()));
        let rels = read_entry(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="media/image1.png""#));
        let doc = read_entry(&bytes, "word/document.xml");
        assert!(doc.contains(r#"r:embed="rId11""#));
        assert!(doc.contains("chart"));
        let types = read_entry(&bytes, "[Content_Types].xml");
        assert!(types.contains(r#"Extension="png""#));
    }

    #[test]
    fn embedded_image_height_follows_the_source_aspect() {
        let mut images = WidePngImages;
        let bytes = write_docx(
            &[Block::Image {
                alt_text: String::new(),
                source_url: "https://example.com/wide.png".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        // 2:1 source at the fixed 6-inch width.
        assert!(doc.contains(r#"cx="5486400" cy="2743200""#));
    }

    #[test]
    fn image_without_readable_header_keeps_fallback_height() {
        let mut images = PngImages;
        let bytes = write_docx(
            &[Block::Image {
                alt_text: String::new(),
                source_url: "https://example.com/stub.png".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        assert!(doc.contains(r#"cx="5486400" cy="3657600""#));
    }

    #[test]
    fn emission_leaves_no_staged_image_files() {
        let before = staged_image_files();
        let blocks = [Block::Image {
            alt_text: "pic".to_string(),
            source_url: "https://example.com/pic.png".to_string(),
        }];
        let mut fetched = WidePngImages;
        write_docx(&blocks, &StyleOptions::default(), &mut fetched).unwrap();
        let mut failing = FailingImages;
        write_docx(&blocks, &StyleOptions::default(), &mut failing).unwrap();
        assert_no_staged_images_leaked(&before);
    }

    #[test]
    fn unfetchable_image_degrades_to_placeholder() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[Block::Image {
                alt_text: "gone".to_string(),
                source_url: "https://example.com/gone.png".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        assert!(doc.contains("[Image unavailable: gone]"));
        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(!zip.file_names().any(|n| n.starts_with("word/media/")));
    }

    #[test]
    fn svg_image_degrades_to_placeholder_without_fetching() {
        let mut images = FailingImages;
        let bytes = write_docx(
            &[Block::Image {
                alt_text: String::new(),
                source_url: "https://example.com/logo.svg".to_string(),
            }],
            &StyleOptions::default(),
            &mut images,
        )
        .unwrap();
        let doc = read_entry(&bytes, "word/document.xml");
        assert!(doc.contains("[SVG image: https://example.com/logo.svg]"));
    }

    #[test]
    fn empty_block_list_still_produces_a_document() {
        let mut images = FailingImages;
        let bytes = write_docx(&[], &StyleOptions::default(), &mut images).unwrap();
        assert!(read_entry(&bytes, "word/document.xml").contains("<w:body>"));
    }

    #[test]
    fn styles_carry_the_configured_font() {
        let style = StyleOptions {
            font_family: "Example Sans".to_string(),
        };
        let mut images = FailingImages;
        let bytes = write_docx(&[], &style, &mut images).unwrap();
        let styles = read_entry(&bytes, "word/styles.xml");
        assert!(styles.contains(r#"w:ascii="Example Sans""#));
    }
}
