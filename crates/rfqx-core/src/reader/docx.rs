//! WordprocessingML (DOCX) reader using zip and roxmltree.

use std::io::{Cursor, Read};
use std::path::Path;

use roxmltree::Node;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{ContainerFormat, DocumentReader, ReadOutcome, Result};
use crate::error::ReaderError;
use crate::models::document::{RawImage, SourceLocator, TableRow};
use crate::normalize::{normalize, normalize_key, DocumentSegment};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DOCUMENT_PART: &str = "word/document.xml";
const MEDIA_DIR: &str = "word/media/";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Flow-oriented document reader.
#[derive(Debug, Clone, Default)]
pub struct DocxReader;

impl DocxReader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentReader for DocxReader {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Flow
    }

    fn read(&self, data: &[u8]) -> Result<ReadOutcome> {
        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| ReaderError::malformed("DOCX", format!("not a ZIP archive: {}", e)))?;

        let xml_content = read_zip_text(&mut archive, DOCUMENT_PART)
            .ok_or_else(|| ReaderError::MissingPart(DOCUMENT_PART.to_string()))?;
        let xml = roxmltree::Document::parse(&xml_content)
            .map_err(|e| ReaderError::malformed("DOCX", e))?;
        let body = wml(xml.root_element(), "body")
            .ok_or_else(|| ReaderError::MissingPart("w:body".to_string()))?;

        let mut segment = DocumentSegment::default();
        for node in collect_block_nodes(body) {
            match node.tag_name().name() {
                "p" => {
                    let text = paragraph_text(node);
                    if !text.trim().is_empty() {
                        segment.texts.push(text);
                    }
                }
                "tbl" => segment.table_rows.extend(table_rows(node)),
                _ => {}
            }
        }

        let (images, dropped_images) = collect_media(&mut archive);
        segment.images = images;

        debug!(
            "Read DOCX: {} paragraphs, {} table rows, {} media, {} dropped",
            segment.texts.len(),
            segment.table_rows.len(),
            segment.images.len(),
            dropped_images
        );

        Ok(ReadOutcome {
            document: normalize(vec![segment]),
            dropped_images,
        })
    }
}

fn read_zip_text(archive: &mut Archive<'_>, name: &str) -> Option<String> {
    let mut content = String::new();
    archive.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

fn is_wml(node: Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(WML_NS)
}

fn wml<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children().find(|n| is_wml(*n, name))
}

/// Block-level children, unwrapping content controls (`w:sdt`).
fn collect_block_nodes<'a>(parent: Node<'a, 'a>) -> Vec<Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children().filter(|n| n.is_element()) {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else if child.tag_name().namespace() == Some(WML_NS) {
            nodes.push(child);
        }
    }
    nodes
}

/// Concatenated run text of a paragraph.
fn paragraph_text(paragraph: Node) -> String {
    let mut text = String::new();
    for node in paragraph.descendants().filter(|n| n.is_element()) {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or_default()),
            "tab" if node.parent().is_some_and(|p| is_wml(p, "r")) => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn cell_text(cell: Node) -> String {
    collect_block_nodes(cell)
        .into_iter()
        .filter(|n| n.tag_name().name() == "p")
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Key/value rows from a table: the first two populated cells of each row.
fn table_rows(table: Node) -> Vec<TableRow> {
    collect_block_nodes(table)
        .into_iter()
        .filter(|n| n.tag_name().name() == "tr")
        .filter_map(|row| {
            let mut populated = collect_block_nodes(row)
                .into_iter()
                .filter(|n| n.tag_name().name() == "tc")
                .map(cell_text)
                .filter(|text| !text.trim().is_empty());
            let key = populated.next()?;
            let value = populated.next()?;
            Some(TableRow::new(normalize_key(&key), value))
        })
        .collect()
}

/// Every binary under the media directory, referenced or not.
fn collect_media(archive: &mut Archive<'_>) -> (Vec<RawImage>, usize) {
    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(MEDIA_DIR) && !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    let mut images = Vec::with_capacity(names.len());
    let mut dropped = 0;

    for name in names {
        let mut data = Vec::new();
        let read = archive
            .by_name(&name)
            .map_err(|e| e.to_string())
            .and_then(|mut entry| entry.read_to_end(&mut data).map_err(|e| e.to_string()));

        match read {
            Ok(_) => {
                let extension = Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_string);
                images.push(RawImage::new(
                    SourceLocator::Container { path: name },
                    data,
                    extension,
                ));
            }
            Err(reason) => {
                warn!("Dropping unreadable media entry {}: {}", name, reason);
                dropped += 1;
            }
        }
    }

    (images, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            WML_NS, body
        )
    }

    fn build_docx(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in parts {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
    }

    fn row(cells: &[&str]) -> String {
        let cells: String = cells
            .iter()
            .map(|c| format!("<w:tc>{}</w:tc>", para(c)))
            .collect();
        format!("<w:tr>{}</w:tr>", cells)
    }

    #[test]
    fn test_paragraphs_and_tables() {
        let body = format!(
            "{}{}<w:tbl>{}{}{}{}</w:tbl>{}",
            para("Project Title: Roof repairs"),
            para("   "),
            row(&["Site  Location", "P3-12 North Wing"]),
            row(&["Only key", ""]),
            row(&["", "LRD", "4471"]),
            row(&["Site location", "duplicate"]),
            para("Closing remarks"),
        );
        let xml = document_xml(&body);
        let data = build_docx(&[("word/document.xml", xml.as_bytes())]);

        let outcome = DocxReader::new().read(&data).unwrap();
        let doc = outcome.document;

        assert_eq!(doc.lines(), &["Project Title: Roof repairs", "Closing remarks"]);
        assert_eq!(
            doc.table_rows(),
            &[
                TableRow::new("site location", "P3-12 North Wing"),
                TableRow::new("lrd", "4471"),
                TableRow::new("site location", "duplicate"),
            ]
        );
        assert_eq!(outcome.dropped_images, 0);
    }

    #[test]
    fn test_run_breaks_and_tabs() {
        let body = "<w:p><w:r><w:t>Site</w:t><w:tab/><w:t>Location</w:t><w:br/><w:t>Wharf 4</w:t></w:r></w:p>";
        let xml = document_xml(body);
        let data = build_docx(&[("word/document.xml", xml.as_bytes())]);

        let doc = DocxReader::new().read(&data).unwrap().document;
        assert_eq!(doc.lines(), &["Site\tLocation", "Wharf 4"]);
    }

    #[test]
    fn test_content_controls_are_unwrapped() {
        let body = format!("<w:sdt><w:sdtContent>{}</w:sdtContent></w:sdt>", para("Inside control"));
        let xml = document_xml(&body);
        let data = build_docx(&[("word/document.xml", xml.as_bytes())]);

        let doc = DocxReader::new().read(&data).unwrap().document;
        assert_eq!(doc.lines(), &["Inside control"]);
    }

    #[test]
    fn test_media_directory_walk() {
        let xml = document_xml(&para("x"));
        let data = build_docx(&[
            ("word/document.xml", xml.as_bytes()),
            ("word/media/image1.PNG", b"png-ish"),
            ("word/media/unreferenced.emf", b"emf"),
            ("word/theme/theme1.xml", b"<a/>"),
        ]);

        let doc = DocxReader::new().read(&data).unwrap().document;
        let images = doc.images();
        assert_eq!(images.len(), 2);
        assert_eq!(
            images[0].source_locator,
            SourceLocator::Container { path: "word/media/image1.PNG".to_string() }
        );
        assert_eq!(images[0].declared_extension.as_deref(), Some("png"));
        assert_eq!(images[1].declared_extension.as_deref(), Some("emf"));
    }

    #[test]
    fn test_not_a_zip_is_malformed() {
        let err = DocxReader::new().read(b"%PDF-1.7 not a docx").unwrap_err();
        assert!(matches!(err, ReaderError::Malformed { format: "DOCX", .. }));
    }

    #[test]
    fn test_missing_document_part() {
        let data = build_docx(&[("word/styles.xml", b"<w:styles/>")]);
        let err = DocxReader::new().read(&data).unwrap_err();
        assert!(matches!(err, ReaderError::MissingPart(ref part) if part == DOCUMENT_PART));
    }

    #[test]
    fn test_invalid_xml_is_malformed() {
        let data = build_docx(&[("word/document.xml", b"<w:document><unclosed>")]);
        let err = DocxReader::new().read(&data).unwrap_err();
        assert!(matches!(err, ReaderError::Malformed { .. }));
    }
}
