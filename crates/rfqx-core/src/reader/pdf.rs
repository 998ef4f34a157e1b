//! PDF reader using lopdf, with pdf-extract as a text fallback.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, trace, warn};

use super::raster::render_page;
use super::{ContainerFormat, DocumentReader, MediaMode, ReadOutcome, Result};
use crate::error::ReaderError;
use crate::models::document::{RawImage, SourceLocator};
use crate::normalize::{normalize, DocumentSegment};

/// Form XObjects nest; images inside them are followed this deep.
const MAX_FORM_DEPTH: usize = 4;
/// Guard against cyclic `Parent` chains in the page tree.
const MAX_TREE_DEPTH: usize = 32;

/// Page-oriented document reader.
#[derive(Debug, Clone)]
pub struct PdfReader {
    media_mode: MediaMode,
    preview_dpi: u32,
    max_pages: usize,
}

impl PdfReader {
    /// Create a reader that walks embedded images.
    pub fn new() -> Self {
        Self {
            media_mode: MediaMode::Embedded,
            preview_dpi: 72,
            max_pages: 0,
        }
    }

    /// Set the image strategy.
    pub fn with_media_mode(mut self, mode: MediaMode) -> Self {
        self.media_mode = mode;
        self
    }

    /// Set the flattened preview resolution.
    pub fn with_preview_dpi(mut self, dpi: u32) -> Self {
        self.preview_dpi = dpi.max(1);
        self
    }

    /// Limit the number of pages read (0 = unlimited).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn page_images(&self, doc: &Document, page: u32, page_id: ObjectId, dropped: &mut usize) -> Vec<RawImage> {
        let mut walk = ImageWalk {
            doc,
            page,
            images: Vec::new(),
            seen: HashSet::new(),
            next_index: 0,
            dropped: 0,
        };

        if let Some(resources) = inherited_attribute(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok()) {
            walk.visit(resources, 0);
        }

        *dropped += walk.dropped;
        debug!("Extracted {} images from page {}", walk.images.len(), page);
        walk.images
    }

    fn page_preview(&self, doc: &Document, page: u32, page_id: ObjectId, dropped: &mut usize) -> Vec<RawImage> {
        let rendered = render_page(doc, page_id, self.preview_dpi).and_then(|canvas| {
            let (width, height) = canvas.dimensions();
            encode_png(&DynamicImage::ImageRgb8(canvas)).map(|bytes| (bytes, width, height))
        });

        match rendered {
            Ok((bytes, width, height)) => {
                trace!("Rendered preview of page {}: {}x{}", page, width, height);
                vec![
                    RawImage::new(
                        SourceLocator::Page { page, index: 0 },
                        bytes,
                        Some("png".to_string()),
                    )
                    .with_dimensions(width, height),
                ]
            }
            Err(reason) => {
                warn!("Could not render preview of page {}: {}", page, reason);
                *dropped += 1;
                Vec::new()
            }
        }
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentReader for PdfReader {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Page
    }

    fn read(&self, data: &[u8]) -> Result<ReadOutcome> {
        let (doc, raw_data) = load_document(data)?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(ReaderError::NoPages);
        }
        let limit = match self.max_pages {
            0 => pages.len(),
            max => max.min(pages.len()),
        };

        let mut segments = Vec::with_capacity(limit);
        let mut dropped = 0;

        for (&number, &page_id) in pages.iter().take(limit) {
            let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
                debug!("No text extracted from page {}: {}", number, e);
                String::new()
            });

            let images = match self.media_mode {
                MediaMode::Embedded => self.page_images(&doc, number, page_id, &mut dropped),
                MediaMode::FlattenedPreview => self.page_preview(&doc, number, page_id, &mut dropped),
            };

            segments.push(DocumentSegment {
                texts: vec![text],
                table_rows: Vec::new(),
                images,
            });
        }

        let blank = segments
            .iter()
            .all(|s| s.texts.iter().all(|t| t.trim().is_empty()));
        if blank {
            let source = if limit < pages.len() {
                let beyond: Vec<u32> = pages.keys().skip(limit).copied().collect();
                truncated_copy(&doc, &beyond)
            } else {
                Ok(raw_data.to_vec())
            };
            match source.and_then(|bytes| pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())) {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("Per-page text empty, using whole-document text ({} chars)", text.len());
                    for segment in segments.iter_mut() {
                        segment.texts.clear();
                    }
                    segments[0].texts.push(text);
                }
                Ok(_) => debug!("PDF has no extractable text"),
                Err(e) => debug!("Whole-document text extraction failed: {}", e),
            }
        }

        debug!(
            "Read PDF: {} of {} pages, {} images dropped",
            limit,
            pages.len(),
            dropped
        );

        Ok(ReadOutcome {
            document: normalize(segments),
            dropped_images: dropped,
        })
    }
}

/// Serialize the document without the given pages, so whole-document text
/// extraction stays within the page limit.
fn truncated_copy(doc: &Document, page_numbers: &[u32]) -> std::result::Result<Vec<u8>, String> {
    let mut copy = doc.clone();
    copy.delete_pages(page_numbers);

    let mut bytes = Vec::new();
    copy.save_to(&mut bytes)
        .map_err(|e| format!("failed to save truncated PDF: {}", e))?;
    Ok(bytes)
}

/// Parse the PDF, retrying encrypted files with the empty password.
///
/// Returns the bytes pdf-extract should see: the decrypted copy when
/// decryption was needed.
fn load_document(data: &[u8]) -> Result<(Document, Cow<'_, [u8]>)> {
    let mut doc = Document::load_mem(data).map_err(|e| ReaderError::malformed("PDF", e))?;

    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(ReaderError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");

        let mut decrypted = Vec::new();
        doc.save_to(&mut decrypted)
            .map_err(|e| ReaderError::malformed("PDF", format!("failed to save decrypted PDF: {}", e)))?;
        return Ok((doc, Cow::Owned(decrypted)));
    }

    Ok((doc, Cow::Borrowed(data)))
}

/// Look up a page attribute, following `Parent` links for inherited ones.
pub(super) fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(node_id).ok()?;
        if let Ok(value) = dict.get(key) {
            return doc.dereference(value).ok().map(|(_, object)| object);
        }
        node_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Resolve `/XObject` inside a resources dictionary.
pub(super) fn xobject_dict<'a>(doc: &'a Document, resources: &'a Dictionary) -> Option<&'a Dictionary> {
    let xobjects = resources.get(b"XObject").ok()?;
    doc.dereference(xobjects).ok()?.1.as_dict().ok()
}

pub(super) fn subtype(stream: &Stream) -> Option<&[u8]> {
    stream.dict.get(b"Subtype").ok()?.as_name().ok()
}

struct ImageWalk<'a> {
    doc: &'a Document,
    page: u32,
    images: Vec<RawImage>,
    seen: HashSet<ObjectId>,
    next_index: u32,
    dropped: usize,
}

impl<'a> ImageWalk<'a> {
    fn visit(&mut self, resources: &'a Dictionary, depth: usize) {
        let doc = self.doc;
        let Some(xobjects) = xobject_dict(doc, resources) else {
            return;
        };

        for (name, reference) in xobjects.iter() {
            if let Object::Reference(id) = reference {
                if !self.seen.insert(*id) {
                    continue;
                }
            }
            let Ok((_, Object::Stream(stream))) = doc.dereference(reference) else {
                continue;
            };

            match subtype(stream) {
                Some(b"Image") => {
                    let locator = SourceLocator::Page {
                        page: self.page,
                        index: self.next_index,
                    };
                    self.next_index += 1;

                    match decode_image_stream(doc, stream).and_then(|decoded| decoded.into_raw(locator)) {
                        Ok(image) => self.images.push(image),
                        Err(reason) => {
                            debug!(
                                "Dropping image {} on page {}: {}",
                                String::from_utf8_lossy(name),
                                self.page,
                                reason
                            );
                            self.dropped += 1;
                        }
                    }
                }
                Some(b"Form") if depth < MAX_FORM_DEPTH => {
                    let nested = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|o| doc.dereference(o).ok())
                        .and_then(|(_, o)| o.as_dict().ok());
                    if let Some(nested) = nested {
                        self.visit(nested, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }
}

/// An image XObject after stream decoding.
pub(super) enum DecodedImage {
    /// Already in a standalone file format (JPEG).
    Encoded {
        bytes: Vec<u8>,
        extension: &'static str,
        width: u32,
        height: u32,
    },
    /// Raw samples converted to pixels.
    Pixels(DynamicImage),
}

impl DecodedImage {
    fn into_raw(self, locator: SourceLocator) -> std::result::Result<RawImage, String> {
        match self {
            DecodedImage::Encoded {
                bytes,
                extension,
                width,
                height,
            } => Ok(RawImage::new(locator, bytes, Some(extension.to_string()))
                .with_dimensions(width, height)),
            DecodedImage::Pixels(image) => {
                let (width, height) = (image.width(), image.height());
                let bytes = encode_png(&image)?;
                Ok(RawImage::new(locator, bytes, Some("png".to_string()))
                    .with_dimensions(width, height))
            }
        }
    }

    pub(super) fn into_dynamic(self) -> std::result::Result<DynamicImage, String> {
        match self {
            DecodedImage::Encoded { bytes, .. } => {
                image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).map_err(|e| e.to_string())
            }
            DecodedImage::Pixels(image) => Ok(image),
        }
    }
}

fn encode_png(image: &DynamicImage) -> std::result::Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(bytes)
}

fn filter_name(dict: &Dictionary) -> Option<&[u8]> {
    match dict.get(b"Filter").ok()? {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(filters) => filters.last().and_then(|o| o.as_name().ok()),
        _ => None,
    }
}

/// Decode an image XObject stream.
pub(super) fn decode_image_stream(doc: &Document, stream: &Stream) -> std::result::Result<DecodedImage, String> {
    let dict = &stream.dict;

    let dimension = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .filter(|v| *v > 0 && *v <= u32::MAX as i64)
            .map(|v| v as u32)
    };
    let width = dimension(b"Width").ok_or("missing or invalid Width")?;
    let height = dimension(b"Height").ok_or("missing or invalid Height")?;

    trace!("Found image object: {}x{}", width, height);

    match filter_name(dict) {
        Some(b"DCTDecode") => {
            let bytes = if dict.get(b"Filter").is_ok_and(|f| matches!(f, Object::Array(a) if a.len() > 1)) {
                stream.decompressed_content().map_err(|e| e.to_string())?
            } else {
                stream.content.clone()
            };
            return Ok(DecodedImage::Encoded {
                bytes,
                extension: "jpg",
                width,
                height,
            });
        }
        Some(b"JPXDecode") => return Err("JPEG 2000 images are not supported".to_string()),
        Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            return Err("fax/JBIG2 images are not supported".to_string());
        }
        _ => {}
    }

    let data = match stream.decompressed_content() {
        Ok(d) => d,
        Err(_) => stream.content.clone(),
    };

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return Err(format!("unsupported bits per component: {}", bits));
    }

    let components = color_components(doc, dict)?;
    create_image_from_raw(&data, width, height, components)
        .map(DecodedImage::Pixels)
        .ok_or_else(|| {
            format!(
                "sample data too short: {} bytes for {}x{}x{}",
                data.len(),
                width,
                height,
                components
            )
        })
}

/// Number of colour components for the image colour space.
fn color_components(doc: &Document, dict: &Dictionary) -> std::result::Result<u8, String> {
    let Ok(color_space) = dict.get(b"ColorSpace") else {
        return Ok(3);
    };
    let color_space = doc
        .dereference(color_space)
        .map_err(|e| e.to_string())?
        .1;

    let (family, params) = match color_space {
        Object::Name(name) => (name.as_slice(), None),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or("invalid colour space array")?;
            (family, items.get(1))
        }
        _ => return Err("invalid colour space".to_string()),
    };

    match family {
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(3),
        b"DeviceGray" | b"G" | b"CalGray" => Ok(1),
        b"DeviceCMYK" | b"CMYK" => Ok(4),
        b"ICCBased" => {
            let n = params
                .and_then(|p| doc.dereference(p).ok())
                .and_then(|(_, o)| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"N").ok())
                .and_then(|n| n.as_i64().ok())
                .unwrap_or(3);
            match n {
                1 | 3 | 4 => Ok(n as u8),
                other => Err(format!("unsupported ICC component count: {}", other)),
            }
        }
        other => Err(format!(
            "unsupported colour space: {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn create_image_from_raw(data: &[u8], width: u32, height: u32, components: u8) -> Option<DynamicImage> {
    let pixels = (width as usize).checked_mul(height as usize)?;
    let expected = pixels.checked_mul(components as usize)?;
    if data.len() < expected {
        return None;
    }
    let samples = &data[..expected];

    match components {
        1 => GrayImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples.to_vec()).map(DynamicImage::ImageRgb8),
        4 => {
            let mut rgb = Vec::with_capacity(pixels * 3);
            for cmyk in samples.chunks_exact(4) {
                let k = 255 - cmyk[3] as u32;
                for &c in &cmyk[..3] {
                    rgb.push(((255 - c as u32) * k / 255) as u8);
                }
            }
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    /// Test page: text lines, optional image XObjects drawn with a
    /// `[w 0 0 h x y] cm /Name Do` placement each.
    pub(crate) struct TestPage<'a> {
        pub lines: &'a [&'a str],
        pub images: Vec<(Stream, [i64; 4])>,
    }

    pub(crate) fn raw_rgb_image(width: i64, height: i64, rgb: [u8; 3]) -> Stream {
        let data: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            data,
        )
    }

    pub(crate) fn build_pdf(pages: Vec<TestPage<'_>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![20.into(), 200.into()]),
            ];
            for line in page.lines {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("ET", vec![]));

            let mut xobjects = Dictionary::new();
            for (i, (stream, [w, h, x, y])) in page.images.into_iter().enumerate() {
                let name = format!("Im{}", i);
                let id = doc.add_object(stream);
                xobjects.set(name.as_bytes().to_vec(), id);
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
                ));
                operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                operations.push(Operation::new("Q", vec![]));
            }

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let resources_id = doc.add_object(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            });
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut data = Vec::new();
        doc.save_to(&mut data).unwrap();
        data
    }

    #[test]
    fn test_pdf_reader_new() {
        let reader = PdfReader::new();
        assert_eq!(reader.media_mode, MediaMode::Embedded);
        assert_eq!(reader.format(), ContainerFormat::Page);
    }

    #[test]
    fn test_reads_text_in_page_order() {
        let data = build_pdf(vec![
            TestPage { lines: &["Project Title: Roof"], images: vec![] },
            TestPage { lines: &["Site Location: Depot"], images: vec![] },
        ]);
        let outcome = PdfReader::new().read(&data).unwrap();
        let text = outcome.document.joined_text();

        let title = text.find("Project Title: Roof").unwrap();
        let site = text.find("Site Location: Depot").unwrap();
        assert!(title < site);
        assert!(outcome.document.table_rows().is_empty());
    }

    #[test]
    fn test_embedded_images_and_undecodable_ones() {
        let mut jpx = raw_rgb_image(2, 2, [0, 0, 0]);
        jpx.dict.set("Filter", "JPXDecode");
        let mut short = raw_rgb_image(4, 4, [0, 0, 0]);
        short.set_content(vec![0; 5]);

        let data = build_pdf(vec![TestPage {
            lines: &["Images"],
            images: vec![
                (raw_rgb_image(3, 2, [255, 0, 0]), [30, 20, 10, 10]),
                (jpx, [10, 10, 50, 50]),
                (short, [10, 10, 80, 50]),
                (raw_rgb_image(2, 2, [0, 255, 0]), [10, 10, 100, 50]),
            ],
        }]);

        let outcome = PdfReader::new().read(&data).unwrap();
        let images = outcome.document.images();

        assert_eq!(outcome.dropped_images, 2);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].source_locator, SourceLocator::Page { page: 1, index: 0 });
        assert_eq!(images[0].dimensions(), Some((3, 2)));
        assert_eq!(images[1].source_locator, SourceLocator::Page { page: 1, index: 3 });
        assert_eq!(images[1].declared_extension.as_deref(), Some("png"));

        let decoded = image::load_from_memory(&images[1].bytes).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 255, 0]);
    }

    #[test]
    fn test_flattened_preview_one_image_per_page() {
        let data = build_pdf(vec![
            TestPage {
                lines: &["First"],
                images: vec![(raw_rgb_image(2, 2, [255, 0, 0]), [100, 50, 10, 20])],
            },
            TestPage { lines: &["Second"], images: vec![] },
        ]);

        let outcome = PdfReader::new()
            .with_media_mode(MediaMode::FlattenedPreview)
            .read(&data)
            .unwrap();
        let images = outcome.document.images();

        assert_eq!(images.len(), 2);
        assert_eq!(images[1].source_locator, SourceLocator::Page { page: 2, index: 0 });
        assert_eq!(images[0].dimensions(), Some((200, 100)));
    }

    #[test]
    fn test_max_pages() {
        let data = build_pdf(vec![
            TestPage { lines: &["One"], images: vec![] },
            TestPage { lines: &["Two"], images: vec![] },
        ]);
        let outcome = PdfReader::new().with_max_pages(1).read(&data).unwrap();
        let text = outcome.document.joined_text();
        assert!(text.contains("One"));
        assert!(!text.contains("Two"));
    }

    #[test]
    fn test_max_pages_bounds_whole_document_text() {
        let data = build_pdf(vec![
            TestPage { lines: &[], images: vec![(raw_rgb_image(2, 2, [0, 0, 0]), [20, 20, 10, 10])] },
            TestPage { lines: &["Site Location: Page Two"], images: vec![] },
        ]);
        let outcome = PdfReader::new().with_max_pages(1).read(&data).unwrap();

        assert!(!outcome.document.joined_text().contains("Page Two"));
        assert_eq!(outcome.document.images().len(), 1);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = PdfReader::new().read(b"PK\x03\x04 definitely a zip").unwrap_err();
        assert!(matches!(err, ReaderError::Malformed { format: "PDF", .. }));
    }

    #[test]
    fn test_cmyk_conversion() {
        let image = create_image_from_raw(&[0, 0, 0, 0, 255, 255, 255, 255], 2, 1, 4).unwrap();
        let rgb = image.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }
}
