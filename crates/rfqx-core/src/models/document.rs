//! Canonical document representation shared by both container families.

use std::fmt;
use std::io::Cursor;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Where an embedded image came from inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceLocator {
    /// Image on a page (1-indexed page, 0-indexed position on that page).
    Page { page: u32, index: u32 },
    /// Part path inside an archive container, e.g. `word/media/image1.png`.
    Container { path: String },
}

impl SourceLocator {
    /// Deterministic file stem derived from the locator.
    pub fn file_stem(&self) -> String {
        match self {
            SourceLocator::Page { page, index } => format!("page{:03}_img{:02}", page, index),
            SourceLocator::Container { path } => {
                let trimmed = path.strip_prefix("word/").unwrap_or(path);
                let without_ext = match trimmed.rfind('.') {
                    Some(dot) if dot > trimmed.rfind('/').map_or(0, |s| s + 1) => &trimmed[..dot],
                    _ => trimmed,
                };
                without_ext
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                    .collect()
            }
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Page { page, index } => write!(f, "page {} image {}", page, index),
            SourceLocator::Container { path } => write!(f, "{}", path),
        }
    }
}

/// An embedded image as found in the container, not yet decoded.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Origin of the image.
    pub source_locator: SourceLocator,
    /// Opaque encoded payload.
    pub bytes: Vec<u8>,
    /// Extension claimed by the container; may be missing or wrong.
    pub declared_extension: Option<String>,
    dimensions: OnceLock<Option<(u32, u32)>>,
}

impl RawImage {
    pub fn new(
        source_locator: SourceLocator,
        bytes: Vec<u8>,
        declared_extension: Option<String>,
    ) -> Self {
        Self {
            source_locator,
            bytes,
            declared_extension: declared_extension.map(|e| e.to_ascii_lowercase()),
            dimensions: OnceLock::new(),
        }
    }

    /// Record dimensions already known to the reader.
    pub fn with_dimensions(self, width: u32, height: u32) -> Self {
        let dimensions = OnceLock::new();
        let _ = dimensions.set(Some((width, height)));
        Self { dimensions, ..self }
    }

    /// Pixel dimensions, read from the image header on first access.
    ///
    /// Returns `None` when the payload is not a decodable image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        *self
            .dimensions
            .get_or_init(|| probe_dimensions(&self.bytes))
    }

    pub fn pixel_width(&self) -> Option<u32> {
        self.dimensions().map(|(w, _)| w)
    }

    pub fn pixel_height(&self) -> Option<u32> {
        self.dimensions().map(|(_, h)| h)
    }
}

fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// A key/value row taken from a native document table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// First populated cell, lowercased and whitespace-collapsed.
    pub key: String,
    /// Second populated cell, as written in the document.
    pub value: String,
}

impl TableRow {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Canonical text/table/image view of one document.
///
/// Built once per invocation and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct NormalizedDocument {
    flattened_text: Vec<String>,
    table_rows: Vec<TableRow>,
    images: Vec<RawImage>,
}

impl NormalizedDocument {
    pub fn new(flattened_text: Vec<String>, table_rows: Vec<TableRow>, images: Vec<RawImage>) -> Self {
        Self {
            flattened_text,
            table_rows,
            images,
        }
    }

    /// Text lines in document order.
    pub fn lines(&self) -> &[String] {
        &self.flattened_text
    }

    /// Table rows in document order, duplicates included.
    pub fn table_rows(&self) -> &[TableRow] {
        &self.table_rows
    }

    /// Embedded images in document order.
    pub fn images(&self) -> &[RawImage] {
        &self.images
    }

    /// All lines joined with newlines, uncollapsed.
    pub fn joined_text(&self) -> String {
        self.flattened_text.join("\n")
    }
}
