//! Container readers: raw bytes to [`NormalizedDocument`].
//!
//! The caller picks the reader from the document's declared media type;
//! content is never sniffed to choose a format.

mod docx;
mod pdf;
mod raster;

pub use docx::DocxReader;
pub use pdf::PdfReader;

pub use crate::models::config::MediaMode;

use crate::error::ReaderError;
use crate::models::config::ReaderConfig;
use crate::models::document::NormalizedDocument;

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Supported document container families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// Page-oriented (PDF).
    Page,
    /// Flow-oriented (DOCX).
    Flow,
}

impl ContainerFormat {
    /// Resolve a declared media type, ignoring parameters such as charset.
    pub fn from_media_type(media_type: &str) -> Result<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            PDF_MEDIA_TYPE => Ok(Self::Page),
            DOCX_MEDIA_TYPE => Ok(Self::Flow),
            _ => Err(ReaderError::UnsupportedMediaType(media_type.to_string())),
        }
    }

    /// Resolve a file extension as a declared type.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Page),
            "docx" => Ok(Self::Flow),
            other => Err(ReaderError::UnsupportedMediaType(other.to_string())),
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Page => PDF_MEDIA_TYPE,
            Self::Flow => DOCX_MEDIA_TYPE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Page => "PDF",
            Self::Flow => "DOCX",
        }
    }
}

/// A read document plus the number of embedded images that had to be
/// dropped because they could not be decoded.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub document: NormalizedDocument,
    pub dropped_images: usize,
}

/// Trait for container reader implementations.
pub trait DocumentReader {
    /// Container family this reader handles.
    fn format(&self) -> ContainerFormat;

    /// Decode a whole document.
    ///
    /// Fails only when the container itself cannot be opened.
    fn read(&self, data: &[u8]) -> Result<ReadOutcome>;
}

/// Build the reader for a declared format.
pub fn reader_for(format: ContainerFormat, config: &ReaderConfig) -> Box<dyn DocumentReader + Send + Sync> {
    match format {
        ContainerFormat::Page => Box::new(
            PdfReader::new()
                .with_media_mode(config.media_mode)
                .with_preview_dpi(config.preview_dpi)
                .with_max_pages(config.max_pages),
        ),
        ContainerFormat::Flow => Box::new(DocxReader::new()),
    }
}
