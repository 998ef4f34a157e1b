//! Screening, rescaling and naming of extracted images.

mod filter;

pub use filter::{is_normalizable, MediaFilter};

use serde::Serialize;

use crate::models::document::{RawImage, SourceLocator};

/// An image that passed every enabled rule, ready to be written out.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedImage {
    pub source_locator: SourceLocator,
    /// Encoded payload; the original bytes unless the image was rescaled.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Extension matching the encoding of `bytes`.
    pub extension: String,
    /// Suggested file name, unique within one filter call.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub rescaled: bool,
}

impl From<PreparedImage> for RawImage {
    fn from(image: PreparedImage) -> Self {
        RawImage::new(image.source_locator, image.bytes, Some(image.extension))
            .with_dimensions(image.width, image.height)
    }
}

/// What happened to each image handed to the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub decode_failures: usize,
    pub undersized: usize,
    pub unsupported_color: usize,
    pub rescaled: usize,
    pub kept: usize,
}

impl FilterReport {
    /// Images that did not make it into the output.
    pub fn rejected(&self) -> usize {
        self.decode_failures + self.undersized + self.unsupported_color
    }
}
