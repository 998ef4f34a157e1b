//! Merging reader output into a [`NormalizedDocument`] and the text
//! cleaning applied between raw text and match probes.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::document::{NormalizedDocument, RawImage, TableRow};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Primitive sequences decoded from one page or one document body.
///
/// Readers emit segments; they carry no field knowledge.
#[derive(Debug, Clone, Default)]
pub struct DocumentSegment {
    /// Text blocks in reading order. Blocks may span several lines.
    pub texts: Vec<String>,
    /// Key/value rows from native tables.
    pub table_rows: Vec<TableRow>,
    /// Embedded images.
    pub images: Vec<RawImage>,
}

/// Concatenate segments into one document, preserving order.
///
/// Lines are neither sorted nor deduplicated: repeated headers across pages
/// stay in place so the first occurrence is found deterministically.
pub fn normalize(segments: Vec<DocumentSegment>) -> NormalizedDocument {
    let mut lines = Vec::new();
    let mut table_rows = Vec::new();
    let mut images = Vec::new();

    for segment in segments {
        for text in segment.texts {
            lines.extend(text.lines().map(str::to_string));
        }
        table_rows.extend(segment.table_rows);
        images.extend(segment.images);
    }

    debug!(
        "Normalized document: {} lines, {} table rows, {} images",
        lines.len(),
        table_rows.len(),
        images.len()
    );

    NormalizedDocument::new(lines, table_rows, images)
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Lowercased, whitespace-collapsed form used for keys and probes.
pub fn normalize_key(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Collapsed document text paired with its lowercased probe form.
///
/// Lowercasing can change the length of some characters, so offsets found in
/// the probe form are mapped back to the raw form through `origin`.
#[derive(Debug, Clone)]
pub struct ProbeText {
    raw: Vec<char>,
    lowered: String,
    origin: Vec<usize>,
}

impl ProbeText {
    pub fn new(document: &NormalizedDocument) -> Self {
        Self::from_text(&document.joined_text())
    }

    pub fn from_text(text: &str) -> Self {
        let raw: Vec<char> = collapse_whitespace(text).chars().collect();
        let mut lowered = String::with_capacity(raw.len());
        let mut origin = Vec::with_capacity(raw.len());

        for (index, c) in raw.iter().enumerate() {
            for lower in c.to_lowercase() {
                lowered.push(lower);
                origin.push(index);
            }
        }

        Self {
            raw,
            lowered,
            origin,
        }
    }

    /// Lowercased, collapsed text.
    pub fn lowered(&self) -> &str {
        &self.lowered
    }

    /// Collapsed text in its original case.
    pub fn raw(&self) -> String {
        self.raw.iter().collect()
    }

    /// Raw character offset of the first occurrence of a lowercase needle.
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.find_span(needle).map(|(start, _)| start)
    }

    /// Raw character range `[start, end)` of the first occurrence.
    pub fn find_span(&self, needle: &str) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let byte = self.lowered.find(needle)?;
        self.raw_range(byte..byte + needle.len())
    }

    /// Raw text covered by a byte range of the lowered form, in its original
    /// case. Empty ranges yield `None`.
    pub fn original(&self, lowered: Range<usize>) -> Option<String> {
        let (start, end) = self.raw_range(lowered)?;
        Some(self.raw[start..end].iter().collect())
    }

    fn raw_range(&self, lowered: Range<usize>) -> Option<(usize, usize)> {
        if lowered.is_empty() {
            return None;
        }
        let first = self.lowered.get(..lowered.start)?.chars().count();
        let last = first + self.lowered.get(lowered)?.chars().count() - 1;
        let start = *self.origin.get(first)?;
        let end = *self.origin.get(last)? + 1;
        Some((start, end))
    }

    /// Up to `len` raw characters starting at `start`, right-trimmed.
    pub fn window(&self, start: usize, len: usize) -> String {
        let window: String = self.raw.iter().skip(start).take(len).collect();
        window.trim_end().to_string()
    }
}
