//! One-call processing: read, extract fields, filter media.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::extract::{FieldExtractor, TieredExtractor};
use crate::media::{FilterReport, MediaFilter, PreparedImage};
use crate::models::config::{ReaderConfig, RfqxConfig};
use crate::models::field::{FieldResults, FieldSpecSet};
use crate::reader::{reader_for, ContainerFormat};

/// Counters describing one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// Images the reader found but could not decode.
    pub dropped_images: usize,
    /// Outcome of the media rules.
    pub media: FilterReport,
    pub processing_time_ms: u64,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtraction {
    pub format: &'static str,
    pub fields: FieldResults,
    pub images: Vec<PreparedImage>,
    /// Flattened text lines joined with newlines.
    #[serde(skip)]
    pub text: String,
    pub report: ExtractionReport,
}

/// Configured reader, extractor and media filter.
///
/// Field specs are compiled once in [`Pipeline::new`] and shared by every
/// call to [`Pipeline::process`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    reader: ReaderConfig,
    specs: FieldSpecSet,
    extractor: TieredExtractor,
    media: MediaFilter,
}

impl Pipeline {
    /// Validate the configuration and compile its field specs.
    pub fn new(config: RfqxConfig) -> Result<Self> {
        let specs = config.field_specs()?;
        debug!("Compiled {} field specs", specs.len());

        Ok(Self {
            extractor: TieredExtractor::from_config(&config.extraction),
            media: MediaFilter::from_config(&config.media),
            reader: config.reader,
            specs,
        })
    }

    pub fn specs(&self) -> &FieldSpecSet {
        &self.specs
    }

    /// Process one document of a declared format.
    ///
    /// Fails only when the container cannot be opened; missing fields and
    /// undecodable images are reported in the result.
    pub fn process(&self, data: &[u8], format: ContainerFormat) -> Result<DocumentExtraction> {
        let start = Instant::now();

        let outcome = reader_for(format, &self.reader).read(data)?;
        let document = outcome.document;
        debug!(
            "{} document: {} lines, {} table rows, {} images",
            format.name(),
            document.lines().len(),
            document.table_rows().len(),
            document.images().len()
        );

        let fields = self.extractor.extract(&document, &self.specs);
        let (images, media) = self.media.filter(document.images());

        let report = ExtractionReport {
            dropped_images: outcome.dropped_images,
            media,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Extracted {}/{} fields and {} images in {}ms",
            fields.found_count(),
            fields.len(),
            images.len(),
            report.processing_time_ms
        );

        Ok(DocumentExtraction {
            format: format.name(),
            fields,
            images,
            text: document.joined_text(),
            report,
        })
    }
}
