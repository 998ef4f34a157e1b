//! Core library for RFQ document extraction.
//!
//! This crate provides:
//! - Container readers for PDF (page-oriented) and DOCX (flow-oriented) documents
//! - A normalized text/table/image document model
//! - Tiered field extraction (table, pattern, keyword proximity)
//! - Media filtering (minimum size, colour space, rescaling)

pub mod error;
pub mod extract;
pub mod media;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reader;

pub use error::{ConfigError, ReaderError, Result, RfqxError};
pub use extract::{FieldExtractor, TieredExtractor};
pub use media::{FilterReport, MediaFilter, PreparedImage};
pub use models::config::{MediaMode, RfqxConfig};
pub use models::document::{NormalizedDocument, RawImage, SourceLocator, TableRow};
pub use models::field::{
    FieldDef, FieldKind, FieldResult, FieldResults, FieldSpec, FieldSpecSet, FieldValue, MatchSource,
};
pub use pipeline::{DocumentExtraction, ExtractionReport, Pipeline};
pub use reader::{reader_for, ContainerFormat, DocumentReader, DocxReader, PdfReader, ReadOutcome};
