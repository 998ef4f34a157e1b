//! Error types for the rfqx-core library.

use thiserror::Error;

/// Main error type for the rfqx library.
#[derive(Error, Debug)]
pub enum RfqxError {
    /// The document container could not be read.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Field specification or configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening a document container.
///
/// Every variant is terminal for the invocation: no partial document is
/// returned. Problems with individual embedded images never surface here.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The bytes cannot be opened as the declared container format.
    #[error("malformed {format} container: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    /// A part every container of this format must have is missing.
    #[error("missing container part: {0}")]
    MissingPart(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The declared media type is not one of the supported containers.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl ReaderError {
    pub(crate) fn malformed(format: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            format,
            reason: reason.to_string(),
        }
    }
}

/// Errors found while loading field specifications and settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field pattern does not compile.
    #[error("invalid pattern for field {field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    /// Two field definitions share a name.
    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    /// A field definition has an empty name.
    #[error("field name must not be empty")]
    EmptyFieldName,

    /// A field has neither candidate keys nor a pattern.
    #[error("field {0} has no candidate keys and no pattern")]
    NoProbes(String),

    /// A numeric setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Result type for the rfqx library.
pub type Result<T> = std::result::Result<T, RfqxError>;
