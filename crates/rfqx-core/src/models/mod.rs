//! Data models: configuration, the normalized document and field results.

pub mod config;
pub mod document;
pub mod field;
