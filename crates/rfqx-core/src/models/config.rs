//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::default_field_defs;
use crate::models::field::{FieldDef, FieldSpecSet};

/// Main configuration for the rfqx pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RfqxConfig {
    /// Container reader configuration.
    pub reader: ReaderConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Image filtering configuration.
    pub media: MediaConfig,
}

/// How the page-oriented reader obtains images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    /// Walk the image objects referenced by each page.
    #[default]
    Embedded,
    /// Rasterize every page into a single image.
    FlattenedPreview,
}

/// Container reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Image strategy for page-oriented documents.
    pub media_mode: MediaMode,

    /// Resolution of flattened page previews.
    pub preview_dpi: u32,

    /// Maximum pages to read (0 = unlimited).
    pub max_pages: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            media_mode: MediaMode::Embedded,
            preview_dpi: 72,
            max_pages: 0,
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters captured by the proximity tier, label included.
    pub proximity_window: usize,

    /// Remove the matched label from proximity results.
    pub strip_label: bool,

    /// Field definitions, in output order.
    pub fields: Vec<FieldDef>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            proximity_window: 300,
            strip_label: false,
            fields: default_field_defs(),
        }
    }
}

/// Image filtering configuration. `None` disables a threshold rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Drop images narrower or shorter than this many pixels.
    pub min_dimension: Option<u32>,

    /// Drop images that cannot be normalized to RGB.
    pub require_rgb: bool,

    /// Downscale images wider than this many pixels.
    pub max_width: Option<u32>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            min_dimension: None,
            require_rgb: true,
            max_width: Some(1600),
        }
    }
}

impl RfqxConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check numeric settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extraction.proximity_window == 0 {
            return Err(invalid("extraction.proximity_window", "must be greater than zero"));
        }
        if !(1..=1200).contains(&self.reader.preview_dpi) {
            return Err(invalid("reader.preview_dpi", "must be between 1 and 1200"));
        }
        if self.media.max_width == Some(0) {
            return Err(invalid("media.max_width", "must be greater than zero"));
        }
        Ok(())
    }

    /// Validate settings and compile the field definitions.
    pub fn field_specs(&self) -> Result<FieldSpecSet, ConfigError> {
        self.validate()?;
        FieldSpecSet::compile(&self.extraction.fields)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_compiles() {
        let config = RfqxConfig::default();
        let specs = config.field_specs().unwrap();
        assert_eq!(specs.len(), config.extraction.fields.len());
        assert_eq!(config.extraction.proximity_window, 300);
        assert_eq!(config.reader.media_mode, MediaMode::Embedded);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RfqxConfig::from_json(
            r#"{"reader":{"media_mode":"flattened_preview"},"media":{"min_dimension":64}}"#,
        )
        .unwrap();
        assert_eq!(config.reader.media_mode, MediaMode::FlattenedPreview);
        assert_eq!(config.reader.preview_dpi, 72);
        assert_eq!(config.media.min_dimension, Some(64));
        assert_eq!(config.media.max_width, Some(1600));
        assert!(!config.extraction.fields.is_empty());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = RfqxConfig::default();
        config.extraction.proximity_window = 0;
        assert!(matches!(
            config.field_specs(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "extraction.proximity_window"
        ));
    }

    #[test]
    fn test_bad_pattern_in_file_fails_at_load() {
        let config = RfqxConfig::from_json(
            r#"{"extraction":{"fields":[{"name":"X","candidate_keys":["x"],"pattern":"[x"}]}}"#,
        )
        .unwrap();
        assert!(matches!(config.field_specs(), Err(ConfigError::InvalidPattern { .. })));
    }
}
