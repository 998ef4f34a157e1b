use std::collections::HashSet;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use tracing::{debug, trace};

use super::{FilterReport, PreparedImage};
use crate::models::config::MediaConfig;
use crate::models::document::RawImage;

/// Why an image was left out.
#[derive(Debug)]
enum Rejection {
    Decode(String),
    Undersized { width: u32, height: u32 },
    UnsupportedColor(ColorType),
}

/// Rule set applied to every extracted image.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    /// Minimum width and height in pixels.
    min_dimension: Option<u32>,
    /// Only keep images that normalize to 3-channel colour.
    require_rgb: bool,
    /// Maximum width before downscaling.
    max_width: Option<u32>,
}

impl MediaFilter {
    /// A filter with every rule disabled.
    pub fn new() -> Self {
        Self {
            min_dimension: None,
            require_rgb: false,
            max_width: None,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            min_dimension: config.min_dimension,
            require_rgb: config.require_rgb,
            max_width: config.max_width,
        }
    }

    pub fn with_min_dimension(mut self, min: Option<u32>) -> Self {
        self.min_dimension = min;
        self
    }

    pub fn with_color_rule(mut self, enabled: bool) -> Self {
        self.require_rgb = enabled;
        self
    }

    pub fn with_max_width(mut self, max: Option<u32>) -> Self {
        self.max_width = max.filter(|w| *w > 0);
        self
    }

    /// Apply the rules to every image, preserving input order.
    ///
    /// Images that fail to decode are counted and skipped.
    pub fn filter(&self, images: &[RawImage]) -> (Vec<PreparedImage>, FilterReport) {
        let mut prepared = Vec::with_capacity(images.len());
        let mut report = FilterReport::default();
        let mut taken = HashSet::new();

        for image in images {
            match self.prepare(image) {
                Ok(mut output) => {
                    claim_file_name(&mut taken, &mut output);
                    if output.rescaled {
                        report.rescaled += 1;
                    }
                    report.kept += 1;
                    prepared.push(output);
                }
                Err(rejection) => {
                    debug!("Skipping {}: {:?}", image.source_locator, rejection);
                    match rejection {
                        Rejection::Decode(_) => report.decode_failures += 1,
                        Rejection::Undersized { .. } => report.undersized += 1,
                        Rejection::UnsupportedColor(_) => report.unsupported_color += 1,
                    }
                }
            }
        }

        debug!(
            "Media filter kept {} of {} images ({} rescaled)",
            report.kept,
            images.len(),
            report.rescaled
        );
        (prepared, report)
    }

    fn prepare(&self, raw: &RawImage) -> Result<PreparedImage, Rejection> {
        let reader = ImageReader::new(Cursor::new(&raw.bytes))
            .with_guessed_format()
            .map_err(|e| Rejection::Decode(e.to_string()))?;
        let format = reader.format();
        let image = reader.decode().map_err(|e| Rejection::Decode(e.to_string()))?;
        let (width, height) = (image.width(), image.height());

        if let Some(min) = self.min_dimension {
            if width < min || height < min {
                return Err(Rejection::Undersized { width, height });
            }
        }

        if self.require_rgb && !is_normalizable(image.color()) {
            return Err(Rejection::UnsupportedColor(image.color()));
        }

        let stem = raw.source_locator.file_stem();

        if let Some(cap) = self.max_width.filter(|cap| width > *cap) {
            let new_height = scaled_height(width, height, cap);
            trace!("Rescaling {} from {}x{} to {}x{}", raw.source_locator, width, height, cap, new_height);

            let resized = image.resize_exact(cap, new_height, FilterType::Lanczos3);
            let target = match format {
                Some(ImageFormat::Jpeg) => ImageFormat::Jpeg,
                _ => ImageFormat::Png,
            };
            let bytes = encode(&resized, target).map_err(Rejection::Decode)?;
            let extension = extension_for(target).to_string();

            return Ok(PreparedImage {
                source_locator: raw.source_locator.clone(),
                bytes,
                file_name: format!("{}.{}", stem, extension),
                extension,
                width: cap,
                height: new_height,
                rescaled: true,
            });
        }

        let extension = format
            .map(|f| extension_for(f).to_string())
            .or_else(|| raw.declared_extension.clone())
            .unwrap_or_else(|| "bin".to_string());

        Ok(PreparedImage {
            source_locator: raw.source_locator.clone(),
            bytes: raw.bytes.clone(),
            file_name: format!("{}.{}", stem, extension),
            extension,
            width,
            height,
            rescaled: false,
        })
    }
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::from_config(&MediaConfig::default())
    }
}

/// Whether a pixel layout converts losslessly enough to 8-bit RGB.
pub fn is_normalizable(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8
            | ColorType::La8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16
    )
}

/// Height after scaling `width` down to `cap`, rounded half away from zero.
/// Give the image a file name no earlier image in the batch holds.
///
/// Distinct locators can sanitize to the same stem (`a.b.png` and `a_b.png`),
/// so later images get a `-2`, `-3`, ... suffix.
fn claim_file_name(taken: &mut HashSet<String>, image: &mut PreparedImage) {
    if taken.insert(image.file_name.clone()) {
        return;
    }

    let stem = image.source_locator.file_stem();
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}.{}", stem, n, image.extension);
        if taken.insert(candidate.clone()) {
            trace!("Renamed {} to {}", image.source_locator, candidate);
            image.file_name = candidate;
            return;
        }
        n += 1;
    }
}

fn scaled_height(width: u32, height: u32, cap: u32) -> u32 {
    let scaled = (height as f64 * cap as f64 / width as f64).round() as u32;
    scaled.max(1)
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extensions_str().first().copied().unwrap_or("img"),
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let image = match format {
        ImageFormat::Jpeg if !matches!(image.color(), ColorType::L8 | ColorType::Rgb8) => {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
        _ => image.clone(),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|e| e.to_string())?;
    Ok(bytes)
}
