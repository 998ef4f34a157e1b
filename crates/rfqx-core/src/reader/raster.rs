//! Flattened page previews.
//!
//! Composites the image XObjects a page draws onto a white canvas the
//! size of its MediaBox. Glyphs are not painted; text is delivered
//! separately by the reader.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::{Document, Object, ObjectId};
use tracing::trace;

use super::pdf::{decode_image_stream, inherited_attribute, subtype, xobject_dict};

/// US Letter, used when a page declares no MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];
/// Largest canvas side in pixels.
const MAX_CANVAS_SIDE: u32 = 10_000;

/// PDF affine transform `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let mut values = [0.0f32; 6];
        for (slot, operand) in values.iter_mut().zip(operands) {
            *slot = number(operand)?;
        }
        let [a, b, c, d, e, f] = values;
        Some(Matrix { a, b, c, d, e, f })
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Page MediaBox as `[min_x, min_y, max_x, max_y]`.
fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let values: Option<Vec<f32>> = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .map(|items| items.iter().filter_map(number).collect());

    match values.as_deref() {
        Some([x0, y0, x1, y1]) => [x0.min(*x1), y0.min(*y1), x0.max(*x1), y0.max(*y1)],
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Render one page's images at `dpi`.
pub(super) fn render_page(doc: &Document, page_id: ObjectId, dpi: u32) -> Result<RgbImage, String> {
    let bounds = media_box(doc, page_id);
    let scale = dpi as f32 / 72.0;

    let width = ((bounds[2] - bounds[0]) * scale).round() as u32;
    let height = ((bounds[3] - bounds[1]) * scale).round() as u32;
    if width == 0 || height == 0 || width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
        return Err(format!("unusable page size {}x{} at {} dpi", width, height, dpi));
    }

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    let content = doc
        .get_and_decode_page_content(page_id)
        .map_err(|e| format!("failed to decode page content: {}", e))?;

    let xobjects = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .and_then(|resources| xobject_dict(doc, resources));

    let mut ctm = Matrix::IDENTITY;
    let mut saved = Vec::new();

    for operation in &content.operations {
        match operation.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => {
                if let Some(previous) = saved.pop() {
                    ctm = previous;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(&operation.operands) {
                    ctm = matrix.then(&ctm);
                }
            }
            "Do" => {
                let Some(xobjects) = xobjects else { continue };
                let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let stream = xobjects
                    .get(name)
                    .ok()
                    .and_then(|o| doc.dereference(o).ok())
                    .and_then(|(_, o)| o.as_stream().ok());
                let Some(stream) = stream.filter(|s| subtype(s) == Some(b"Image".as_slice())) else {
                    continue;
                };

                match decode_image_stream(doc, stream).and_then(|decoded| decoded.into_dynamic()) {
                    Ok(image) => draw(&mut canvas, &image, &ctm, &bounds, scale),
                    Err(reason) => trace!(
                        "Skipping image {} in preview: {}",
                        String::from_utf8_lossy(name),
                        reason
                    ),
                }
            }
            _ => {}
        }
    }

    Ok(canvas)
}

/// Place an image on the canvas at the bounding box of the CTM-mapped
/// unit square.
fn draw(canvas: &mut RgbImage, image: &DynamicImage, ctm: &Matrix, bounds: &[f32; 4], scale: f32) {
    let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(x, y)| ctm.apply(x, y));
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

    let width = ((max_x - min_x) * scale).round();
    let height = ((max_y - min_y) * scale).round();
    if !(width >= 1.0 && height >= 1.0) || width > MAX_CANVAS_SIDE as f32 || height > MAX_CANVAS_SIDE as f32 {
        return;
    }

    // Device space has y pointing down.
    let left = ((min_x - bounds[0]) * scale).round() as i64;
    let top = ((bounds[3] - max_y) * scale).round() as i64;

    let mut placed = image.resize_exact(width as u32, height as u32, FilterType::Triangle);
    if ctm.a < 0.0 {
        placed = placed.fliph();
    }
    if ctm.d < 0.0 {
        placed = placed.flipv();
    }

    imageops::overlay(canvas, &placed.to_rgb8(), left, top);
}
