//! Utility functions for image processing and coordinate transformations.

pub mod image_conversion;
pub mod safe_cast;

use crate::types::{BoundingBox, LandmarkSet};
use nalgebra::Point2;
use safe_cast::f32_to_i32_clamp;

/// Map landmarks normalized to a face crop back into full-image pixels.
///
/// Both axes are scaled by the crop *width*: detector boxes are squared
/// before cropping, and a non-square box stretches `y` accordingly.
#[must_use]
pub fn remap_landmarks(landmarks: &LandmarkSet, bbox: &BoundingBox) -> LandmarkSet {
    let scale = f64::from(bbox.width());
    let (x1, y1) = (f64::from(bbox.x1), f64::from(bbox.y1));
    landmarks.map(|p| Point2::new(p.x * scale + x1, p.y * scale + y1))
}

/// Expand a detector box by `shift` of its size, make it square and keep it
/// inside a `max_width` × `max_height` image.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Precision loss acceptable for box dimensions
pub fn refine_box(bbox: &BoundingBox, max_width: i32, max_height: i32, shift: f32) -> BoundingBox {
    let x_shift = f32_to_i32_clamp(bbox.width() as f32 * shift, 0, max_width);
    let y_shift = f32_to_i32_clamp(bbox.height() as f32 * shift, 0, max_height);

    // Expand the bounding box
    let mut x = (bbox.x1 - x_shift).max(0);
    let mut y = (bbox.y1 - y_shift).max(0);
    let width = (bbox.width() + 2 * x_shift).min(max_width - x);
    let height = (bbox.height() + 2 * y_shift).min(max_height - y);

    // Make it square, bounded by the shorter image side
    let side = width.max(height).min(max_width).min(max_height).max(1);

    if x + side > max_width {
        x = max_width - side;
    }
    if y + side > max_height {
        y = max_height - side;
    }

    BoundingBox {
        x1: x.max(0),
        y1: y.max(0),
        x2: x.max(0) + side,
        y2: y.max(0) + side,
    }
}
