//! Image conversion utilities for RGB rasters and ndarray model tensors.

use crate::types::Image;
use ndarray::{Array3, Array4, Axis};

/// Convert an RGB image to an `(height, width, 3)` array of `(pixel - offset) / scale`
#[must_use]
pub fn rgb_to_array3_f32(image: &Image, offset: f32, scale: f32) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(row, col, ch)| {
        #[allow(clippy::cast_possible_truncation)] // indices come from u32 dimensions
        let pixel = image.get_pixel(col as u32, row as u32);
        (f32::from(pixel[ch]) - offset) / scale
    })
}

/// Scale pixel values to `[0, 1]`, keeping HWC layout
#[must_use]
pub fn normalize_unit(image: &Image) -> Array3<f32> {
    rgb_to_array3_f32(image, 0.0, 255.0)
}

/// Add a leading batch axis: `(H, W, C)` to `(1, H, W, C)`
#[must_use]
pub fn to_nhwc_batch(array: Array3<f32>) -> Array4<f32> {
    array.insert_axis(Axis(0))
}

/// Add a batch axis and move channels first: `(H, W, C)` to `(1, C, H, W)`
#[must_use]
pub fn to_nchw_batch(array: Array3<f32>) -> Array4<f32> {
    to_nhwc_batch(array).permuted_axes([0, 3, 1, 2])
}
