//! Base64 / data-URL image decoding and JPEG encoding.

use crate::{types::Image, Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;

/// Decode a base64 image payload into an RGB raster.
///
/// A data-URL header (`data:image/jpeg;base64,`) is stripped up to the first
/// comma. The image format is sniffed from the decoded bytes.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the payload is empty, is not valid base64, or
/// does not hold a supported image
pub fn decode(payload: &str) -> Result<Image> {
    let encoded = payload.split_once(',').map_or(payload, |(_, data)| data);
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(Error::Decode("Empty image payload".to_string()));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::Decode(format!("Invalid base64: {e}")))?;

    let decoded =
        image::load_from_memory(&bytes).map_err(|e| Error::Decode(format!("Invalid image data: {e}")))?;

    log::debug!("Decoded {}x{} image ({} bytes)", decoded.width(), decoded.height(), bytes.len());
    Ok(decoded.to_rgb8())
}

/// Encode an RGB raster as JPEG
///
/// # Errors
///
/// Returns an error if the encoder rejects the image
pub fn encode_jpeg(image: &Image, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
    Ok(buffer)
}
