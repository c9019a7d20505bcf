//! Decoding of base64 image payloads into RGB rasters.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

/// Standard alphabet; trailing `=` padding may be present or not.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Strip a `data:<mime>;base64,` prefix if the payload carries one.
pub fn strip_data_uri(payload: &str) -> &str {
    let trimmed = payload.trim();
    match trimmed.split_once(',') {
        Some((header, body)) if header.starts_with("data:") && header.ends_with(";base64") => body,
        _ => trimmed,
    }
}

/// Decode a base64 payload (raw or data URI) into raw image file bytes.
///
/// Embedded whitespace such as MIME line breaks is ignored.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let body: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(LENIENT_STANDARD.decode(body)?)
}

/// Decode a base64 payload into an 8-bit RGB image. The format is sniffed
/// from the bytes.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage, DecodeError> {
    let bytes = decode_base64(payload)?;
    let image = image::load_from_memory(&bytes)?;
    tracing::debug!(
        bytes = bytes.len(),
        width = image.width(),
        height = image.height(),
        "decoded image payload"
    );
    Ok(image.to_rgb8())
}
