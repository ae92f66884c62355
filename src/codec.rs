//! Image codec boundary translating request bytes to rasters and back.
//!
//! Pure functions: the HTTP layer hands in raw upload bytes and receives
//! encoded result bytes; nothing here holds state across requests.

use std::io::Cursor;

use image::{imageops, ImageFormat, RgbImage};

use crate::config::Limits;
use crate::{InpaintError, Raster};

/// Decodes upload bytes into an RGB raster.
///
/// Enforces the payload cap and the PNG/JPEG/WebP allowlist, converts to
/// RGB, and downscales with Lanczos when the longest edge exceeds the
/// configured dimension cap.
pub fn decode_rgb(bytes: &[u8], limits: &Limits) -> Result<Raster, InpaintError> {
    if bytes.len() > limits.max_payload_bytes {
        return Err(InpaintError::Validation(format!(
            "payload of {} bytes exceeds cap of {}",
            bytes.len(),
            limits.max_payload_bytes
        )));
    }

    let format = image::guess_format(bytes)
        .map_err(|err| InpaintError::InvalidImage(format!("unrecognized image data: {err}")))?;
    if !matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    ) {
        return Err(InpaintError::InvalidImage(format!(
            "unsupported image format {format:?}"
        )));
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| InpaintError::InvalidImage(format!("decode failed: {err}")))?;
    let rgb = downscale_if_needed(decoded.to_rgb8(), limits.max_image_dimension);
    raster_from_rgb(rgb)
}

/// Encodes a raster as PNG bytes.
pub fn encode_png(raster: &Raster) -> Result<Vec<u8>, InpaintError> {
    let image = rgb_from_raster(raster)?;
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| InpaintError::InvalidImage(format!("encode failed: {err}")))?;
    Ok(cursor.into_inner())
}

fn downscale_if_needed(image: RgbImage, cap: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= cap {
        return image;
    }
    let scale = cap as f32 / longest as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    let new_height = ((height as f32 * scale) as u32).max(1);
    imageops::resize(&image, new_width, new_height, imageops::FilterType::Lanczos3)
}

pub(crate) fn raster_from_rgb(image: RgbImage) -> Result<Raster, InpaintError> {
    let (width, height) = image.dimensions();
    Raster::from_vec(width, height, image.into_raw())
}

pub(crate) fn rgb_from_raster(raster: &Raster) -> Result<RgbImage, InpaintError> {
    RgbImage::from_raw(raster.width(), raster.height(), raster.data().to_vec()).ok_or_else(|| {
        InpaintError::InvalidImage("raster buffer does not match its dimensions".to_string())
    })
}
