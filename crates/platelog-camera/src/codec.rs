//! Raster encoding helpers shared by capture and crop rendering.

use image::{buffer::ConvertBuffer, codecs::jpeg::JpegEncoder, ColorType, RgbImage, RgbaImage};
use platelog_types::{
    vision::{CapturedImage, EncodedImage, FrameSize},
    PlatelogError, Result,
};

pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Encode as a lossy JPEG. Alpha is discarded.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<EncodedImage> {
    let rgb: RgbImage = image.convert();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|err| PlatelogError::Capture(format!("jpeg encoding failed: {err}")))?;
    Ok(EncodedImage::jpeg(bytes))
}

pub fn decode(image: &EncodedImage) -> Result<RgbaImage> {
    image::load_from_memory(image.bytes())
        .map(|decoded| decoded.to_rgba8())
        .map_err(|err| PlatelogError::Capture(format!("image decoding failed: {err}")))
}

/// Normalise arbitrary uploaded image bytes into a JPEG capture.
pub fn still_from_bytes(bytes: &[u8], quality: u8) -> Result<CapturedImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| PlatelogError::Capture(format!("unsupported image file: {err}")))?
        .to_rgba8();
    let size = FrameSize::new(decoded.width(), decoded.height());
    Ok(CapturedImage::new(encode_jpeg(&decoded, quality)?, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn jpeg_keeps_dimensions() {
        let image = RgbaImage::from_pixel(40, 30, Rgba([10, 200, 30, 255]));
        let encoded = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).expect("encode");
        assert_eq!(encoded.mime(), "image/jpeg");
        let decoded = decode(&encoded).expect("decode");
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(still_from_bytes(b"definitely not an image", 90).is_err());
    }
}
