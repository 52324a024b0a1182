use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{PlatelogError, Result};

pub const JPEG_MIME: &str = "image/jpeg";

/// Native pixel dimensions of a video frame or still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Which way a camera points relative to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    Environment,
    /// Front camera, pointing at the user.
    User,
    Unknown,
}

/// An encoded raster (JPEG, PNG, ...) together with its MIME type.
///
/// Serialized as a `data:` URL so it can be embedded directly in stored
/// records.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(JPEG_MIME, bytes)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| PlatelogError::Capture("image is not a data URL".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| PlatelogError::Capture("data URL has no payload".into()))?;
        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            PlatelogError::Capture(format!("unsupported data URL encoding: {header}"))
        })?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|err| PlatelogError::Capture(format!("invalid base64 payload: {err}")))?;
        Ok(Self::new(mime, bytes))
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EncodedImage::from_data_url(&raw).map_err(de::Error::custom)
    }
}

/// Immutable still taken from a live stream or an uploaded file.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    image: EncodedImage,
    size: FrameSize,
    captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(image: EncodedImage, size: FrameSize) -> Self {
        Self {
            image,
            size,
            captured_at: Utc::now(),
        }
    }

    pub fn image(&self) -> &EncodedImage {
        &self.image
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn to_data_url(&self) -> String {
        self.image.to_data_url()
    }

    pub fn into_image(self) -> EncodedImage {
        self.image
    }
}

/// Fractional rectangle (0..=1 on each axis, origin top-left) around a
/// detected subject. Values are not validated on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Percentage-space rectangle, each coordinate multiplied by 100.
    pub fn to_percent(&self) -> CropRect {
        CropRect::new(
            self.x * 100.0,
            self.y * 100.0,
            self.width * 100.0,
            self.height * 100.0,
        )
    }
}

/// Selection rectangle in percent (0..=100) of the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}
