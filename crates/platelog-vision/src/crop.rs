//! Square crop selection over a captured still.
//!
//! Selections live in percent of the *displayed* image so they survive
//! zooming; rendering maps them back to native pixels.

use image::{imageops, imageops::FilterType};
use platelog_camera::codec::{decode, encode_jpeg, DEFAULT_JPEG_QUALITY};
use platelog_types::{
    config::{CropConfig, SeedPolicy},
    vision::{BoundingBox, CapturedImage, CropRect, FrameSize},
    Result,
};
use tracing::{debug, info, warn};

use crate::crop_error;

/// How the image is laid out on screen when the editor loads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub displayed_width: f64,
    pub displayed_height: f64,
    pub natural: FrameSize,
    /// Device pixel density applied to the output raster.
    pub pixel_ratio: f64,
}

impl DisplayGeometry {
    pub fn new(displayed_width: f64, displayed_height: f64, natural: FrameSize) -> Self {
        Self {
            displayed_width,
            displayed_height,
            natural,
            pixel_ratio: 1.0,
        }
    }

    /// Image shown at its native size.
    pub fn native(natural: FrameSize) -> Self {
        Self::new(natural.width as f64, natural.height as f64, natural)
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    fn is_usable(&self) -> bool {
        self.displayed_width.is_finite()
            && self.displayed_height.is_finite()
            && self.displayed_width > 0.0
            && self.displayed_height > 0.0
            && self.pixel_ratio.is_finite()
            && self.pixel_ratio > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSettings {
    pub seed_policy: SeedPolicy,
    pub default_coverage_pct: f64,
    pub jpeg_quality: u8,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            seed_policy: SeedPolicy::Clamp,
            default_coverage_pct: 90.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CropSettings {
    pub fn from_config(config: &CropConfig, jpeg_quality: u8) -> Self {
        Self {
            seed_policy: config.seed_policy,
            default_coverage_pct: config.default_coverage_pct,
            jpeg_quality,
        }
    }
}

/// What the editor hands back: the cropped still, or the untouched original.
#[derive(Debug, Clone)]
pub enum CropOutcome {
    Cropped(CapturedImage),
    CancelledWithFallback(CapturedImage),
}

impl CropOutcome {
    pub fn image(&self) -> &CapturedImage {
        match self {
            CropOutcome::Cropped(image) | CropOutcome::CancelledWithFallback(image) => image,
        }
    }

    pub fn into_image(self) -> CapturedImage {
        match self {
            CropOutcome::Cropped(image) | CropOutcome::CancelledWithFallback(image) => image,
        }
    }

    pub fn was_cropped(&self) -> bool {
        matches!(self, CropOutcome::Cropped(_))
    }
}

/// Initial selection: the suggested box in percent, or a centred square.
pub fn seed_selection(
    suggestion: Option<&BoundingBox>,
    geometry: &DisplayGeometry,
    settings: &CropSettings,
) -> CropRect {
    if let Some(bbox) = suggestion {
        match settings.seed_policy {
            SeedPolicy::PassThrough => return bbox.to_percent(),
            SeedPolicy::Clamp => {
                let clamped = if bbox.is_finite() {
                    clamp_to_image(bbox.to_percent())
                } else {
                    None
                };
                match clamped {
                    Some(rect) => return rect,
                    None => warn!(?bbox, "unusable suggested box; using default selection"),
                }
            }
        }
    }
    centered_square(geometry, settings.default_coverage_pct)
}

/// Fit `rect` inside 0..=100 on both axes. `None` for non-finite or empty
/// rectangles.
pub fn clamp_to_image(rect: CropRect) -> Option<CropRect> {
    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return None;
    }
    let width = rect.width.clamp(0.0, 100.0);
    let height = rect.height.clamp(0.0, 100.0);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(CropRect::new(
        rect.x.clamp(0.0, 100.0 - width),
        rect.y.clamp(0.0, 100.0 - height),
        width,
        height,
    ))
}

/// Square (in displayed pixels) selection spanning `coverage_pct` of the
/// width, centred. Shrinks to `coverage_pct` of the height when the square
/// would not fit vertically.
pub fn centered_square(geometry: &DisplayGeometry, coverage_pct: f64) -> CropRect {
    let mut width = coverage_pct;
    let mut height = width * geometry.displayed_width / geometry.displayed_height;
    if height > 100.0 {
        height = coverage_pct;
        width = height * geometry.displayed_height / geometry.displayed_width;
    }
    CropRect::new((100.0 - width) / 2.0, (100.0 - height) / 2.0, width, height)
}

/// Interactive crop session over one captured still.
pub struct CropEditor {
    source: CapturedImage,
    suggestion: Option<BoundingBox>,
    settings: CropSettings,
    geometry: Option<DisplayGeometry>,
    live: Option<CropRect>,
    completed: Option<CropRect>,
}

impl CropEditor {
    pub fn open(
        source: CapturedImage,
        suggestion: Option<BoundingBox>,
        settings: CropSettings,
    ) -> Self {
        Self {
            source,
            suggestion,
            settings,
            geometry: None,
            live: None,
            completed: None,
        }
    }

    pub fn source(&self) -> &CapturedImage {
        &self.source
    }

    pub fn live(&self) -> Option<CropRect> {
        self.live
    }

    pub fn completed(&self) -> Option<CropRect> {
        self.completed
    }

    pub fn geometry(&self) -> Option<DisplayGeometry> {
        self.geometry
    }

    /// Called once the displayed size of the image is known. Seeds the live
    /// selection and returns it.
    pub fn on_image_load(&mut self, geometry: DisplayGeometry) -> Result<CropRect> {
        if !geometry.is_usable() {
            return Err(crop_error(format!("unusable display geometry {geometry:?}")));
        }
        let seeded = seed_selection(self.suggestion.as_ref(), &geometry, &self.settings);
        debug!(?seeded, suggested = self.suggestion.is_some(), "crop seeded");
        self.geometry = Some(geometry);
        self.live = Some(seeded);
        self.completed = None;
        Ok(seeded)
    }

    /// Apply a drag/resize step. The selection stays square in displayed
    /// pixels and inside the image; the width drives the height.
    pub fn adjust(&mut self, requested: CropRect) -> Option<CropRect> {
        let geometry = self.geometry?;
        let aspect = geometry.displayed_width / geometry.displayed_height;
        let max_width = (100.0 / aspect).min(100.0);
        let width = if requested.width.is_finite() {
            requested.width.clamp(0.0, max_width)
        } else {
            0.0
        };
        let height = width * aspect;
        let x = finite_or_zero(requested.x).clamp(0.0, 100.0 - width);
        let y = finite_or_zero(requested.y).clamp(0.0, (100.0 - height).max(0.0));
        let rect = CropRect::new(x, y, width, height);
        self.live = Some(rect);
        Some(rect)
    }

    /// End of a drag gesture: the live selection becomes the completed one.
    pub fn finish_gesture(&mut self) -> Option<CropRect> {
        self.completed = self.live;
        self.completed
    }

    /// Render the completed selection. `None` while there is nothing to
    /// confirm. Rendering failures fall back to the uncropped original.
    pub fn confirm(&self) -> Option<CropOutcome> {
        let rect = self.completed.filter(CropRect::has_area)?;
        match self.render(rect) {
            Ok(image) => Some(CropOutcome::Cropped(image)),
            Err(err) => {
                warn!(error = %err, "crop rendering failed; keeping the full image");
                Some(CropOutcome::CancelledWithFallback(self.source.clone()))
            }
        }
    }

    /// Leave the editor keeping the full, uncropped image.
    pub fn cancel(self) -> CropOutcome {
        info!("crop cancelled; using full image");
        CropOutcome::CancelledWithFallback(self.source)
    }

    fn render(&self, rect: CropRect) -> Result<CapturedImage> {
        let geometry = self
            .geometry
            .ok_or_else(|| crop_error("image has not been loaded"))?;
        let source = decode(self.source.image())?;
        let (natural_w, natural_h) = source.dimensions();
        let scale_x = natural_w as f64 / geometry.displayed_width;
        let scale_y = natural_h as f64 / geometry.displayed_height;

        // percent -> displayed pixels -> native pixels
        let (x0, width) = native_span(
            rect.x,
            rect.width,
            geometry.displayed_width * scale_x,
            natural_w,
        );
        let (y0, height) = native_span(
            rect.y,
            rect.height,
            geometry.displayed_height * scale_y,
            natural_h,
        );
        let (src_w, src_h) = (whole_pixels(width), whole_pixels(height));
        if src_w == 0 || src_h == 0 {
            return Err(crop_error("selection lies outside the image"));
        }

        let out_w = whole_pixels(width * geometry.pixel_ratio);
        let out_h = whole_pixels(height * geometry.pixel_ratio);
        if out_w == 0 || out_h == 0 {
            return Err(crop_error("crop output would be empty"));
        }

        let region = imageops::crop_imm(&source, x0, y0, src_w, src_h).to_image();
        let output = if (out_w, out_h) == (src_w, src_h) {
            region
        } else {
            imageops::resize(&region, out_w, out_h, FilterType::Lanczos3)
        };
        let encoded = encode_jpeg(&output, self.settings.jpeg_quality)?;
        info!(
            x = x0,
            y = y0,
            width = out_w,
            height = out_h,
            "crop rendered"
        );
        Ok(CapturedImage::new(encoded, FrameSize::new(out_w, out_h)))
    }
}

/// Start pixel and fractional length of a percent interval on an axis of
/// `extent` native pixels, clipped to `0..limit`.
fn native_span(start_pct: f64, len_pct: f64, extent: f64, limit: u32) -> (u32, f64) {
    let start = start_pct / 100.0 * extent;
    let mut len = len_pct / 100.0 * extent;
    if start < 0.0 {
        len += start;
    }
    let origin = start.max(0.0).floor().min(limit as f64);
    let len = len.min(limit as f64 - origin).max(0.0);
    (origin as u32, len)
}

/// Truncate to whole pixels, absorbing float noise just below an integer.
fn whole_pixels(value: f64) -> u32 {
    (value + 1e-6).floor().max(0.0) as u32
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
