use std::path::PathBuf;

use async_trait::async_trait;
use image::RgbaImage;
use platelog_types::{
    vision::{FacingMode, FrameSize},
    Result,
};
use tokio::sync::watch;
use tracing::info;

use crate::{camera_error, CameraConstraint, CameraDevice, VideoStream};

/// Virtual camera that serves a still image file as its video feed.
pub struct StillCamera {
    path: PathBuf,
    facing: FacingMode,
}

impl StillCamera {
    pub fn new(path: impl Into<PathBuf>, facing: FacingMode) -> Self {
        Self {
            path: path.into(),
            facing,
        }
    }
}

#[async_trait]
impl CameraDevice for StillCamera {
    async fn open(&self, constraint: CameraConstraint) -> Result<Box<dyn VideoStream>> {
        if let CameraConstraint::Facing(wanted) = constraint {
            if wanted != self.facing {
                return Err(camera_error(format!(
                    "still camera {} does not face {wanted:?}",
                    self.path.display()
                )));
            }
        }

        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            camera_error(format!("unable to open {}: {err}", self.path.display()))
        })?;
        let frame = image::load_from_memory(&raw)
            .map_err(|err| camera_error(format!("still image decoding failed: {err}")))?
            .to_rgba8();
        let size = FrameSize::new(frame.width(), frame.height());
        info!(
            "Still camera {} streaming {}x{}",
            self.path.display(),
            size.width,
            size.height
        );

        let (tx, rx) = watch::channel(Some(size));
        Ok(Box::new(StillStream {
            label: self.path.display().to_string(),
            facing: self.facing,
            frame: Some(frame),
            _tx: Some(tx),
            rx,
        }))
    }
}

struct StillStream {
    label: String,
    facing: FacingMode,
    frame: Option<RgbaImage>,
    _tx: Option<watch::Sender<Option<FrameSize>>>,
    rx: watch::Receiver<Option<FrameSize>>,
}

impl VideoStream for StillStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }

    fn metadata(&self) -> watch::Receiver<Option<FrameSize>> {
        self.rx.clone()
    }

    fn grab_frame(&self) -> Result<RgbaImage> {
        self.frame
            .clone()
            .ok_or_else(|| camera_error("still camera stream stopped"))
    }

    fn stop_tracks(&mut self) {
        self.frame = None;
        self._tx = None;
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::{capture, CaptureSlot};

    fn write_png(width: u32, height: u32) -> tempfile::TempPath {
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp file");
        RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]))
            .save(file.path())
            .expect("write png");
        file.into_temp_path()
    }

    #[tokio::test]
    async fn still_camera_streams_file_at_native_size() {
        let path = write_png(48, 24);
        let camera = StillCamera::new(path.to_path_buf(), FacingMode::Environment);
        let slot = CaptureSlot::new();
        assert!(slot.start(&camera, true).await.expect("start"));
        let captured = capture(&slot, 90).expect("capture").expect("ready");
        assert_eq!(captured.size(), FrameSize::new(48, 24));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_unavailable() {
        let camera = StillCamera::new("/nonexistent/frame.png", FacingMode::Environment);
        let slot = CaptureSlot::new();
        let err = slot.start(&camera, true).await.expect_err("missing file");
        assert!(matches!(
            err,
            platelog_types::PlatelogError::CameraUnavailable(_)
        ));
    }
}
