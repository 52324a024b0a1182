//! Single-frame capture from a ready camera session.

use image::{imageops, imageops::FilterType};
use platelog_types::{
    vision::{CapturedImage, FacingMode, FrameSize},
    Result,
};
use tracing::{debug, info};

use crate::{codec::encode_jpeg, CaptureSlot, VideoStream};

/// Freeze the current frame of `slot`. Returns `Ok(None)` when the session
/// is not ready or has failed; callers keep the capture action disabled in
/// that state.
pub fn capture(slot: &CaptureSlot, quality: u8) -> Result<Option<CapturedImage>> {
    slot.with_ready_stream(|stream, size| capture_frame(stream, size, quality))?
        .transpose()
}

/// Draw the stream's current frame into a surface of the native frame size,
/// mirrored for user-facing cameras, and encode it.
pub fn capture_frame(
    stream: &dyn VideoStream,
    native: FrameSize,
    quality: u8,
) -> Result<CapturedImage> {
    let frame = stream.grab_frame()?;
    let mut surface = if frame.dimensions() == (native.width, native.height) {
        frame
    } else {
        debug!(
            frame_width = frame.width(),
            frame_height = frame.height(),
            "frame size differs from stream metadata; scaling"
        );
        imageops::resize(&frame, native.width, native.height, FilterType::Triangle)
    };

    if stream.facing() == FacingMode::User {
        imageops::flip_horizontal_in_place(&mut surface);
    }

    let encoded = encode_jpeg(&surface, quality)?;
    info!(
        width = native.width,
        height = native.height,
        bytes = encoded.len(),
        "frame captured"
    );
    Ok(CapturedImage::new(encoded, native))
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::{codec::decode, MockCamera};

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Left half red, right half blue.
    fn split_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
    }

    fn is_red(px: &Rgba<u8>) -> bool {
        px.0[0] > 180 && px.0[2] < 80
    }

    fn is_blue(px: &Rgba<u8>) -> bool {
        px.0[2] > 180 && px.0[0] < 80
    }

    async fn ready_slot(camera: &MockCamera) -> CaptureSlot {
        let slot = CaptureSlot::new();
        assert!(slot.start(camera, true).await.expect("start"));
        slot
    }

    #[tokio::test]
    async fn output_matches_native_frame_size() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(1280, 720));
        let slot = ready_slot(&camera).await;
        let captured = capture(&slot, 85).expect("capture").expect("ready");
        assert_eq!(captured.size(), FrameSize::new(1280, 720));
        let decoded = decode(captured.image()).expect("decode");
        assert_eq!(decoded.dimensions(), (1280, 720));
        assert!(captured.to_data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn rear_camera_is_not_mirrored() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(64, 32))
            .with_frame(split_frame(64, 32));
        let slot = ready_slot(&camera).await;
        let captured = capture(&slot, 95).expect("capture").expect("ready");
        let decoded = decode(captured.image()).expect("decode");
        assert!(is_red(decoded.get_pixel(4, 16)));
        assert!(is_blue(decoded.get_pixel(60, 16)));
    }

    #[tokio::test]
    async fn front_camera_is_mirrored() {
        let camera = MockCamera::new(FacingMode::User, FrameSize::new(64, 32))
            .with_frame(split_frame(64, 32));
        let slot = ready_slot(&camera).await;
        let captured = capture(&slot, 95).expect("capture").expect("ready");
        let decoded = decode(captured.image()).expect("decode");
        assert!(is_blue(decoded.get_pixel(4, 16)));
        assert!(is_red(decoded.get_pixel(60, 16)));
    }

    #[tokio::test]
    async fn capture_is_disabled_until_ready() {
        let slot = CaptureSlot::new();
        assert!(capture(&slot, 90).expect("capture").is_none());

        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(8, 8));
        let slot = ready_slot(&camera).await;
        slot.close().expect("close");
        assert!(capture(&slot, 90).expect("capture").is_none());
    }
}
