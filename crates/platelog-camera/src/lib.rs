//! Camera device abstraction, capture sessions and frame capture.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image::RgbaImage;
use platelog_types::{
    vision::{FacingMode, FrameSize},
    PlatelogError, Result,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod capture;
pub mod codec;
mod mock;
mod still;

pub use capture::{capture, capture_frame};
pub use mock::{MockCamera, Readiness, StreamProbe};
pub use still::StillCamera;

/// What to ask the device for when opening a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraConstraint {
    Facing(FacingMode),
    Any,
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, constraint: CameraConstraint) -> Result<Box<dyn VideoStream>>;
}

#[async_trait]
impl CameraDevice for Box<dyn CameraDevice> {
    async fn open(&self, constraint: CameraConstraint) -> Result<Box<dyn VideoStream>> {
        (**self).open(constraint).await
    }
}

/// A live stream bound to a camera. Tracks keep the hardware busy until
/// [`VideoStream::stop_tracks`] is called.
pub trait VideoStream: Send + Sync {
    fn label(&self) -> &str;
    fn facing(&self) -> FacingMode;
    /// Resolves to `Some` once the first frame's native size is known.
    fn metadata(&self) -> watch::Receiver<Option<FrameSize>>;
    /// Current frame at native resolution.
    fn grab_frame(&self) -> Result<RgbaImage>;
    fn stop_tracks(&mut self);
}

/// Open a stream, preferring the rear camera, with a single unconstrained
/// retry. A failed retry is terminal.
pub async fn acquire<D>(device: &D, prefer_rear: bool) -> Result<Box<dyn VideoStream>>
where
    D: CameraDevice + ?Sized,
{
    let first = if prefer_rear {
        CameraConstraint::Facing(FacingMode::Environment)
    } else {
        CameraConstraint::Any
    };
    match device.open(first).await {
        Ok(stream) => Ok(stream),
        Err(err) => {
            warn!(error = %err, ?first, "camera request failed, retrying with any camera");
            device.open(CameraConstraint::Any).await.map_err(|retry| {
                PlatelogError::CameraUnavailable(format!("no camera could be opened: {retry}"))
            })
        }
    }
}

/// Owns a stream and stops its tracks exactly once, on release or drop.
pub struct StreamGuard {
    stream: Option<Box<dyn VideoStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn stream(&self) -> Option<&dyn VideoStream> {
        self.stream.as_deref()
    }

    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!(label = stream.label(), "stopping camera tracks");
            stream.stop_tracks();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Default)]
struct SlotState {
    token: Option<CancellationToken>,
    guard: Option<StreamGuard>,
    ready: Option<FrameSize>,
    error: Option<String>,
    sessions: u64,
}

/// Holder for at most one camera session.
///
/// Clones share the same session. Dropping the last clone releases the
/// stream.
#[derive(Clone, Default)]
pub struct CaptureSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SlotState>> {
        self.inner
            .lock()
            .map_err(|_| camera_error("capture slot lock poisoned"))
    }

    /// Start a session. Returns `Ok(false)` without doing anything when a
    /// session is already active or starting, and also when the session was
    /// closed before it became ready.
    pub async fn start<D>(&self, device: &D, prefer_rear: bool) -> Result<bool>
    where
        D: CameraDevice + ?Sized,
    {
        let (token, session) = {
            let mut state = self.lock()?;
            if state.token.is_some() {
                debug!("camera session already active; ignoring start request");
                return Ok(false);
            }
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            state.ready = None;
            state.error = None;
            state.sessions += 1;
            (token, state.sessions)
        };

        let stream = match acquire(device, prefer_rear).await {
            Ok(stream) => stream,
            Err(err) => {
                if !self.fail(&token, &err)? {
                    debug!(session, error = %err, "ignoring failure of a closed session");
                    return Ok(false);
                }
                return Err(err);
            }
        };
        let mut guard = StreamGuard::new(stream);
        let mut metadata = match guard.stream() {
            Some(stream) => stream.metadata(),
            None => return Err(camera_error("stream vanished before it was bound")),
        };

        {
            let mut state = self.lock()?;
            if token.is_cancelled() {
                debug!(session, "discarding stream acquired for a closed session");
                guard.release();
                return Ok(false);
            }
            state.guard = Some(guard);
        }

        let size = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(session, "session closed while waiting for first frame");
                return Ok(false);
            }
            res = async { metadata.wait_for(Option::is_some).await.map(|v| *v) } => res,
        };

        match size {
            Ok(Some(size)) if !size.is_empty() => {
                let mut state = self.lock()?;
                if token.is_cancelled() {
                    return Ok(false);
                }
                info!(session, width = size.width, height = size.height, "camera ready");
                state.ready = Some(size);
                Ok(true)
            }
            _ => {
                let err = camera_error("camera stream ended before delivering a frame");
                if self.fail(&token, &err)? {
                    Err(err)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Close the current session, if any, and start a new one.
    pub async fn replace<D>(&self, device: &D, prefer_rear: bool) -> Result<bool>
    where
        D: CameraDevice + ?Sized,
    {
        self.close()?;
        self.start(device, prefer_rear).await
    }

    /// Record a terminal error for the session owning `token` and release
    /// its stream. Returns `false` for a stale token, which is ignored.
    fn fail(&self, token: &CancellationToken, err: &PlatelogError) -> Result<bool> {
        let mut state = self.lock()?;
        if token.is_cancelled() {
            return Ok(false);
        }
        warn!(error = %err, "camera session failed");
        token.cancel();
        state.token = None;
        state.ready = None;
        state.error = Some(err.to_string());
        if let Some(mut guard) = state.guard.take() {
            guard.release();
        }
        Ok(true)
    }

    /// Stop the stream and invalidate any pending continuation of the
    /// current session. Returns whether a session was open.
    pub fn close(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let had_session = state.token.is_some();
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        if let Some(mut guard) = state.guard.take() {
            guard.release();
        }
        state.ready = None;
        state.error = None;
        if had_session {
            info!("camera session closed");
        }
        Ok(had_session)
    }

    pub fn is_active(&self) -> bool {
        self.lock().map(|s| s.token.is_some()).unwrap_or(false)
    }

    /// Capture is only allowed when this is true.
    pub fn is_ready(&self) -> bool {
        self.lock()
            .map(|s| s.ready.is_some() && s.error.is_none() && s.guard.is_some())
            .unwrap_or(false)
    }

    pub fn frame_size(&self) -> Option<FrameSize> {
        self.lock().ok().and_then(|s| s.ready)
    }

    pub fn error(&self) -> Option<String> {
        self.lock().ok().and_then(|s| s.error.clone())
    }

    pub fn session_token(&self) -> Option<CancellationToken> {
        self.lock().ok().and_then(|s| s.token.clone())
    }

    /// Run `f` against the live stream when the session is ready. Returns
    /// `Ok(None)` otherwise.
    pub fn with_ready_stream<R>(
        &self,
        f: impl FnOnce(&dyn VideoStream, FrameSize) -> R,
    ) -> Result<Option<R>> {
        let state = self.lock()?;
        if state.error.is_some() {
            return Ok(None);
        }
        match (state.ready, state.guard.as_ref().and_then(|g| g.stream())) {
            (Some(size), Some(stream)) => Ok(Some(f(stream, size))),
            _ => Ok(None),
        }
    }
}

/// Generate an error aligned with camera semantics.
pub fn camera_error(message: impl Into<String>) -> PlatelogError {
    PlatelogError::Camera(message.into())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn prefers_rear_camera_first() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(64, 48));
        let stream = acquire(&camera, true).await.expect("rear camera");
        assert_eq!(stream.facing(), FacingMode::Environment);
        let probes = camera.probes();
        assert_eq!(probes.len(), 1);
        assert_eq!(
            probes[0].constraint,
            CameraConstraint::Facing(FacingMode::Environment)
        );
    }

    #[tokio::test]
    async fn falls_back_to_any_camera_once() {
        let camera = MockCamera::new(FacingMode::User, FrameSize::new(64, 48));
        let stream = acquire(&camera, true).await.expect("fallback camera");
        assert_eq!(stream.facing(), FacingMode::User);
        assert_eq!(camera.open_attempts(), 2);
    }

    #[tokio::test]
    async fn reports_unavailable_after_failed_retry() {
        let camera = MockCamera::unavailable();
        let err = match acquire(&camera, true).await {
            Ok(_) => panic!("no camera should open"),
            Err(err) => err,
        };
        assert!(matches!(err, PlatelogError::CameraUnavailable(_)));
        assert_eq!(camera.open_attempts(), 2);
    }

    #[tokio::test]
    async fn slot_becomes_ready_with_native_size() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(320, 240));
        let slot = CaptureSlot::new();
        assert!(!slot.is_ready());
        assert!(slot.start(&camera, true).await.expect("start"));
        assert!(slot.is_ready());
        assert_eq!(slot.frame_size(), Some(FrameSize::new(320, 240)));
    }

    #[tokio::test]
    async fn second_start_is_a_noop_and_nothing_leaks() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(32, 32));
        let slot = CaptureSlot::new();
        assert!(slot.start(&camera, true).await.expect("first start"));
        assert!(!slot.start(&camera, true).await.expect("second start"));
        assert_eq!(camera.probes().len(), 1);

        assert!(slot.close().expect("close"));
        let probes = camera.probes();
        assert_eq!(probes[0].stop_counts(), vec![1]);
        assert!(!slot.close().expect("second close"));
        assert_eq!(camera.probes()[0].stop_counts(), vec![1]);
    }

    #[tokio::test]
    async fn replacing_a_session_stops_the_previous_stream_once() {
        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(32, 32))
            .with_tracks(2);
        let slot = CaptureSlot::new();
        slot.start(&camera, true).await.expect("first");
        slot.replace(&camera, true).await.expect("replacement");
        let probes = camera.probes();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].stop_counts(), vec![1, 1]);
        assert_eq!(probes[1].stop_counts(), vec![0, 0]);

        drop(slot);
        assert_eq!(camera.probes()[1].stop_counts(), vec![1, 1]);
        assert_eq!(camera.probes()[0].stop_counts(), vec![1, 1]);
    }

    #[tokio::test]
    async fn closing_while_waiting_for_first_frame_discards_the_session() {
        let camera = Arc::new(
            MockCamera::new(FacingMode::Environment, FrameSize::new(32, 32))
                .with_readiness(Readiness::Never),
        );
        let slot = CaptureSlot::new();
        let task = {
            let slot = slot.clone();
            let camera = Arc::clone(&camera);
            tokio::spawn(async move { slot.start(camera.as_ref(), true).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(slot.close().expect("close"));

        let started = task.await.expect("join").expect("start result");
        assert!(!started);
        assert!(!slot.is_ready());
        assert_eq!(camera.probes()[0].stop_counts(), vec![1]);
    }

    #[tokio::test]
    async fn stale_acquisition_is_released_after_close() {
        let camera = Arc::new(
            MockCamera::new(FacingMode::Environment, FrameSize::new(32, 32))
                .with_open_delay(Duration::from_millis(50)),
        );
        let slot = CaptureSlot::new();
        let task = {
            let slot = slot.clone();
            let camera = Arc::clone(&camera);
            tokio::spawn(async move { slot.start(camera.as_ref(), true).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.close().expect("close");

        assert!(!task.await.expect("join").expect("start result"));
        assert!(!slot.is_active());
        assert_eq!(camera.probes()[0].stop_counts(), vec![1]);
    }

    #[tokio::test]
    async fn failure_after_close_is_discarded() {
        let camera =
            Arc::new(MockCamera::unavailable().with_open_delay(Duration::from_millis(50)));
        let slot = CaptureSlot::new();
        let task = {
            let slot = slot.clone();
            let camera = Arc::clone(&camera);
            tokio::spawn(async move { slot.start(camera.as_ref(), true).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.close().expect("close");

        assert!(!task.await.expect("join").expect("no error for a closed view"));
        assert!(slot.error().is_none());
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn failure_is_terminal_until_restart() {
        let slot = CaptureSlot::new();
        let err = slot
            .start(&MockCamera::unavailable(), true)
            .await
            .expect_err("camera unavailable");
        assert!(matches!(err, PlatelogError::CameraUnavailable(_)));
        assert!(slot.error().is_some());
        assert!(!slot.is_ready());
        assert!(slot
            .with_ready_stream(|_, size| size)
            .expect("lock")
            .is_none());

        let camera = MockCamera::new(FacingMode::Environment, FrameSize::new(16, 16));
        assert!(slot.start(&camera, true).await.expect("restart"));
        assert!(slot.error().is_none());
    }
}
