use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use platelog_types::{
    vision::{FacingMode, FrameSize},
    Result,
};
use tokio::{sync::watch, time::sleep};
use tracing::info;

use crate::{camera_error, CameraConstraint, CameraDevice, VideoStream};

/// When a mock stream reports its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Immediate,
    After(Duration),
    Never,
}

/// Record of one stream handed out by [`MockCamera`].
#[derive(Debug, Clone)]
pub struct StreamProbe {
    pub constraint: CameraConstraint,
    tracks: Vec<Arc<AtomicUsize>>,
}

impl StreamProbe {
    /// How many times each track has been stopped.
    pub fn stop_counts(&self) -> Vec<usize> {
        self.tracks.iter().map(|t| t.load(Ordering::SeqCst)).collect()
    }
}

/// Single synthetic camera used for early integration and testing.
pub struct MockCamera {
    facing: Option<FacingMode>,
    frame: RgbaImage,
    tracks: usize,
    readiness: Readiness,
    open_delay: Option<Duration>,
    attempts: AtomicUsize,
    probes: Mutex<Vec<StreamProbe>>,
}

impl MockCamera {
    pub fn new(facing: FacingMode, size: FrameSize) -> Self {
        Self::with_device(Some(facing), gradient(size))
    }

    /// A machine without any camera.
    pub fn unavailable() -> Self {
        Self::with_device(None, gradient(FrameSize::new(1, 1)))
    }

    fn with_device(facing: Option<FacingMode>, frame: RgbaImage) -> Self {
        Self {
            facing,
            frame,
            tracks: 1,
            readiness: Readiness::Immediate,
            open_delay: None,
            attempts: AtomicUsize::new(0),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Serve `frame` instead of the generated gradient.
    pub fn with_frame(mut self, frame: RgbaImage) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_tracks(mut self, tracks: usize) -> Self {
        self.tracks = tracks.max(1);
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> Vec<StreamProbe> {
        self.probes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn open(&self, constraint: CameraConstraint) -> Result<Box<dyn VideoStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            sleep(delay).await;
        }

        let Some(facing) = self.facing else {
            return Err(camera_error("requested device not found"));
        };
        if let CameraConstraint::Facing(wanted) = constraint {
            if wanted != facing {
                return Err(camera_error(format!(
                    "no camera facing {wanted:?} (only {facing:?} present)"
                )));
            }
        }

        info!("Opening mock camera ({:?}) for {:?}", facing, constraint);
        let tracks: Vec<_> = (0..self.tracks)
            .map(|_| Arc::new(AtomicUsize::new(0)))
            .collect();
        if let Ok(mut probes) = self.probes.lock() {
            probes.push(StreamProbe {
                constraint,
                tracks: tracks.clone(),
            });
        }

        let size = FrameSize::new(self.frame.width(), self.frame.height());
        let initial = matches!(self.readiness, Readiness::Immediate).then_some(size);
        let (tx, rx) = watch::channel(initial);
        let tx = Arc::new(tx);
        if let Readiness::After(delay) = self.readiness {
            let tx = Arc::clone(&tx);
            tokio::spawn(async move {
                sleep(delay).await;
                let _ = tx.send(Some(size));
            });
        }

        Ok(Box::new(MockStream {
            facing,
            frame: self.frame.clone(),
            tracks,
            stopped: false,
            _tx: tx,
            rx,
        }))
    }
}

struct MockStream {
    facing: FacingMode,
    frame: RgbaImage,
    tracks: Vec<Arc<AtomicUsize>>,
    stopped: bool,
    _tx: Arc<watch::Sender<Option<FrameSize>>>,
    rx: watch::Receiver<Option<FrameSize>>,
}

impl VideoStream for MockStream {
    fn label(&self) -> &str {
        "mock camera"
    }

    fn facing(&self) -> FacingMode {
        self.facing
    }

    fn metadata(&self) -> watch::Receiver<Option<FrameSize>> {
        self.rx.clone()
    }

    fn grab_frame(&self) -> Result<RgbaImage> {
        if self.stopped {
            return Err(camera_error("mock stream already stopped"));
        }
        Ok(self.frame.clone())
    }

    fn stop_tracks(&mut self) {
        self.stopped = true;
        for track in &self.tracks {
            track.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn gradient(size: FrameSize) -> RgbaImage {
    let (w, h) = (size.width.max(1), size.height.max(1));
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, 128, 255])
    })
}
