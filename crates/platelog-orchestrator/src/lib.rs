//! Capture-to-form pipeline coordinating camera, analysis, crop and storage.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use platelog_camera::{capture, codec::still_from_bytes, CameraDevice, CaptureSlot};
use platelog_store::{ItemStore, KeyValueStore};
use platelog_types::{
    config::PlatelogConfig,
    food::{FoodDraft, FoodItem},
    vision::CapturedImage,
    PlatelogError, Result,
};
use platelog_vision::{
    analyze_best_effort, AnalysisSuggestion, CropEditor, CropOutcome, CropSettings,
    DisplayGeometry, ImageAnalyzer,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub prefer_rear: bool,
    pub jpeg_quality: u8,
    pub analysis_timeout: Duration,
    pub crop: CropSettings,
    pub pixel_ratio: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&PlatelogConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &PlatelogConfig) -> Self {
        Self {
            prefer_rear: config.camera.prefer_rear,
            jpeg_quality: config.camera.jpeg_quality,
            analysis_timeout: Duration::from_millis(config.analysis.timeout_ms),
            crop: CropSettings::from_config(&config.crop, config.camera.jpeg_quality),
            pixel_ratio: config.crop.pixel_ratio,
        }
    }
}

/// A still waiting for the user's crop decision, with whatever the
/// analysis service proposed.
#[derive(Debug, Clone)]
pub struct CaptureReview {
    pub image: CapturedImage,
    pub suggestion: AnalysisSuggestion,
    /// Non-fatal analysis problem to show alongside the form.
    pub notice: Option<String>,
}

/// Form contents after the crop step, before the user submits.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub draft: FoodDraft,
    pub notice: Option<String>,
    pub cropped: bool,
}

impl PendingItem {
    /// Fill the form from the chosen image and the AI suggestions. Rating
    /// and notes are left for the user.
    pub fn from_review(review: CaptureReview, outcome: CropOutcome) -> Self {
        let cropped = outcome.was_cropped();
        let suggestion = review.suggestion;
        Self {
            draft: FoodDraft {
                name: suggestion.name.unwrap_or_default(),
                rating: 0,
                notes: None,
                nutri_score: suggestion.nutri_score,
                image: Some(outcome.into_image().into_image()),
                tags: suggestion.tags.unwrap_or_default(),
            },
            notice: review.notice,
            cropped,
        }
    }

    pub fn into_draft(self) -> FoodDraft {
        self.draft
    }
}

/// Validate `draft` and append it to the user's collection. Nothing is
/// written when validation fails.
pub fn submit<S>(items: &ItemStore<'_, S>, draft: FoodDraft) -> Result<FoodItem>
where
    S: KeyValueStore + ?Sized,
{
    let item = FoodItem::from_draft(draft)?;
    items.add(item)
}

pub struct CapturePipeline<D, A>
where
    D: CameraDevice,
    A: ImageAnalyzer,
{
    device: D,
    analyzer: A,
    slot: CaptureSlot,
    view: Mutex<CancellationToken>,
    settings: PipelineSettings,
}

impl<D, A> CapturePipeline<D, A>
where
    D: CameraDevice,
    A: ImageAnalyzer,
{
    pub fn new(device: D, analyzer: A, settings: PipelineSettings) -> Self {
        Self {
            device,
            analyzer,
            slot: CaptureSlot::new(),
            view: Mutex::new(CancellationToken::new()),
            settings,
        }
    }

    pub fn slot(&self) -> &CaptureSlot {
        &self.slot
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn view(&self) -> Result<MutexGuard<'_, CancellationToken>> {
        self.view
            .lock()
            .map_err(|_| orchestrator_error("view token lock poisoned"))
    }

    /// Token of the current capture view, renewed if the previous view was
    /// closed.
    fn live_view(&self) -> Result<CancellationToken> {
        let mut view = self.view()?;
        if view.is_cancelled() {
            *view = CancellationToken::new();
        }
        Ok(view.clone())
    }

    /// Open the capture view and start the camera. Device errors stay
    /// recorded on the slot; `Ok(false)` means a session was already active.
    pub async fn open_camera(&self) -> Result<bool> {
        self.live_view()?;
        self.slot.start(&self.device, self.settings.prefer_rear).await
    }

    /// Close the capture view: stops the camera and discards any analysis
    /// still in flight.
    pub fn close_view(&self) -> Result<()> {
        self.view()?.cancel();
        self.slot.close()?;
        Ok(())
    }

    /// Freeze a frame, release the camera and run analysis. `Ok(None)` when
    /// the camera is not ready or the view was closed meanwhile.
    pub async fn capture(&self) -> Result<Option<CaptureReview>> {
        let view = self.live_view()?;
        let Some(image) = capture(&self.slot, self.settings.jpeg_quality)? else {
            warn!("capture requested before the camera was ready");
            return Ok(None);
        };
        self.slot.close()?;
        Ok(self.review(image, &view).await)
    }

    /// Use an image file instead of a live capture.
    pub async fn upload(&self, path: &Path) -> Result<Option<CaptureReview>> {
        let view = self.live_view()?;
        self.slot.close()?;
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            PlatelogError::Capture(format!("unable to read {}: {err}", path.display()))
        })?;
        if view.is_cancelled() {
            return Ok(None);
        }
        let image = still_from_bytes(&bytes, self.settings.jpeg_quality)?;
        info!(
            path = %path.display(),
            width = image.size().width,
            height = image.size().height,
            "image uploaded"
        );
        Ok(self.review(image, &view).await)
    }

    async fn review(
        &self,
        image: CapturedImage,
        view: &CancellationToken,
    ) -> Option<CaptureReview> {
        let report =
            analyze_best_effort(&self.analyzer, &image, self.settings.analysis_timeout, view)
                .await?;
        Some(CaptureReview {
            image,
            suggestion: report.suggestion,
            notice: report.notice,
        })
    }

    /// Crop editor for `review`, already seeded as if the image was shown at
    /// native size.
    pub fn crop_editor(&self, review: &CaptureReview) -> Result<CropEditor> {
        let mut editor = CropEditor::open(
            review.image.clone(),
            review.suggestion.bounding_box,
            self.settings.crop,
        );
        let geometry = DisplayGeometry::native(review.image.size())
            .with_pixel_ratio(self.settings.pixel_ratio);
        editor.on_image_load(geometry)?;
        Ok(editor)
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> PlatelogError {
    PlatelogError::Orchestrator(message.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgba, RgbaImage};
    use platelog_camera::MockCamera;
    use platelog_store::MemoryStore;
    use platelog_types::{
        food::NutriGrade,
        vision::{BoundingBox, CropRect, FacingMode, FrameSize},
        ValidationError,
    };
    use platelog_vision::{FixedAnalyzer, NullAnalyzer};

    use super::*;

    fn suggestion() -> AnalysisSuggestion {
        AnalysisSuggestion {
            name: Some("Peanut butter".into()),
            tags: Some(vec!["spread".into(), "protein".into()]),
            nutri_score: Some(NutriGrade::C),
            bounding_box: Some(BoundingBox::new(0.25, 0.25, 0.5, 0.5)),
        }
    }

    fn camera() -> MockCamera {
        MockCamera::new(FacingMode::Environment, FrameSize::new(200, 200))
    }

    #[tokio::test]
    async fn capture_analyze_crop_and_submit() {
        let pipeline = CapturePipeline::new(
            camera(),
            FixedAnalyzer::suggesting(suggestion()),
            PipelineSettings::default(),
        );
        assert!(pipeline.open_camera().await.expect("open"));
        let review = pipeline.capture().await.expect("capture").expect("review");
        assert!(!pipeline.slot().is_active(), "camera released after capture");
        assert!(review.notice.is_none());

        let mut editor = pipeline.crop_editor(&review).expect("editor");
        assert_eq!(editor.live(), Some(CropRect::new(25.0, 25.0, 50.0, 50.0)));
        editor.finish_gesture();
        let outcome = editor.confirm().expect("confirmable");
        assert_eq!(outcome.image().size(), FrameSize::new(100, 100));

        let mut pending = PendingItem::from_review(review, outcome);
        assert!(pending.cropped);
        assert_eq!(pending.draft.name, "Peanut butter");
        pending.draft.rating = 4;

        let store = MemoryStore::new();
        let items = ItemStore::new(&store, "mina");
        let saved = submit(&items, pending.into_draft()).expect("submit");
        assert_eq!(saved.nutri_score, Some(NutriGrade::C));
        assert_eq!(saved.tags, vec!["spread", "protein"]);
        assert_eq!(items.load().expect("load"), vec![saved]);
    }

    #[tokio::test]
    async fn analysis_failure_still_allows_manual_submission() {
        let pipeline = CapturePipeline::new(
            camera(),
            FixedAnalyzer::failing("service unavailable"),
            PipelineSettings::default(),
        );
        pipeline.open_camera().await.expect("open");
        let review = pipeline.capture().await.expect("capture").expect("review");
        assert!(review.notice.is_some());
        assert!(review.suggestion.is_empty());

        let original = review.image.clone();
        let editor = pipeline.crop_editor(&review).expect("editor");
        let mut pending = PendingItem::from_review(review, editor.cancel());
        assert!(!pending.cropped);
        assert!(pending.draft.name.is_empty());

        let store = MemoryStore::new();
        let items = ItemStore::new(&store, "mina");
        let blocked = submit(&items, pending.draft.clone()).expect_err("name required");
        assert!(matches!(
            blocked,
            PlatelogError::Validation(ValidationError::EmptyName)
        ));
        assert!(items.load().expect("load").is_empty(), "no partial save");

        pending.draft.name = "Mystery snack".into();
        pending.draft.rating = 2;
        let saved = submit(&items, pending.into_draft()).expect("submit");
        assert_eq!(saved.image.as_ref(), Some(original.image()));
        assert_eq!(saved.nutri_score, None);
        assert!(saved.tags.is_empty());
    }

    #[tokio::test]
    async fn unavailable_camera_disables_capture() {
        let pipeline = CapturePipeline::new(
            MockCamera::unavailable(),
            NullAnalyzer,
            PipelineSettings::default(),
        );
        let err = pipeline.open_camera().await.expect_err("no camera");
        assert!(matches!(err, PlatelogError::CameraUnavailable(_)));
        assert!(pipeline.slot().error().is_some());
        assert!(pipeline.capture().await.expect("capture").is_none());
    }

    #[tokio::test]
    async fn closing_the_view_discards_pending_analysis() {
        let pipeline = Arc::new(CapturePipeline::new(
            camera(),
            FixedAnalyzer::suggesting(suggestion()).with_delay(Duration::from_millis(200)),
            PipelineSettings::default(),
        ));
        pipeline.open_camera().await.expect("open");
        let task = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.capture().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.close_view().expect("close");

        let review = task.await.expect("join").expect("capture");
        assert!(review.is_none());

        // a new view works again
        assert!(pipeline.open_camera().await.expect("reopen"));
        assert!(pipeline.slot().is_ready());
    }

    #[tokio::test]
    async fn upload_replaces_live_capture() {
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp file");
        RgbaImage::from_pixel(120, 80, Rgba([250, 240, 10, 255]))
            .save(file.path())
            .expect("write png");

        let pipeline = CapturePipeline::new(camera(), NullAnalyzer, PipelineSettings::default());
        pipeline.open_camera().await.expect("open");
        let review = pipeline
            .upload(file.path())
            .await
            .expect("upload")
            .expect("review");
        assert!(!pipeline.slot().is_active());
        assert_eq!(review.image.size(), FrameSize::new(120, 80));
        assert_eq!(review.image.image().mime(), "image/jpeg");

        let editor = pipeline.crop_editor(&review).expect("editor");
        let seeded = editor.live().expect("seeded");
        assert!((seeded.width / 100.0 * 120.0 - seeded.height / 100.0 * 80.0).abs() < 1e-9);
    }
}
