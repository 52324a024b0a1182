//! Client side of the external image analysis service.
//!
//! Analysis is best-effort: failures and timeouts turn into an empty
//! suggestion plus a message for the user, and results arriving after the
//! requesting view has gone away are dropped.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use platelog_types::{
    config::AnalysisConfig,
    food::NutriGrade,
    vision::{BoundingBox, CapturedImage},
    Result,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::vision_error;

/// Metadata proposed by the analysis service. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSuggestion {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub nutri_score: Option<NutriGrade>,
    pub bounding_box: Option<BoundingBox>,
}

impl AnalysisSuggestion {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tags.is_none()
            && self.nutri_score.is_none()
            && self.bounding_box.is_none()
    }
}

/// Wire shape of the service response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    name: Option<String>,
    tags: Option<Vec<String>>,
    nutri_score: Option<String>,
    bounding_box: Option<BoundingBox>,
}

impl From<AnalysisResponse> for AnalysisSuggestion {
    fn from(raw: AnalysisResponse) -> Self {
        let nutri_score = raw.nutri_score.as_deref().and_then(|letter| {
            letter
                .parse::<NutriGrade>()
                .map_err(|err| warn!(%err, "ignoring nutrition grade from analysis"))
                .ok()
        });
        let tags = raw.tags.map(|tags| {
            tags.into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        });
        Self {
            name: raw
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            tags,
            nutri_score,
            bounding_box: raw.bounding_box,
        }
    }
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisSuggestion>;
}

#[async_trait]
impl ImageAnalyzer for Box<dyn ImageAnalyzer> {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisSuggestion> {
        (**self).analyze(image).await
    }
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    image: &'a str,
}

/// Analyzer backed by an HTTP endpoint accepting `{"image": <data URL>}`.
pub struct HttpAnalyzer {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|err| vision_error(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ImageAnalyzer for HttpAnalyzer {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisSuggestion> {
        let data_url = image.to_data_url();
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&AnalysisRequest { image: &data_url });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| vision_error(format!("analysis request failed: {err}")))?;
        match response.status() {
            StatusCode::OK => {
                let raw: AnalysisResponse = response
                    .json()
                    .await
                    .map_err(|err| vision_error(format!("malformed analysis response: {err}")))?;
                Ok(raw.into())
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(vision_error(format!("unexpected status {status}: {text}")))
            }
        }
    }
}

/// Analyzer that never suggests anything.
pub struct NullAnalyzer;

#[async_trait]
impl ImageAnalyzer for NullAnalyzer {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisSuggestion> {
        debug!(
            "Null analyzer skipping {}x{} image",
            image.size().width,
            image.size().height
        );
        Ok(AnalysisSuggestion::default())
    }
}

/// Analyzer returning a canned answer, optionally after a delay.
pub struct FixedAnalyzer {
    outcome: std::result::Result<AnalysisSuggestion, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedAnalyzer {
    pub fn suggesting(suggestion: AnalysisSuggestion) -> Self {
        Self {
            outcome: Ok(suggestion),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _image: &CapturedImage) -> Result<AnalysisSuggestion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map_err(vision_error)
    }
}

/// Pick the analyzer described by `config`: HTTP when an endpoint is set,
/// otherwise the null analyzer.
pub fn analyzer_from_config(config: &AnalysisConfig) -> Result<Box<dyn ImageAnalyzer>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            info!("Using analysis service at {}", endpoint);
            Ok(Box::new(HttpAnalyzer::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        _ => {
            info!("No analysis endpoint configured; suggestions disabled");
            Ok(Box::new(NullAnalyzer))
        }
    }
}

/// Result of a best-effort analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub suggestion: AnalysisSuggestion,
    /// Non-fatal message to show next to the form when analysis failed.
    pub notice: Option<String>,
}

/// Run `analyzer` without ever failing the caller.
///
/// Returns `None` when `token` is cancelled before the result is applied.
/// Errors and timeouts produce an empty suggestion with a notice. No retry
/// is attempted.
pub async fn analyze_best_effort<A>(
    analyzer: &A,
    image: &CapturedImage,
    timeout: Duration,
    token: &CancellationToken,
) -> Option<AnalysisReport>
where
    A: ImageAnalyzer + ?Sized,
{
    let outcome = tokio::select! {
        _ = token.cancelled() => {
            debug!("view closed during analysis; discarding result");
            return None;
        }
        outcome = tokio::time::timeout(timeout, analyzer.analyze(image)) => outcome,
    };
    if token.is_cancelled() {
        return None;
    }

    let report = match outcome {
        Ok(Ok(suggestion)) => {
            info!(
                name = suggestion.name.as_deref().unwrap_or("-"),
                has_box = suggestion.bounding_box.is_some(),
                "analysis complete"
            );
            AnalysisReport {
                suggestion,
                notice: None,
            }
        }
        Ok(Err(err)) => {
            warn!(error = %err, "analysis failed; continuing without suggestions");
            AnalysisReport {
                suggestion: AnalysisSuggestion::default(),
                notice: Some(format!(
                    "Could not analyze the photo ({err}). Please fill in the details manually."
                )),
            }
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "analysis timed out");
            AnalysisReport {
                suggestion: AnalysisSuggestion::default(),
                notice: Some(
                    "Analyzing the photo took too long. Please fill in the details manually."
                        .into(),
                ),
            }
        }
    };
    Some(report)
}
