use thiserror::Error;

pub type Result<T, E = PlatelogError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum PlatelogError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("analysis error: {0}")]
    Analysis(String),
    #[error("crop error: {0}")]
    Crop(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("account error: {0}")]
    Account(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reasons a food entry form cannot be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter a name for the item")]
    EmptyName,
    #[error("please give the item a star rating")]
    Unrated,
    #[error("rating must be between 0 and 5, got {0}")]
    RatingOutOfRange(u8),
}
