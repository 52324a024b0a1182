//! Image analysis and crop editing for captured stills.

pub mod analysis;
pub mod crop;

use platelog_types::PlatelogError;

pub use analysis::{
    analyze_best_effort, analyzer_from_config, AnalysisReport, AnalysisSuggestion, FixedAnalyzer,
    HttpAnalyzer, ImageAnalyzer, NullAnalyzer,
};
pub use crop::{CropEditor, CropOutcome, CropSettings, DisplayGeometry};

pub fn vision_error(message: impl Into<String>) -> PlatelogError {
    PlatelogError::Analysis(message.into())
}

pub fn crop_error(message: impl Into<String>) -> PlatelogError {
    PlatelogError::Crop(message.into())
}
