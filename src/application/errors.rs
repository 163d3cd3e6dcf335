// Extraction error taxonomy
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Input file contains no geometries.")]
    InputEmpty,

    #[error("Invalid site geometry: {0}")]
    InvalidSite(String),

    #[error("Could not open data store: {reason}")]
    RegionUnavailable { region: String, reason: String },

    #[error("Location outside data coverage.")]
    OutOfBounds,

    #[error("All pixels masked/NaN")]
    NoValidData,

    #[error("Processing failed: {0}")]
    InternalProcessing(String),
}
