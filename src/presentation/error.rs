// HTTP error mapping for batch-level failures
use crate::application::errors::ExtractionError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Extraction(ExtractionError),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Extraction(e) => {
                let status = match e {
                    ExtractionError::InputEmpty | ExtractionError::InvalidSite(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    ExtractionError::RegionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        AppError::Extraction(e)
    }
}
