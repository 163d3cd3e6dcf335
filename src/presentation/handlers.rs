// HTTP request handlers
use crate::application::extraction_service::ExtractionRequest;
use crate::application::site_resolver::{RoiInput, resolve_sites};
use crate::domain::record::{ReconstructionParams, SiteOutcome};
use crate::presentation::app_state::AppState;
use crate::presentation::error::AppError;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

type HandlerResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Deserialize)]
pub struct TimeseriesRequest {
    pub roi: RoiInput,
    pub buffer: Option<f64>,
    pub variables: Option<Vec<String>>,
    pub quality: Option<Vec<String>>,
    #[serde(alias = "gap")]
    pub gap_fill: Option<usize>,
    pub win_raw: Option<usize>,
    pub win_daily: Option<usize>,
    pub poly: Option<usize>,
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "active", "engine": "axum" }))
}

/// POST /api/timeseries/json
///
/// Reconstruct daily velocity traces for every site in `roi`.
pub async fn extract_timeseries(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TimeseriesRequest>,
) -> HandlerResult<BTreeMap<String, SiteOutcome>> {
    let defaults = &state.defaults;
    let buffer = body
        .buffer
        .filter(|b| b.is_finite())
        .unwrap_or(defaults.buffer);
    let sites = resolve_sites(&body.roi, buffer)?;

    let request = ExtractionRequest {
        variables: body.variables.unwrap_or_else(|| defaults.variables.clone()),
        qualities: body.quality.unwrap_or_else(|| defaults.quality.clone()),
        params: ReconstructionParams {
            gap_fill: body.gap_fill.unwrap_or(defaults.gap_fill),
            win_raw: body.win_raw.unwrap_or(defaults.win_raw),
            win_daily: body.win_daily.unwrap_or(defaults.win_daily),
            poly: body.poly.unwrap_or(defaults.poly),
        },
    };
    tracing::info!(
        sites = sites.len(),
        channels = ?request.channel_keys(),
        "Timeseries request"
    );

    let service = state.extraction_service.clone();
    let results = tokio::task::spawn_blocking(move || service.reconstruct(&sites, &request))
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))??;

    Ok(Json(results))
}
