// Reconstructed per-site output records
use super::geometry::GeometryKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tuning knobs of the temporal reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionParams {
    /// Longest run of missing days bridged by interpolation.
    #[serde(rename = "gap")]
    pub gap_fill: usize,
    pub win_raw: usize,
    pub win_daily: usize,
    pub poly: usize,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            gap_fill: 24,
            win_raw: 25,
            win_daily: 25,
            poly: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelTraces {
    pub raw: Vec<Option<f64>>,
    pub trend: Vec<Option<f64>>,
}

/// Arrays aligned to the site's daily axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSeries {
    pub dates: Vec<String>,
    pub error: Vec<Option<f64>>,
    pub dt: Vec<Option<f64>>,
    pub count: Vec<u32>,
    #[serde(flatten)]
    pub channels: BTreeMap<String, ChannelTraces>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMeta {
    pub site_name: String,
    pub region: String,
    pub buffer_used: f64,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub variables: Vec<String>,
    pub quality: Vec<String>,
    pub params: ReconstructionParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SiteOutcome {
    Success { data: SiteSeries, meta: SiteMeta },
    Error { message: String, meta: SiteMeta },
}

impl SiteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SiteOutcome::Success { .. })
    }
}

/// Round half-to-even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Round to one decimal; non-finite values become null.
pub fn round_trace(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&v| {
            let r = round_to(v, 1);
            r.is_finite().then_some(r)
        })
        .collect()
}
