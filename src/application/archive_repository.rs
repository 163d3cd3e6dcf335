// Repository traits for read-only velocity archive access
use crate::infrastructure::config::RegionConfig;
use chrono::NaiveDateTime;
use ndarray::ArrayView3;
use std::sync::Arc;

/// Auxiliary channels every extraction reads alongside the requested ones.
pub const U_ERR_ROCK: &str = "u_err_rock";
pub const U_ERR_OFF_ICE: &str = "u_err_off_ice";
pub const V_ERR_ROCK: &str = "v_err_rock";
pub const V_ERR_OFF_ICE: &str = "v_err_off_ice";
pub const TIME_SEPARATION: &str = "time_separation";

pub const AUXILIARY_CHANNELS: [&str; 5] = [
    U_ERR_ROCK,
    U_ERR_OFF_ICE,
    V_ERR_ROCK,
    V_ERR_OFF_ICE,
    TIME_SEPARATION,
];

/// A gridded, time-indexed store of velocity measurements in its native CRS.
pub trait VelocityArchive: Send + Sync {
    /// Cell-centre x coordinates (metres)
    fn x(&self) -> &[f64];

    /// Cell-centre y coordinates (metres), ascending or descending
    fn y(&self) -> &[f64];

    /// Time index, sorted ascending
    fn times(&self) -> &[NaiveDateTime];

    /// Channel cube indexed (time, y, x); NaN marks missing data
    fn channel(&self, name: &str) -> Option<ArrayView3<'_, f64>>;
}

/// Opens archives for configured regions.
pub trait ArchiveProvider: Send + Sync {
    fn open(&self, region: &RegionConfig) -> anyhow::Result<Arc<dyn VelocityArchive>>;
}
