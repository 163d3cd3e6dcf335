// Error combination - fuses the two per-axis error estimators into one magnitude
use crate::application::archive_repository::{U_ERR_OFF_ICE, U_ERR_ROCK, V_ERR_OFF_ICE, V_ERR_ROCK};
use crate::domain::observation::{ObservationTable, nan_median};

pub const ERROR_COLUMN: &str = "error_m_yr";

/// Add the combined error magnitude column to `table`.
pub fn attach_error(mut table: ObservationTable) -> ObservationTable {
    let u = merge_axis(column(&table, U_ERR_ROCK), column(&table, U_ERR_OFF_ICE));
    let v = merge_axis(column(&table, V_ERR_ROCK), column(&table, V_ERR_OFF_ICE));
    let magnitude = u.iter().zip(&v).map(|(u, v)| u.hypot(*v)).collect();
    table.insert_column(ERROR_COLUMN, magnitude);
    table
}

fn column(table: &ObservationTable, name: &str) -> Vec<f64> {
    table
        .column(name)
        .map(<[f64]>::to_vec)
        .unwrap_or_else(|| vec![f64::NAN; table.len()])
}

/// Primary where present, else fallback, else zero; zeros are then replaced
/// by the median of the nonzero values.
///
/// Known approximation: an exactly-zero error is read as "not computed", so
/// a true zero-uncertainty measurement would be overwritten too.
pub fn merge_axis(primary: Vec<f64>, fallback: Vec<f64>) -> Vec<f64> {
    let merged: Vec<f64> = primary
        .into_iter()
        .zip(fallback)
        .map(|(p, f)| match (p.is_nan(), f.is_nan()) {
            (false, _) => p,
            (true, false) => f,
            (true, true) => 0.0,
        })
        .collect();

    let fill = nan_median(merged.iter().copied().filter(|v| *v != 0.0));
    if fill.is_nan() {
        return merged;
    }
    merged
        .into_iter()
        .map(|v| if v == 0.0 { fill } else { v })
        .collect()
}
