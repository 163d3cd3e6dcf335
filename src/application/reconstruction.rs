// Temporal reconstruction - irregular observations to dense daily raw and trend traces
use crate::application::interpolation::{bridge_gaps, fill_all};
use crate::application::smoothing::{SmoothingError, effective_window, savgol};
use crate::domain::observation::{DailyAxis, nan_median};
use crate::domain::record::ReconstructionParams;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

const MS_PER_DAY: f64 = 86_400_000.0;

/// One channel of merged observations, sorted by time.
#[derive(Debug, Clone, Copy)]
pub struct ChannelObservations<'a> {
    pub times: &'a [NaiveDateTime],
    pub values: &'a [f64],
    /// Real-world duration of each observation, in days
    pub spans: &'a [f64],
}

/// Daily traces for one channel, NaN where no value exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReconstruction {
    pub raw: Vec<f64>,
    pub trend: Vec<f64>,
}

pub fn reconstruct_channel(
    axis: &DailyAxis,
    obs: ChannelObservations<'_>,
    params: &ReconstructionParams,
) -> ChannelReconstruction {
    // Raw: bridge, smooth, then keep only true observation days.
    let daily = axis.reindex(obs.times, obs.values);
    let bridged = bridge_gaps(&daily, params.gap_fill);
    let observed = axis.observed_mask(obs.times);
    let raw = match smooth(&bridged, params.win_raw, params.poly) {
        Some(smoothed) => mask(&smoothed, |i| observed[i]),
        None => daily,
    };

    // Trend: spread each observation over its acquisition interval first.
    let redistributed = redistribute(axis, obs, &raw);
    let bridged = bridge_gaps(&redistributed, params.gap_fill);
    let trend = match smooth(&bridged, params.win_daily, params.poly) {
        Some(smoothed) => mask(&smoothed, |i| !bridged[i].is_nan()),
        None => bridged,
    };

    ChannelReconstruction { raw, trend }
}

/// Fill every gap of the bridged series and run the smoother over it.
/// `None` when the series is too short or the fit is infeasible.
fn smooth(bridged: &[f64], requested: usize, poly: usize) -> Option<Vec<f64>> {
    let Some(window) = effective_window(requested, bridged.len()) else {
        tracing::debug!(
            requested,
            len = bridged.len(),
            "Series too short to smooth, passing through"
        );
        return None;
    };

    match savgol(&fill_all(bridged), window, poly) {
        Ok(smoothed) => Some(smoothed),
        Err(e @ SmoothingError::OrderTooHigh { .. }) | Err(e @ SmoothingError::Singular) => {
            tracing::warn!(error = %e, "Smoothing skipped");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "Smoothing skipped");
            None
        }
    }
}

fn mask(values: &[f64], keep: impl Fn(usize) -> bool) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| if keep(i) { v } else { f64::NAN })
        .collect()
}

/// Calendar days [floor(t - span/2), ceil(t + span/2)] an observation
/// represents. Non-finite, negative or unrepresentably long spans count as
/// instantaneous.
pub fn coverage_days(time: NaiveDateTime, span_days: f64) -> (NaiveDate, NaiveDate) {
    let half = half_span(time, span_days);

    let start = (time - half).date();
    let end = time + half;
    let end = if end.time() == NaiveTime::MIN {
        end.date()
    } else {
        end.date() + Days::new(1)
    };
    (start, end)
}

/// Half of the span, zero when the interval around `time` would leave the
/// calendar range.
fn half_span(time: NaiveDateTime, span_days: f64) -> TimeDelta {
    if !(span_days.is_finite() && span_days > 0.0) {
        return TimeDelta::zero();
    }
    TimeDelta::try_milliseconds((span_days * MS_PER_DAY / 2.0).round() as i64)
        .filter(|half| {
            time.checked_sub_signed(*half).is_some()
                && time
                    .checked_add_signed(*half)
                    .and_then(|end| end.date().checked_add_days(Days::new(1)))
                    .is_some()
        })
        .unwrap_or_else(|| {
            tracing::debug!(span_days, "Span out of calendar range, treated as instantaneous");
            TimeDelta::zero()
        })
}

/// Daily median across copies of every observation's value spread over the
/// days it covers. The smoothed raw value is used where it exists.
pub fn redistribute(axis: &DailyAxis, obs: ChannelObservations<'_>, raw: &[f64]) -> Vec<f64> {
    let mut stacks: Vec<Vec<f64>> = vec![Vec::new(); axis.len()];

    for ((&time, &value), &span) in obs.times.iter().zip(obs.values).zip(obs.spans) {
        if value.is_nan() {
            continue;
        }
        let value = axis
            .index_of(time.date())
            .map(|i| raw[i])
            .filter(|v| !v.is_nan())
            .unwrap_or(value);

        let (start, end) = coverage_days(time, span);
        let first = axis.offset(start).max(0);
        let last = axis.offset(end).min(axis.len() as i64 - 1);
        for day in first..=last {
            stacks[day as usize].push(value);
        }
    }

    stacks.into_iter().map(nan_median).collect()
}
