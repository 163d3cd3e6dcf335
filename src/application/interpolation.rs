// Gap bridging on an evenly spaced daily series

/// Linear interpolation through NaN runs, filling at most `limit` days of
/// each run counted forward from its last valid value. Trailing runs repeat
/// the last value; leading runs stay NaN.
pub fn bridge_gaps(values: &[f64], limit: usize) -> Vec<f64> {
    interpolate(values, limit, false)
}

/// Interpolate every NaN: interior runs linearly, both edges held at the
/// nearest valid value. All-NaN input is returned unchanged.
pub fn fill_all(values: &[f64]) -> Vec<f64> {
    interpolate(values, usize::MAX, true)
}

fn interpolate(values: &[f64], limit: usize, fill_leading: bool) -> Vec<f64> {
    let mut out = values.to_vec();
    let valid: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (valid.first(), valid.last()) else {
        return out;
    };

    if fill_leading {
        out[..first].fill(values[first]);
    }

    for pair in valid.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b - a) as f64;
        let (va, vb) = (values[a], values[b]);
        for k in 1..(b - a).min(limit.saturating_add(1)) {
            out[a + k] = va + (vb - va) * (k as f64 / span);
        }
    }

    let tail_end = last.saturating_add(1).saturating_add(limit).min(values.len());
    out[last + 1..tail_end].fill(values[last]);

    out
}
