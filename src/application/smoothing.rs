// Savitzky-Golay smoothing with adaptive window clamping
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmoothingError {
    #[error("window length {0} must be odd")]
    EvenWindow(usize),

    #[error("polynomial order {poly} must be less than window length {window}")]
    OrderTooHigh { poly: usize, window: usize },

    #[error("window length {window} exceeds series length {len}")]
    WindowTooLong { window: usize, len: usize },

    #[error("least-squares fit is singular")]
    Singular,
}

/// Largest odd window <= min(requested, available), or `None` when that
/// falls below 3 and no smoothing should happen.
pub fn effective_window(requested: usize, available: usize) -> Option<usize> {
    let mut window = requested.min(available);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    (window >= 3).then_some(window)
}

/// Savitzky-Golay filter: each point is replaced by the value at its
/// position of a least-squares polynomial of order `poly` fitted over a
/// centred window. The first and last `window / 2` points are evaluated on
/// the polynomial fitted to the first and last full window.
pub fn savgol(values: &[f64], window: usize, poly: usize) -> Result<Vec<f64>, SmoothingError> {
    if window % 2 == 0 {
        return Err(SmoothingError::EvenWindow(window));
    }
    if poly >= window {
        return Err(SmoothingError::OrderTooHigh { poly, window });
    }
    let n = values.len();
    if window > n {
        return Err(SmoothingError::WindowTooLong { window, len: n });
    }

    let half = window / 2;
    let position = |i: usize| i as f64 - half as f64;

    // Vandermonde matrix over centred positions; its pseudo-inverse maps a
    // window of samples onto polynomial coefficients.
    let design = DMatrix::from_fn(window, poly + 1, |i, j| position(i).powi(j as i32));
    let fit = design
        .pseudo_inverse(1e-12)
        .map_err(|_| SmoothingError::Singular)?;

    let mut out = vec![f64::NAN; n];

    for (k, slot) in out.iter_mut().enumerate().take(n - half).skip(half) {
        let samples = &values[k - half..=k + half];
        *slot = fit.row(0).iter().zip(samples).map(|(c, v)| c * v).sum();
    }

    let head = &fit * DVector::from_column_slice(&values[..window]);
    for (j, slot) in out.iter_mut().enumerate().take(half) {
        *slot = eval_poly(head.as_slice(), position(j));
    }

    let tail = &fit * DVector::from_column_slice(&values[n - window..]);
    for j in window - half..window {
        out[n - window + j] = eval_poly(tail.as_slice(), position(j));
    }

    Ok(out)
}

fn eval_poly(coeffs: &[f64], t: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
}
