//! Normalized cross-correlation kernel.
//!
//! The single inner-loop hot path of the engine: accumulate integer moments
//! over two equally-sized pixel windows, then reduce them to a correlation
//! coefficient in `[-1, 1]`.
//!
//! # Accumulator widths
//!
//! Pixels are 8-bit. For a 640x480 window the raw sums reach ~10^8 and the
//! squared sums ~2x10^10, so the moments themselves fit comfortably in u64.
//! The reduction terms `n*sum_aa` and `sum_a^2` reach ~6x10^15 and are
//! computed in u128/i128 before conversion to f64.

use crate::frame::FrameView;
use thiserror::Error;

/// Errors produced by the correlation kernel.
#[derive(Error, Debug)]
pub enum CorrelationError {
    /// The two windows do not share the same dimensions.
    #[error("window dimensions mismatch: {a_width}x{a_height} vs {b_width}x{b_height}")]
    DimensionMismatch {
        a_width: usize,
        a_height: usize,
        b_width: usize,
        b_height: usize,
    },
}

/// Raw correlation moments over a pair of windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrelationMoments {
    /// Number of pixel pairs accumulated.
    pub n: u64,
    /// Sum of pixels of the first window.
    pub sum_a: u64,
    /// Sum of pixels of the second window.
    pub sum_b: u64,
    /// Sum of squared pixels of the first window.
    pub sum_aa: u64,
    /// Sum of squared pixels of the second window.
    pub sum_bb: u64,
    /// Sum of pixel products.
    pub sum_ab: u64,
}

/// Accumulates correlation moments over two equally-sized windows.
///
/// Pure read over the two byte buffers; fails with
/// [`CorrelationError::DimensionMismatch`] when the windows differ in size.
pub fn compute_moments(
    a: &FrameView,
    b: &FrameView,
) -> Result<CorrelationMoments, CorrelationError> {
    if !a.same_dims(b) {
        return Err(CorrelationError::DimensionMismatch {
            a_width: a.width(),
            a_height: a.height(),
            b_width: b.width(),
            b_height: b.height(),
        });
    }

    let mut m = CorrelationMoments::default();
    for y in 0..a.height() {
        let row_a = a.row(y);
        let row_b = b.row(y);
        for (&pa, &pb) in row_a.iter().zip(row_b.iter()) {
            let pa = pa as u64;
            let pb = pb as u64;
            m.sum_a += pa;
            m.sum_b += pb;
            m.sum_aa += pa * pa;
            m.sum_bb += pb * pb;
            m.sum_ab += pa * pb;
        }
        m.n += a.width() as u64;
    }
    Ok(m)
}

/// Reduces moments to a normalized cross-correlation coefficient.
///
/// `r = (n*sum_ab - sum_a*sum_b) / sqrt((n*sum_aa - sum_a^2)(n*sum_bb - sum_b^2))`
///
/// Two degenerate cases are resolved exactly on the integer moments: two
/// constant windows with identical moments correlate at `1.0` (a perfect
/// match with gain), while a vanishing denominator with differing windows
/// yields `0.0`.
pub fn coefficient(m: &CorrelationMoments) -> f64 {
    let n = m.n as i128;
    let energy_a = n * m.sum_aa as i128 - (m.sum_a as i128) * (m.sum_a as i128);
    let energy_b = n * m.sum_bb as i128 - (m.sum_b as i128) * (m.sum_b as i128);

    if energy_a == 0 || energy_b == 0 {
        let identical = m.sum_aa == m.sum_bb && m.sum_a == m.sum_b;
        return if energy_a == 0 && energy_b == 0 && identical {
            1.0
        } else {
            0.0
        };
    }

    let numerator = n * m.sum_ab as i128 - (m.sum_a as i128) * (m.sum_b as i128);
    let r = numerator as f64 / ((energy_a as f64) * (energy_b as f64)).sqrt();
    r.clamp(-1.0, 1.0)
}

/// Moment accumulation and reduction in one call.
pub fn correlate(a: &FrameView, b: &FrameView) -> Result<f64, CorrelationError> {
    Ok(coefficient(&compute_moments(a, b)?))
}
