//! Segmentation primitives for scalar surfaces.
//!
//! Converts a grayscale surface in \[0,1\] into a binary mask: automatic
//! threshold selection with Otsu's method, threshold application, a 3x3
//! median smooth, and single-pass binary erosion.
//!
//! # Otsu Thresholding
//! Automatic threshold selection maximizing between-class variance, which
//! separates active (contracting) regions from the quiescent background of
//! an entropy surface.

use ndarray::{Array2, ArrayView2};

/// Compute the optimal threshold for a \[0,1\] surface using Otsu's method.
///
/// # Algorithm
/// 1. Build a 256-bin intensity histogram
/// 2. For each candidate threshold, compute between-class variance
/// 3. Return the threshold maximizing that variance
///
/// # Arguments
/// * `surface` - Input surface with values in \[0,1\] (values are clamped)
///
/// # Returns
/// Threshold in \[0,1\].
pub fn otsu_threshold(surface: &ArrayView2<f64>) -> f64 {
    let mut histogram = [0usize; 256];
    let total = surface.len() as f64;

    for &value in surface.iter() {
        let bin = (value.clamp(0.0, 1.0) * 255.0) as usize;
        histogram[bin] += 1;
    }

    let mut weighted_total = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        weighted_total += i as f64 * count as f64;
    }

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = 0.0;

    for (i, &count) in histogram.iter().enumerate() {
        weight_b += count as f64;
        if weight_b.abs() < f64::EPSILON {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f.abs() < f64::EPSILON {
            break;
        }

        sum_b += i as f64 * count as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (weighted_total - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = i as f64;
        }
    }

    threshold / 255.0
}

/// Apply a binary threshold: true for values >= `threshold`.
pub fn apply_threshold(surface: &ArrayView2<f64>, threshold: f64) -> Array2<bool> {
    surface.mapv(|v| v >= threshold)
}

/// Smooth a surface with a 3x3 median filter.
///
/// Border pixels use the clamped neighborhood (edge replication), so the
/// output has the same shape as the input. Knocks down isolated single-cell
/// spikes before thresholding, the way the original pipeline median-blurred
/// the temporal surface.
pub fn median_smooth_3x3(surface: &ArrayView2<f64>) -> Array2<f64> {
    let (height, width) = surface.dim();
    let mut out = Array2::zeros((height, width));
    let mut neighborhood = [0.0f64; 9];

    for row in 0..height {
        for col in 0..width {
            let mut n = 0;
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let r = (row as i64 + dr).clamp(0, height as i64 - 1) as usize;
                    let c = (col as i64 + dc).clamp(0, width as i64 - 1) as usize;
                    neighborhood[n] = surface[[r, c]];
                    n += 1;
                }
            }
            neighborhood.sort_by(|a, b| a.partial_cmp(b).unwrap());
            out[[row, col]] = neighborhood[4];
        }
    }

    out
}

/// Erode a binary mask once with a 3x3 structuring element.
///
/// A pixel survives only if its full 3x3 neighborhood is set; neighborhoods
/// extending past the border count as unset, so border pixels erode away.
pub fn erode_3x3(mask: &ArrayView2<bool>) -> Array2<bool> {
    let (height, width) = mask.dim();
    let mut out = Array2::from_elem((height, width), false);

    for row in 1..height.saturating_sub(1) {
        for col in 1..width.saturating_sub(1) {
            let mut keep = true;
            'probe: for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let r = (row as i64 + dr) as usize;
                    let c = (col as i64 + dc) as usize;
                    if !mask[[r, c]] {
                        keep = false;
                        break 'probe;
                    }
                }
            }
            out[[row, col]] = keep;
        }
    }

    out
}
