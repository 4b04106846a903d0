//! Temporal self-similarity surface assembly.
//!
//! Reshapes a row-major entropy vector into the 2-D lattice surface,
//! normalizes it, smooths it, and binarizes it with a combined Otsu +
//! robust threshold. The binary mask is eroded once to drop single-cell
//! responses before downstream motion analysis consumes it.

use crate::error::KymoError;
use ndarray::Array2;
use shared::segmentation::{erode_3x3, median_smooth_3x3, otsu_threshold};
use std::path::Path;
use tracing::{debug, warn};

/// A temporal surface with its binarization.
#[derive(Debug, Clone)]
pub struct SurfaceResult {
    /// Normalized entropy surface in \[0,1\], lattice resolution.
    pub surface: Array2<f64>,
    /// Eroded binary mask of active cells.
    pub mask: Array2<bool>,
    /// The threshold that produced the mask.
    pub threshold: f64,
}

/// Reshapes a row-major entropy vector into a `(height, width)` surface.
///
/// Failed lattice cells (NaN) read as quiescent. Fails when the vector
/// length disagrees with the lattice extent.
pub fn reshape_entropies(
    entropies: &[f64],
    lattice_width: usize,
    lattice_height: usize,
) -> Result<Array2<f64>, KymoError> {
    if entropies.len() != lattice_width * lattice_height {
        return Err(KymoError::InvalidGeometry(format!(
            "entropy vector of {} elements cannot fill a {lattice_width}x{lattice_height} lattice",
            entropies.len()
        )));
    }
    let cleaned: Vec<f64> = entropies
        .iter()
        .map(|&value| if value.is_finite() { value } else { 0.0 })
        .collect();
    let nan_cells = entropies.iter().filter(|v| !v.is_finite()).count();
    if nan_cells > 0 {
        warn!(nan_cells, "entropy surface has failed cells, reading as quiescent");
    }
    Array2::from_shape_vec((lattice_height, lattice_width), cleaned)
        .map_err(|err| KymoError::InvalidGeometry(err.to_string()))
}

/// Min-max normalizes a surface to \[0,1\]. A flat surface maps to zeros.
pub fn normalize_surface(surface: &Array2<f64>) -> Array2<f64> {
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for &value in surface.iter() {
        low = low.min(value);
        high = high.max(value);
    }
    let range = high - low;
    if !range.is_finite() || range <= f64::EPSILON {
        return Array2::zeros(surface.dim());
    }
    surface.mapv(|value| (value - low) / range)
}

/// Binarizes a normalized surface with the given threshold and erodes the
/// mask once with a 3x3 structuring element.
///
/// Cells must be strictly above the threshold, so a threshold sitting on
/// the background level keeps the background dark.
pub fn binarize(surface: &Array2<f64>, threshold: f64) -> Array2<bool> {
    let mask = surface.mapv(|value| value > threshold);
    erode_3x3(&mask.view())
}

/// Smooths a normalized surface with a 3x3 median filter.
pub fn smooth(surface: &Array2<f64>) -> Array2<f64> {
    median_smooth_3x3(&surface.view())
}

/// Otsu threshold of a normalized surface.
pub fn surface_otsu(surface: &Array2<f64>) -> f64 {
    otsu_threshold(&surface.view())
}

/// Writes the surface as an 8-bit grayscale PNG.
///
/// Best-effort: failures are logged and reported as false, never
/// propagated. Persistence is a debugging aid, not a pipeline stage.
pub fn persist_surface(surface: &Array2<f64>, path: &Path) -> bool {
    let (height, width) = surface.dim();
    if height == 0 || width == 0 {
        return false;
    }
    let mut img = image::GrayImage::new(width as u32, height as u32);
    for ((row, col), &value) in surface.indexed_iter() {
        let level = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        img.put_pixel(col as u32, row as u32, image::Luma([level]));
    }
    match img.save(path) {
        Ok(()) => {
            debug!(path = %path.display(), "temporal surface persisted");
            true
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to persist temporal surface");
            false
        }
    }
}
