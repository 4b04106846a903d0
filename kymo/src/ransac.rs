//! Robust threshold estimation over the lattice point cloud.
//!
//! Fits the dominant plane of the `(column, row, entropy)` cloud with
//! RANSAC. The plane tracks the quiescent background level of the entropy
//! surface even when active regions skew the distribution; the robust
//! threshold sits three inlier standard deviations above it.

use nalgebra::{Matrix3, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A fitted plane `z = a*x + b*y + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    /// Plane height at `(x, y)`.
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }
}

/// Result of a robust plane fit.
#[derive(Debug, Clone)]
pub struct RobustFit {
    pub plane: Plane,
    /// Indices of cloud points within epsilon of the plane.
    pub inliers: Vec<usize>,
}

/// Solves the exact plane through three points, or None when they are
/// collinear (singular system).
fn plane_through(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Plane> {
    let coefficients = Matrix3::new(
        p0.x, p0.y, 1.0, //
        p1.x, p1.y, 1.0, //
        p2.x, p2.y, 1.0,
    );
    let rhs = Vector3::new(p0.z, p1.z, p2.z);
    let solution = coefficients.lu().solve(&rhs)?;
    let plane = Plane {
        a: solution[0],
        b: solution[1],
        c: solution[2],
    };
    if plane.a.is_finite() && plane.b.is_finite() && plane.c.is_finite() {
        Some(plane)
    } else {
        None
    }
}

/// RANSAC fit of the dominant plane of a point cloud.
///
/// Deterministic for a fixed seed. NaN points (failed lattice cells) are
/// ignored. Returns None when fewer than three finite points exist or no
/// sampled triple spans a plane.
pub fn fit_dominant_plane(
    cloud: &[Point3<f64>],
    iterations: usize,
    epsilon: f64,
    seed: u64,
) -> Option<RobustFit> {
    let candidates: Vec<usize> = (0..cloud.len()).filter(|&i| cloud[i].z.is_finite()).collect();
    if candidates.len() < 3 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<RobustFit> = None;

    for _ in 0..iterations {
        let i = candidates[rng.gen_range(0..candidates.len())];
        let j = candidates[rng.gen_range(0..candidates.len())];
        let k = candidates[rng.gen_range(0..candidates.len())];
        if i == j || j == k || i == k {
            continue;
        }
        let Some(plane) = plane_through(&cloud[i], &cloud[j], &cloud[k]) else {
            continue;
        };

        let inliers: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&index| {
                let point = &cloud[index];
                (point.z - plane.height_at(point.x, point.y)).abs() <= epsilon
            })
            .collect();

        let better = match &best {
            Some(current) => inliers.len() > current.inliers.len(),
            None => true,
        };
        if better {
            best = Some(RobustFit { plane, inliers });
        }
    }

    best
}

/// Robust threshold for binarizing the entropy surface.
///
/// The dominant plane models the quiescent background; the threshold is the
/// mean inlier height plus three inlier standard deviations. Degenerate
/// clouds fall back to the median finite z.
pub fn robust_threshold(
    cloud: &[Point3<f64>],
    iterations: usize,
    epsilon: f64,
    seed: u64,
) -> Option<f64> {
    let finite: Vec<f64> = cloud.iter().map(|p| p.z).filter(|z| z.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }

    if let Some(fit) = fit_dominant_plane(cloud, iterations, epsilon, seed) {
        if fit.inliers.len() >= 3 {
            let heights: Vec<f64> = fit
                .inliers
                .iter()
                .map(|&index| cloud[index].z)
                .collect();
            let n = heights.len() as f64;
            let mean = heights.iter().sum::<f64>() / n;
            let variance = heights.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n;
            return Some(mean + 3.0 * variance.sqrt());
        }
    }

    // Median fallback
    let mut sorted = finite;
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(sorted[sorted.len() / 2])
}
