//! Synthetic frame generation for tests.
//!
//! Deterministic frames used to validate the correlation kernel and the
//! similarity pipeline: centered Gaussian blobs of configurable width and
//! seeded uniform-random fills.

use crate::frame::FrameView;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A square frame holding a centered Gaussian blob.
///
/// Peak value 255 at the center, falling off with the given sigma; values
/// are rounded to the nearest 8-bit level. Two blobs of different sigma
/// correlate the less the further their widths are apart, which makes these
/// frames convenient ordering fixtures.
pub fn gaussian_frame(size: usize, sigma: f64) -> FrameView {
    let center = (size as f64 - 1.0) / 2.0;
    let mut data = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f64 - center;
            let dy = y as f64 - center;
            let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            data.push((g * 255.0).round().min(255.0) as u8);
        }
    }
    FrameView::from_vec(data, size, size).expect("non-zero size")
}

/// A frame of uniformly random pixels from a seeded generator.
pub fn random_frame(width: usize, height: usize, seed: u64) -> FrameView {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<u8> = (0..width * height).map(|_| rng.gen()).collect();
    FrameView::from_vec(data, width, height).expect("non-zero size")
}

/// A frame where a centered square region has a distinct value.
///
/// Useful for building stacks in which only one region changes over time.
pub fn square_frame(
    width: usize,
    height: usize,
    background: u8,
    square_value: u8,
    square_size: usize,
) -> FrameView {
    let mut image = Array2::from_elem((height, width), background);
    let top = (height.saturating_sub(square_size)) / 2;
    let left = (width.saturating_sub(square_size)) / 2;
    for row in top..(top + square_size).min(height) {
        for col in left..(left + square_size).min(width) {
            image[[row, col]] = square_value;
        }
    }
    FrameView::from_array(&image).expect("non-zero size")
}
