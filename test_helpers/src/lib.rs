//! Test helpers for the kymo workspace.
//!
//! Synthetic image-stack builders shared by integration tests. None of this
//! aims for biological realism; the stacks only exist so the pipeline can be
//! exercised end to end with known active and quiescent regions.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use shared::frame::FrameView;

/// Configuration for synthetic stack generation.
#[derive(Debug, Clone)]
pub struct SyntheticStackConfig {
    pub width: usize,
    pub height: usize,
    pub frames: usize,
    /// Standard deviation of per-pixel Gaussian read noise (0 disables).
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticStackConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            frames: 8,
            noise_std: 0.0,
            seed: 42,
        }
    }
}

fn add_noise(image: &mut Array2<f64>, noise_std: f64, rng: &mut ChaCha8Rng) {
    if noise_std <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0, noise_std).expect("positive std");
    for value in image.iter_mut() {
        *value += normal.sample(rng);
    }
}

fn quantize(image: &Array2<f64>) -> FrameView {
    let bytes = image.mapv(|v| v.clamp(0.0, 255.0).round() as u8);
    FrameView::from_array(&bytes).expect("non-zero dimensions")
}

/// A stack whose centered square region pulses in intensity frame to frame
/// while the background stays fixed.
///
/// The pulsing region mimics a contracting cell body: voxels inside it see
/// large frame-to-frame change, voxels outside see none.
pub fn pulsing_square_stack(config: &SyntheticStackConfig, square_size: usize) -> Vec<FrameView> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let top = config.height.saturating_sub(square_size) / 2;
    let left = config.width.saturating_sub(square_size) / 2;

    (0..config.frames)
        .map(|t| {
            let phase = (t as f64 * std::f64::consts::PI / 2.0).sin();
            let level = 130.0 + 90.0 * phase;
            let mut image = Array2::from_elem((config.height, config.width), 30.0);
            for row in top..(top + square_size).min(config.height) {
                for col in left..(left + square_size).min(config.width) {
                    image[[row, col]] = level;
                }
            }
            add_noise(&mut image, config.noise_std, &mut rng);
            quantize(&image)
        })
        .collect()
}

/// A stack of identical frames (no motion anywhere).
pub fn static_stack(config: &SyntheticStackConfig) -> Vec<FrameView> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut image = Array2::from_elem((config.height, config.width), 90.0);
    add_noise(&mut image, config.noise_std, &mut rng);
    let frame = quantize(&image);
    vec![frame; config.frames]
}

/// A stack of independent uniformly random frames (motion everywhere).
pub fn random_stack(config: &SyntheticStackConfig) -> Vec<FrameView> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    (0..config.frames)
        .map(|_| {
            let data: Vec<u8> = (0..config.width * config.height)
                .map(|_| rng.gen())
                .collect();
            FrameView::from_vec(data, config.width, config.height).expect("non-zero dimensions")
        })
        .collect()
}
