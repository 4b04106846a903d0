use serde::{Deserialize, Serialize};

/// Configuration for the self-similarity engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the producer's pair-result memo used by sliding updates.
    pub pair_cache_size: usize,
    /// RANSAC iterations for the robust surface threshold.
    pub ransac_iterations: usize,
    /// Inlier distance (in normalized entropy units) for the RANSAC plane.
    pub ransac_epsilon: f64,
    /// Seed for the RANSAC sampler; fixed for reproducible thresholds.
    pub ransac_seed: u64,
    /// Write a grayscale PNG of the temporal surface next to the cache file.
    pub persist_surface: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pair_cache_size: 64,
            ransac_iterations: 256,
            ransac_epsilon: 0.05,
            ransac_seed: 42,
            persist_surface: false,
        }
    }
}
