//! Pipeline orchestration.
//!
//! Sequences the voxel pipeline: cache lookup, lattice generation, cache
//! fill, and listener notification with the resulting entropy vector; the
//! complementary surface path binarizes the entropy surface with a combined
//! Otsu + robust threshold and notifies surface listeners.

use crate::callback::{CallbackId, CallbackRegistry, ProcessorCallback, ProcessorEvent};
use crate::config::EngineConfig;
use crate::error::KymoError;
use crate::ransac::robust_threshold;
use crate::surface::{
    binarize, normalize_surface, persist_surface, reshape_entropies, smooth, surface_otsu,
    SurfaceResult,
};
use crate::voxel::{generate_lattice, LatticeGeometry};
use nalgebra::Point3;
use shared::frame::FrameView;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates voxel self-similarity generation over an image stack.
///
/// One processor instance owns one cache path; concurrent instances
/// targeting the same path are not guarded against and must be serialized
/// by the caller. Invocations are serial; listeners are notified
/// synchronously, exactly once per invocation.
pub struct VoxelSelfSimilarity {
    geometry: LatticeGeometry,
    config: EngineConfig,
    cache_file: Option<PathBuf>,
    callbacks: CallbackRegistry,
    entropies: Vec<f64>,
    cloud: Vec<Point3<f64>>,
}

impl VoxelSelfSimilarity {
    pub fn new(geometry: LatticeGeometry, config: EngineConfig) -> Self {
        Self {
            geometry,
            config,
            cache_file: None,
            callbacks: CallbackRegistry::new(),
            entropies: Vec::new(),
            cloud: Vec::new(),
        }
    }

    /// Sets the cache file for this processor's (stack, geometry)
    /// combination. The path is chosen and owned by the embedding
    /// application.
    pub fn set_cache_file(&mut self, path: Option<PathBuf>) {
        self.cache_file = path;
    }

    /// Registers a listener for processor events.
    pub fn register_callback(&mut self, callback: ProcessorCallback) -> CallbackId {
        self.callbacks.register(callback)
    }

    /// Removes a listener.
    pub fn unregister_callback(&mut self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// Lattice geometry currently in effect.
    pub fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    /// Changes the voxel footprint before the next generation run.
    pub fn set_sample(&mut self, sample_x: usize, sample_y: usize) -> Result<(), KymoError> {
        self.geometry.set_sample(sample_x, sample_y)
    }

    /// The most recently produced entropy vector.
    pub fn entropies(&self) -> &[f64] {
        &self.entropies
    }

    /// The most recently produced lattice point cloud.
    pub fn cloud(&self) -> &[Point3<f64>] {
        &self.cloud
    }

    /// Runs the voxel pipeline over a stack: cache lookup, lattice
    /// generation on a miss, cache fill, listener notification.
    ///
    /// On a cache hit the entropy vector is delivered without
    /// recomputation. An empty vector after attempting computation on a
    /// genuine stack is a hard error, not a silent delivery.
    pub fn generate_voxels_and_self_similarities(
        &mut self,
        frames: &[FrameView],
    ) -> Result<&[f64], KymoError> {
        if frames.len() < 2 {
            return Err(KymoError::InsufficientFrames { got: frames.len() });
        }
        let (width, height) = frames[0].dims();
        self.geometry.set_frame_size(width, height);
        let expected_len = self.geometry.expected_len();

        if let Some(path) = self.cache_file.as_ref() {
            if let Some(values) = crate::cache::lookup(path, expected_len) {
                info!(path = %path.display(), "entropy cache hit");
                self.entropies = values;
                self.rebuild_cloud();
                self.callbacks.emit(&ProcessorEvent::EntropyReady {
                    entropies: Arc::new(self.entropies.clone()),
                    from_cache: true,
                });
                return Ok(&self.entropies);
            }
        }

        info!(
            frames = frames.len(),
            expected_len, "generating voxel self-similarities"
        );
        let result = generate_lattice(frames, &self.geometry)?;
        if result.is_empty() {
            return Err(KymoError::EmptyResult);
        }

        self.entropies = result.entropies;
        self.cloud = result.cloud;

        if let Some(path) = self.cache_file.as_ref() {
            if crate::cache::store(path, &self.entropies) {
                info!(path = %path.display(), "entropy cache filled");
            } else {
                warn!(path = %path.display(), "entropy cache fill failed, continuing");
            }
        }

        self.callbacks.emit(&ProcessorEvent::EntropyReady {
            entropies: Arc::new(self.entropies.clone()),
            from_cache: false,
        });
        Ok(&self.entropies)
    }

    /// Builds the temporal surface from an entropy vector, binarizes it
    /// with the combined Otsu + robust threshold, erodes the mask, and
    /// notifies surface listeners.
    ///
    /// The vector length must match the current lattice extent. When
    /// surface persistence is enabled, a grayscale PNG is written next to
    /// the cache file.
    pub fn create_voxel_surface(
        &mut self,
        entropies: &[f64],
    ) -> Result<SurfaceResult, KymoError> {
        let (lattice_width, lattice_height) = self.geometry.segmented_size();
        let raw = reshape_entropies(entropies, lattice_width, lattice_height)?;
        let surface = smooth(&normalize_surface(&raw));

        let otsu = surface_otsu(&surface);
        let cloud: Vec<Point3<f64>> = surface
            .indexed_iter()
            .map(|((row, col), &value)| Point3::new(col as f64, row as f64, value))
            .collect();
        let robust = robust_threshold(
            &cloud,
            self.config.ransac_iterations,
            self.config.ransac_epsilon,
            self.config.ransac_seed,
        );

        let threshold = match robust {
            Some(robust) => ((otsu + robust) / 2.0).clamp(0.0, 1.0),
            None => otsu,
        };
        info!(otsu, ?robust, threshold, "binarizing temporal surface");

        let mask = binarize(&surface, threshold);

        if self.config.persist_surface {
            if let Some(dir) = self.cache_file.as_ref().and_then(|p| p.parent()) {
                persist_surface(&surface, &dir.join("voxel_surface.png"));
            }
        }

        let result = SurfaceResult {
            surface,
            mask,
            threshold,
        };
        self.callbacks.emit(&ProcessorEvent::SurfaceReady {
            surface: Arc::new(result.surface.clone()),
            mask: Arc::new(result.mask.clone()),
        });
        Ok(result)
    }

    fn rebuild_cloud(&mut self) {
        let (lattice_width, _) = self.geometry.segmented_size();
        if lattice_width == 0 {
            self.cloud.clear();
            return;
        }
        self.cloud = self
            .entropies
            .iter()
            .enumerate()
            .map(|(index, &entropy)| {
                Point3::new(
                    (index % lattice_width) as f64,
                    (index / lattice_width) as f64,
                    entropy,
                )
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::test_patterns::{random_frame, square_frame};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn pulsing_stack(frames: usize) -> Vec<FrameView> {
        (0..frames)
            .map(|t| square_frame(64, 64, 30, if t % 2 == 0 { 220 } else { 40 }, 16))
            .collect()
    }

    fn temp_cache_file(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("kymo_processor_{tag}_{nanos}.json"))
    }

    #[test]
    fn test_generate_notifies_exactly_once() {
        let mut processor =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        let notifications = Arc::new(AtomicUsize::new(0));
        let notifications_inner = Arc::clone(&notifications);
        processor.register_callback(Arc::new(move |event| {
            if let ProcessorEvent::EntropyReady { entropies, .. } = event {
                assert!(!entropies.is_empty());
                notifications_inner.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let stack = pulsing_stack(4);
        let entropies = processor
            .generate_voxels_and_self_similarities(&stack)
            .unwrap();
        assert!(!entropies.is_empty());
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_hit_skips_recomputation() {
        let cache_file = temp_cache_file("hit");
        let stack = pulsing_stack(4);

        let mut first =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        first.set_cache_file(Some(cache_file.clone()));
        let computed = first
            .generate_voxels_and_self_similarities(&stack)
            .unwrap()
            .to_vec();

        let mut second =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        second.set_cache_file(Some(cache_file.clone()));
        let from_cache = Arc::new(AtomicUsize::new(0));
        let from_cache_inner = Arc::clone(&from_cache);
        second.register_callback(Arc::new(move |event| {
            if let ProcessorEvent::EntropyReady {
                from_cache: true, ..
            } = event
            {
                from_cache_inner.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let cached = second
            .generate_voxels_and_self_similarities(&stack)
            .unwrap();
        assert_eq!(from_cache.load(Ordering::SeqCst), 1);
        for (a, b) in cached.iter().zip(computed.iter()) {
            assert!((a - b).abs() < 1e-10);
        }

        std::fs::remove_file(&cache_file).ok();
    }

    #[test]
    fn test_stale_cache_size_recomputes() {
        let cache_file = temp_cache_file("stale");
        let stack = pulsing_stack(4);

        let mut processor =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        processor.set_cache_file(Some(cache_file.clone()));
        processor
            .generate_voxels_and_self_similarities(&stack)
            .unwrap();

        // Different sample size: the cached length no longer matches, so the
        // processor must recompute rather than misreport stale data.
        processor.set_sample(4, 4).unwrap();
        let recomputed = Arc::new(AtomicUsize::new(0));
        let recomputed_inner = Arc::clone(&recomputed);
        processor.register_callback(Arc::new(move |event| {
            if let ProcessorEvent::EntropyReady {
                from_cache: false, ..
            } = event
            {
                recomputed_inner.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let entropies = processor
            .generate_voxels_and_self_similarities(&stack)
            .unwrap();

        assert_eq!(recomputed.load(Ordering::SeqCst), 1);
        assert_eq!(entropies.len(), processor.geometry().expected_len());

        std::fs::remove_file(&cache_file).ok();
    }

    #[test]
    fn test_insufficient_frames_rejected() {
        let mut processor =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        let stack = pulsing_stack(1);
        assert!(matches!(
            processor.generate_voxels_and_self_similarities(&stack),
            Err(KymoError::InsufficientFrames { got: 1 })
        ));
    }

    #[test]
    fn test_empty_lattice_is_hard_error() {
        let mut processor = VoxelSelfSimilarity::new(
            LatticeGeometry::square(128).unwrap(),
            EngineConfig::default(),
        );
        let stack: Vec<_> = (0..3).map(|i| random_frame(16, 16, i)).collect();
        assert!(matches!(
            processor.generate_voxels_and_self_similarities(&stack),
            Err(KymoError::EmptyResult)
        ));
    }

    #[test]
    fn test_surface_dimensions_and_notification() {
        let mut processor =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        let surfaces = Arc::new(AtomicUsize::new(0));
        let surfaces_inner = Arc::clone(&surfaces);
        processor.register_callback(Arc::new(move |event| {
            if let ProcessorEvent::SurfaceReady { surface, mask } = event {
                assert_eq!(surface.dim(), mask.dim());
                surfaces_inner.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let stack = pulsing_stack(6);
        let entropies = processor
            .generate_voxels_and_self_similarities(&stack)
            .unwrap()
            .to_vec();
        let result = processor.create_voxel_surface(&entropies).unwrap();

        let (lattice_width, lattice_height) = processor.geometry().segmented_size();
        assert_eq!(result.surface.dim(), (lattice_height, lattice_width));
        assert_eq!(surfaces.load(Ordering::SeqCst), 1);
        assert!((0.0..=1.0).contains(&result.threshold));
    }

    #[test]
    fn test_surface_rejects_wrong_length() {
        let mut processor =
            VoxelSelfSimilarity::new(LatticeGeometry::square(8).unwrap(), EngineConfig::default());
        let stack = pulsing_stack(4);
        processor
            .generate_voxels_and_self_similarities(&stack)
            .unwrap();

        assert!(matches!(
            processor.create_voxel_surface(&[0.5; 3]),
            Err(KymoError::InvalidGeometry(_))
        ));
    }
}
