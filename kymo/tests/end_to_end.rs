//! End-to-end pipeline tests: stack in, entropy vector and binarized
//! surface out, with listener notification along the way.

use kymo::{EngineConfig, LatticeGeometry, ProcessorEvent, VoxelSelfSimilarity};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use test_helpers::{pulsing_square_stack, random_stack, static_stack, SyntheticStackConfig};

fn processor(sample: usize) -> VoxelSelfSimilarity {
    VoxelSelfSimilarity::new(
        LatticeGeometry::square(sample).unwrap(),
        EngineConfig::default(),
    )
}

#[test]
fn pulsing_region_dominates_the_surface() {
    let config = SyntheticStackConfig {
        frames: 8,
        ..Default::default()
    };
    let stack = pulsing_square_stack(&config, 24);

    let mut processor = processor(4);
    let entropies = processor
        .generate_voxels_and_self_similarities(&stack)
        .unwrap()
        .to_vec();

    let (lattice_width, lattice_height) = processor.geometry().segmented_size();
    assert_eq!(entropies.len(), lattice_width * lattice_height);

    // Voxels inside the pulsing square out-score the quiescent corners.
    let center_row = lattice_height / 2;
    let center_col = lattice_width / 2;
    let center = entropies[center_row * lattice_width + center_col];
    let corner = entropies[0];
    assert!(
        center > corner + 0.1,
        "center {center} should exceed corner {corner}"
    );

    // Surface and mask share the lattice extent; the eroded mask keeps the
    // pulsing interior and none of the quiescent border.
    let result = processor.create_voxel_surface(&entropies).unwrap();
    assert_eq!(result.surface.dim(), (lattice_height, lattice_width));
    assert_eq!(result.mask.dim(), result.surface.dim());

    let active = result.mask.iter().filter(|&&m| m).count();
    assert!(active > 0, "mask should mark the pulsing region");
    assert!(active < result.mask.len(), "mask should not cover everything");
    assert!(result.mask[[center_row, center_col]]);
    assert!(!result.mask[[0, 0]]);
    assert!(!result.mask[[lattice_height - 1, lattice_width - 1]]);
}

#[test]
fn static_stack_is_quiescent_everywhere() {
    let config = SyntheticStackConfig {
        noise_std: 3.0,
        ..Default::default()
    };
    let stack = static_stack(&config);

    let mut processor = processor(8);
    let entropies = processor
        .generate_voxels_and_self_similarities(&stack)
        .unwrap()
        .to_vec();

    for &entropy in &entropies {
        assert!(entropy.abs() < 1e-9, "static voxel entropy {entropy}");
    }

    // Flat surface: normalization maps it to zeros and erosion leaves
    // nothing standing.
    let result = processor.create_voxel_surface(&entropies).unwrap();
    assert!(result.mask.iter().all(|&m| !m));
}

#[test]
fn random_stack_is_active_everywhere() {
    let config = SyntheticStackConfig {
        frames: 6,
        ..Default::default()
    };
    let stack = random_stack(&config);

    let mut processor = processor(8);
    let entropies = processor
        .generate_voxels_and_self_similarities(&stack)
        .unwrap();

    for &entropy in entropies {
        assert!(entropy > 0.5, "random voxel entropy {entropy}");
    }
}

#[test]
fn listeners_receive_both_pipeline_events() {
    let config = SyntheticStackConfig::default();
    let stack = pulsing_square_stack(&config, 16);

    let mut processor = processor(8);
    let entropy_events = Arc::new(AtomicUsize::new(0));
    let surface_events = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));

    let entropy_events_inner = Arc::clone(&entropy_events);
    let surface_events_inner = Arc::clone(&surface_events);
    let received_inner = Arc::clone(&received);
    processor.register_callback(Arc::new(move |event| match event {
        ProcessorEvent::EntropyReady {
            entropies,
            from_cache,
        } => {
            assert!(!from_cache);
            entropy_events_inner.fetch_add(1, Ordering::SeqCst);
            *received_inner.lock().unwrap() = entropies.as_ref().clone();
        }
        ProcessorEvent::SurfaceReady { .. } => {
            surface_events_inner.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let entropies = processor
        .generate_voxels_and_self_similarities(&stack)
        .unwrap()
        .to_vec();
    processor.create_voxel_surface(&entropies).unwrap();

    assert_eq!(entropy_events.load(Ordering::SeqCst), 1);
    assert_eq!(surface_events.load(Ordering::SeqCst), 1);
    assert_eq!(*received.lock().unwrap(), entropies);
}

#[test]
fn cache_roundtrip_through_the_processor() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let cache_file = std::env::temp_dir().join(format!("kymo_e2e_{nanos}.json"));

    let config = SyntheticStackConfig::default();
    let stack = pulsing_square_stack(&config, 16);

    let mut first = processor(8);
    first.set_cache_file(Some(cache_file.clone()));
    let computed = first
        .generate_voxels_and_self_similarities(&stack)
        .unwrap()
        .to_vec();
    assert!(cache_file.exists());

    let mut second = processor(8);
    second.set_cache_file(Some(cache_file.clone()));
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_inner = Arc::clone(&hits);
    second.register_callback(Arc::new(move |event| {
        if let ProcessorEvent::EntropyReady {
            from_cache: true, ..
        } = event
        {
            hits_inner.fetch_add(1, Ordering::SeqCst);
        }
    }));
    let cached = second
        .generate_voxels_and_self_similarities(&stack)
        .unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(cached.len(), computed.len());
    for (a, b) in cached.iter().zip(computed.iter()) {
        assert!((a - b).abs() < 1e-10);
    }

    std::fs::remove_file(&cache_file).ok();
}
