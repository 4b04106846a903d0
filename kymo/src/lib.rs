//! KYMO - voxel self-similarity and entropy-projection engine.
//!
//! Analyzes time-lapse microscopy stacks (e.g. cardiomyocyte contraction
//! video) by partitioning the volume into spatio-temporal voxels, computing
//! a pairwise self-similarity matrix per voxel, reducing each matrix to a
//! spectral-entropy scalar, and assembling the scalars into a temporal
//! self-similarity surface. A sliding short-term variant tracks per-frame
//! novelty for live streams.
//!
//! The [`processor::VoxelSelfSimilarity`] facet sequences the pipeline:
//! cache lookup, lattice generation, cache fill, and listener notification.

pub mod cache;
pub mod callback;
pub mod config;
pub mod entropy;
pub mod error;
pub mod processor;
pub mod producer;
pub mod ransac;
pub mod surface;
pub mod voxel;

// Re-export the high-level API surface.
pub use callback::{CallbackId, ProcessorCallback, ProcessorEvent};
pub use config::EngineConfig;
pub use error::KymoError;
pub use processor::VoxelSelfSimilarity;
pub use producer::SimilarityProducer;
pub use surface::SurfaceResult;
pub use voxel::{LatticeGeometry, LatticeResult};
