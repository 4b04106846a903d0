//! Shared components and utilities for the kymo engine.
//!
//! This crate contains the generic image-processing substrate used by the
//! self-similarity engine: pixel frame views over shared byte buffers, the
//! normalized cross-correlation kernel, per-pixel sequence statistics,
//! segmentation primitives, and a fixed-capacity ring buffer.

pub mod correlation;
pub mod frame;
pub mod ring_buffer;
pub mod segmentation;
pub mod stats;
pub mod test_patterns;

pub use frame::FrameView;
pub use ring_buffer::RingBuffer;
