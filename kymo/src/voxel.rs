//! Voxel lattice generation.
//!
//! Partitions an image stack into a 2-D lattice of voxels (a fixed pixel
//! footprint observed across all frames), reduces each voxel to one
//! spectral-entropy scalar, and assembles the scalars into a row-major
//! entropy vector plus a 3-D point cloud for robust threshold estimation.

use crate::entropy::spectral_entropy;
use crate::error::KymoError;
use crate::producer::pairwise_similarity_matrix;
use nalgebra::Point3;
use rayon::prelude::*;
use shared::frame::FrameView;
use tracing::{debug, warn};

/// Voxel sampling geometry.
///
/// Derived fields are recomputed whenever the sample footprint or the frame
/// size changes: `half_offset = (sample - 1) / 2` per axis, `image_size =
/// frame_size - half_offset`, and `segmented_size = image_size / sample`
/// (floor division).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeGeometry {
    sample_x: usize,
    sample_y: usize,
    frame_width: usize,
    frame_height: usize,
    half_offset_x: usize,
    half_offset_y: usize,
    image_width: usize,
    image_height: usize,
    lattice_width: usize,
    lattice_height: usize,
}

impl LatticeGeometry {
    /// Creates a geometry with the given voxel footprint in pixels.
    pub fn new(sample_x: usize, sample_y: usize) -> Result<Self, KymoError> {
        if sample_x == 0 || sample_y == 0 {
            return Err(KymoError::InvalidGeometry(format!(
                "sample footprint must be at least 1x1, got {sample_x}x{sample_y}"
            )));
        }
        let mut geometry = Self {
            sample_x,
            sample_y,
            frame_width: 0,
            frame_height: 0,
            half_offset_x: 0,
            half_offset_y: 0,
            image_width: 0,
            image_height: 0,
            lattice_width: 0,
            lattice_height: 0,
        };
        geometry.recompute();
        Ok(geometry)
    }

    /// Creates a square geometry (`sample_y = sample_x`).
    pub fn square(sample: usize) -> Result<Self, KymoError> {
        Self::new(sample, sample)
    }

    /// Changes the voxel footprint, recomputing derived fields.
    pub fn set_sample(&mut self, sample_x: usize, sample_y: usize) -> Result<(), KymoError> {
        if sample_x == 0 || sample_y == 0 {
            return Err(KymoError::InvalidGeometry(format!(
                "sample footprint must be at least 1x1, got {sample_x}x{sample_y}"
            )));
        }
        self.sample_x = sample_x;
        self.sample_y = sample_y;
        self.recompute();
        Ok(())
    }

    /// Sets the source frame size, recomputing derived fields.
    pub fn set_frame_size(&mut self, width: usize, height: usize) {
        self.frame_width = width;
        self.frame_height = height;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.half_offset_x = (self.sample_x - 1) / 2;
        self.half_offset_y = (self.sample_y - 1) / 2;
        self.image_width = self.frame_width.saturating_sub(self.half_offset_x);
        self.image_height = self.frame_height.saturating_sub(self.half_offset_y);
        self.lattice_width = self.image_width / self.sample_x;
        self.lattice_height = self.image_height / self.sample_y;
    }

    pub fn sample(&self) -> (usize, usize) {
        (self.sample_x, self.sample_y)
    }

    pub fn half_offset(&self) -> (usize, usize) {
        (self.half_offset_x, self.half_offset_y)
    }

    /// Usable image extent (frame size minus the half offset).
    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// Lattice extent in cells: `(width, height)`.
    pub fn segmented_size(&self) -> (usize, usize) {
        (self.lattice_width, self.lattice_height)
    }

    /// Total number of lattice cells.
    pub fn expected_len(&self) -> usize {
        self.lattice_width * self.lattice_height
    }
}

/// Output of one lattice pass.
#[derive(Debug, Clone)]
pub struct LatticeResult {
    /// Per-cell spectral entropy, row-major over the lattice.
    pub entropies: Vec<f64>,
    /// One point per cell: `(column, row, entropy)`.
    pub cloud: Vec<Point3<f64>>,
    /// Lattice extent in cells.
    pub lattice_width: usize,
    pub lattice_height: usize,
}

impl LatticeResult {
    pub fn is_empty(&self) -> bool {
        self.entropies.is_empty()
    }
}

/// Spectral entropy of the voxel at lattice cell `(col, row)`.
fn cell_entropy(
    frames: &[FrameView],
    col: usize,
    row: usize,
    sample_x: usize,
    sample_y: usize,
) -> Result<f64, KymoError> {
    let x = col * sample_x;
    let y = row * sample_y;
    let voxel: Vec<FrameView> = frames
        .iter()
        .map(|frame| frame.window(x, y, sample_x, sample_y))
        .collect::<Result<_, _>>()?;
    let matrix = pairwise_similarity_matrix(&voxel)?;
    spectral_entropy(&matrix)
}

/// Generates the voxel entropy lattice for a frame stack.
///
/// The geometry's frame size is derived from the stack itself. Cells are
/// independent and processed in parallel; each writes only its own slot of
/// the output, so assembly order is row-major regardless of completion
/// order. A cell whose eigen-decomposition fails contributes a NaN sentinel
/// and the run continues.
///
/// Fewer than two frames is an error; a lattice too small for even one cell
/// yields an empty result, which callers must treat as "no data".
pub fn generate_lattice(
    frames: &[FrameView],
    geometry: &LatticeGeometry,
) -> Result<LatticeResult, KymoError> {
    if frames.len() < 2 {
        return Err(KymoError::InsufficientFrames { got: frames.len() });
    }
    let (width, height) = frames[0].dims();
    for frame in frames.iter() {
        if frame.dims() != (width, height) {
            return Err(KymoError::InvalidGeometry(format!(
                "stack frames must share dimensions: {}x{} vs {width}x{height}",
                frame.width(),
                frame.height()
            )));
        }
    }

    let mut geometry = geometry.clone();
    geometry.set_frame_size(width, height);
    let (lattice_width, lattice_height) = geometry.segmented_size();
    let (sample_x, sample_y) = geometry.sample();
    let cells = geometry.expected_len();

    debug!(
        sample_x,
        sample_y, lattice_width, lattice_height, "generating voxel lattice"
    );

    if cells == 0 {
        return Ok(LatticeResult {
            entropies: Vec::new(),
            cloud: Vec::new(),
            lattice_width,
            lattice_height,
        });
    }

    let entropies: Vec<f64> = (0..cells)
        .into_par_iter()
        .map(|index| {
            let row = index / lattice_width;
            let col = index % lattice_width;
            match cell_entropy(frames, col, row, sample_x, sample_y) {
                Ok(entropy) => entropy,
                Err(err) => {
                    warn!(row, col, %err, "voxel entropy failed, substituting NaN");
                    f64::NAN
                }
            }
        })
        .collect();

    let cloud = entropies
        .iter()
        .enumerate()
        .map(|(index, &entropy)| {
            let row = index / lattice_width;
            let col = index % lattice_width;
            Point3::new(col as f64, row as f64, entropy)
        })
        .collect();

    Ok(LatticeResult {
        entropies,
        cloud,
        lattice_width,
        lattice_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::SimilarityProducer;
    use shared::test_patterns::{random_frame, square_frame};

    #[test]
    fn test_geometry_rejects_zero_sample() {
        assert!(LatticeGeometry::new(0, 4).is_err());
        assert!(LatticeGeometry::new(4, 0).is_err());
        assert!(LatticeGeometry::square(1).is_ok());
    }

    #[test]
    fn test_geometry_half_offset() {
        let geometry = LatticeGeometry::square(8).unwrap();
        assert_eq!(geometry.half_offset(), (3, 3));
        let geometry = LatticeGeometry::new(5, 4).unwrap();
        assert_eq!(geometry.half_offset(), (2, 1));
    }

    #[test]
    fn test_segmented_size_formula() {
        // (height, width, sample_x, sample_y) -> expected lattice cells
        let cases = [
            (240usize, 320usize, 8usize, 8usize),
            (128, 512, 16, 16),
            (64, 64, 4, 4),
        ];
        for (height, width, sample_x, sample_y) in cases {
            let mut geometry = LatticeGeometry::new(sample_x, sample_y).unwrap();
            geometry.set_frame_size(width, height);

            let expected_width = (width - (sample_x - 1) / 2) / sample_x;
            let expected_height = (height - (sample_y - 1) / 2) / sample_y;
            assert_eq!(
                geometry.segmented_size(),
                (expected_width, expected_height),
                "{width}x{height} @ {sample_x}x{sample_y}"
            );
            assert_eq!(geometry.expected_len(), expected_width * expected_height);
        }
    }

    #[test]
    fn test_set_sample_recomputes() {
        let mut geometry = LatticeGeometry::square(4).unwrap();
        geometry.set_frame_size(64, 64);
        assert_eq!(geometry.segmented_size(), (15, 15));

        geometry.set_sample(8, 8).unwrap();
        geometry.set_frame_size(64, 64);
        assert_eq!(geometry.half_offset(), (3, 3));
        assert_eq!(geometry.segmented_size(), (7, 7));
    }

    #[test]
    fn test_lattice_vector_length() {
        let frames: Vec<_> = (0..4).map(|i| random_frame(64, 48, i)).collect();
        let geometry = LatticeGeometry::square(8).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();

        assert_eq!(result.lattice_width, (64 - 3) / 8);
        assert_eq!(result.lattice_height, (48 - 3) / 8);
        assert_eq!(
            result.entropies.len(),
            result.lattice_width * result.lattice_height
        );
        assert_eq!(result.cloud.len(), result.entropies.len());
    }

    #[test]
    fn test_insufficient_frames() {
        let frames = vec![random_frame(32, 32, 0)];
        let geometry = LatticeGeometry::square(4).unwrap();
        assert!(matches!(
            generate_lattice(&frames, &geometry),
            Err(KymoError::InsufficientFrames { got: 1 })
        ));
    }

    #[test]
    fn test_mismatched_stack_rejected() {
        let frames = vec![random_frame(32, 32, 0), random_frame(16, 32, 1)];
        let geometry = LatticeGeometry::square(4).unwrap();
        assert!(matches!(
            generate_lattice(&frames, &geometry),
            Err(KymoError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_stack_smaller_than_sample_is_empty() {
        let frames: Vec<_> = (0..3).map(|i| random_frame(4, 4, i)).collect();
        let geometry = LatticeGeometry::square(16).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();
        assert!(result.is_empty());
        assert_eq!((result.lattice_width, result.lattice_height), (0, 0));
    }

    #[test]
    fn test_static_stack_has_zero_entropy() {
        let frame = random_frame(32, 32, 7);
        let frames = vec![frame.clone(), frame.clone(), frame];
        let geometry = LatticeGeometry::square(8).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();

        assert!(!result.is_empty());
        for &entropy in &result.entropies {
            assert!(entropy.abs() < 1e-9);
        }
    }

    #[test]
    fn test_active_region_has_higher_entropy() {
        // A stack whose center square pulses while the background stays
        // fixed: center cells must carry more entropy than corner cells.
        let frames: Vec<_> = (0..6)
            .map(|t| square_frame(64, 64, 30, if t % 2 == 0 { 220 } else { 40 }, 16))
            .collect();
        let geometry = LatticeGeometry::square(8).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();

        let (lattice_width, lattice_height) = (result.lattice_width, result.lattice_height);
        let center =
            result.entropies[(lattice_height / 2) * lattice_width + lattice_width / 2];
        let corner = result.entropies[0];
        assert!(
            center > corner + 0.1,
            "center {center} should exceed corner {corner}"
        );
    }

    #[test]
    fn test_cell_matches_independent_producer() {
        // A lattice cell's entropy equals running the matrix producer plus
        // spectral reduction on that cell's voxel by hand.
        let frames: Vec<_> = (0..4).map(|i| random_frame(32, 32, 50 + i)).collect();
        let geometry = LatticeGeometry::square(8).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();

        let (col, row) = (1usize, 2usize);
        let voxel: Vec<_> = frames
            .iter()
            .map(|f| f.window(col * 8, row * 8, 8, 8).unwrap())
            .collect();
        let mut producer = SimilarityProducer::new(4, 0).unwrap();
        producer.fill(&voxel).unwrap();
        let expected =
            spectral_entropy(&producer.self_similarity_matrix().unwrap()).unwrap();

        let got = result.entropies[row * result.lattice_width + col];
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cloud_coordinates() {
        let frames: Vec<_> = (0..3).map(|i| random_frame(24, 24, i)).collect();
        let geometry = LatticeGeometry::square(8).unwrap();
        let result = generate_lattice(&frames, &geometry).unwrap();

        for (index, point) in result.cloud.iter().enumerate() {
            assert_eq!(point.x as usize, index % result.lattice_width);
            assert_eq!(point.y as usize, index / result.lattice_width);
            assert_eq!(point.z, result.entropies[index]);
        }
    }
}
