//! Self-similarity matrix production.
//!
//! Two steps generate the entropy signal: first a self-similarity matrix is
//! computed between a set of frames, then a per-frame novelty measure is
//! derived from the matrix rows. [`SimilarityProducer`] supports both a full
//! fill over a frame window and a sliding update that replaces the oldest
//! frame and recomputes only the affected row and column.

use crate::error::KymoError;
use ndarray::Array2;
use shared::correlation::correlate;
use shared::frame::FrameView;
use shared::ring_buffer::RingBuffer;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Bits per pixel of the frames this producer analyzes.
const PIXEL_DEPTH: u32 = 8;

/// Computes the full symmetric pairwise-correlation matrix for a frame
/// sequence: unit diagonal, `matrix[i][j] = ncc(frames[i], frames[j])`.
///
/// All frames must share dimensions. This is the same per-pair value the
/// sliding producer maintains incrementally, so batch consumers (the voxel
/// lattice) and streaming consumers agree cell for cell.
pub fn pairwise_similarity_matrix(frames: &[FrameView]) -> Result<Array2<f64>, KymoError> {
    if frames.len() < 2 {
        return Err(KymoError::InsufficientFrames { got: frames.len() });
    }
    let (width, height) = frames[0].dims();
    for (index, frame) in frames.iter().enumerate() {
        if frame.dims() != (width, height) {
            return Err(KymoError::SizeMismatch {
                expected_width: width,
                expected_height: height,
                got_width: frame.width(),
                got_height: frame.height(),
                index,
            });
        }
    }

    let m = frames.len();
    let mut matrix = Array2::eye(m);
    for i in 0..m {
        for j in (i + 1)..m {
            let r = correlate(&frames[i], &frames[j])?;
            matrix[[i, j]] = r;
            matrix[[j, i]] = r;
        }
    }
    Ok(matrix)
}

/// Bounded FIFO memo of pair correlation results keyed by frame fingerprints.
///
/// Lets a sliding update skip recomputation when a recently-seen frame
/// re-enters the window. Capacity 0 disables the memo.
#[derive(Debug, Default)]
struct PairMemo {
    map: HashMap<(u64, u64), f64>,
    order: VecDeque<(u64, u64)>,
    capacity: usize,
}

impl PairMemo {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn key(a: u64, b: u64) -> (u64, u64) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn get(&self, a: u64, b: u64) -> Option<f64> {
        self.map.get(&Self::key(a, b)).copied()
    }

    fn insert(&mut self, a: u64, b: u64, value: f64) {
        if self.capacity == 0 {
            return;
        }
        let key = Self::key(a, b);
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
            if self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// A window frame together with its content fingerprint.
#[derive(Debug, Clone)]
struct WindowFrame {
    view: FrameView,
    fingerprint: u64,
}

fn fingerprint(frame: &FrameView) -> u64 {
    let mut hasher = DefaultHasher::new();
    frame.width().hash(&mut hasher);
    frame.height().hash(&mut hasher);
    for y in 0..frame.height() {
        frame.row(y).hash(&mut hasher);
    }
    hasher.finish()
}

/// Entropy signal generator over a fixed-size temporal window of frames.
///
/// # State machine
///
/// The producer starts empty. [`fill`](Self::fill) seeds the window; once a
/// full window's worth of frames is present, a matrix and entropy signal
/// exist and the accessors succeed. [`update`](Self::update) slides the
/// window by one frame, evicting the oldest and recomputing only the new
/// row and column. Accessors fail with [`KymoError::NotReady`] before the
/// first complete window.
pub struct SimilarityProducer {
    matrix_sz: usize,
    cache_sz: usize,
    window: RingBuffer<WindowFrame>,
    matrix: Option<Array2<f64>>,
    entropies: Option<Vec<f64>>,
    row_means: Option<Vec<f64>>,
    memo: PairMemo,
    long_term: Option<Vec<f64>>,
    finished: bool,
    frame_dims: Option<(usize, usize)>,
}

impl SimilarityProducer {
    /// Creates a producer for a temporal window of `matrix_sz` frames with a
    /// pair-result memo of `cache_sz` entries (0 disables the memo).
    ///
    /// `matrix_sz` must be at least 2: a 1x1 self-similarity matrix carries
    /// no signal.
    pub fn new(matrix_sz: usize, cache_sz: usize) -> Result<Self, KymoError> {
        if matrix_sz < 2 {
            return Err(KymoError::InvalidGeometry(format!(
                "similarity window must span at least 2 frames, got {matrix_sz}"
            )));
        }
        Ok(Self {
            matrix_sz,
            cache_sz,
            window: RingBuffer::new(matrix_sz),
            matrix: None,
            entropies: None,
            row_means: None,
            memo: PairMemo::new(cache_sz),
            long_term: None,
            finished: true,
            frame_dims: None,
        })
    }

    /// Seeds the window with an initial set of frames.
    ///
    /// Clears any existing matrix and signal. When more than `matrix_sz`
    /// frames are given, the leading frames are ignored and the last
    /// `matrix_sz` are kept. Returns `Ok(true)` when a full window's worth
    /// of frames was available and the signal was generated; `Ok(false)`
    /// when fewer frames were supplied (they are retained, and `update`
    /// can top the window up). An empty slice just clears state.
    pub fn fill(&mut self, frames: &[FrameView]) -> Result<bool, KymoError> {
        self.finished = false;
        self.window.clear();
        self.matrix = None;
        self.entropies = None;
        self.row_means = None;
        self.frame_dims = None;

        if frames.is_empty() {
            self.finished = true;
            return Ok(false);
        }

        let (width, height) = frames[0].dims();
        for (index, frame) in frames.iter().enumerate() {
            if frame.dims() != (width, height) {
                return Err(KymoError::SizeMismatch {
                    expected_width: width,
                    expected_height: height,
                    got_width: frame.width(),
                    got_height: frame.height(),
                    index,
                });
            }
        }
        self.frame_dims = Some((width, height));

        let skip = frames.len().saturating_sub(self.matrix_sz);
        for frame in &frames[skip..] {
            self.window.push(WindowFrame {
                view: frame.clone(),
                fingerprint: fingerprint(frame),
            });
        }

        if !self.window.is_full() {
            self.finished = true;
            return Ok(false);
        }

        let mut matrix = Array2::eye(self.matrix_sz);
        for i in 0..self.matrix_sz {
            for j in (i + 1)..self.matrix_sz {
                let r = self.correlate_pair(i, j)?;
                matrix[[i, j]] = r;
                matrix[[j, i]] = r;
            }
        }
        self.matrix = Some(matrix);
        self.generate_signal();

        if let (Some(history), Some(entropies)) = (self.long_term.as_mut(), self.entropies.as_ref())
        {
            history.extend_from_slice(entropies);
        }

        debug!(
            matrix_sz = self.matrix_sz,
            memo_entries = self.memo.len(),
            "similarity window filled"
        );
        self.finished = true;
        Ok(true)
    }

    /// Inputs the next frame of the stream.
    ///
    /// The frame is appended to the temporal window; if the window was full,
    /// the oldest frame and its matrix row/column are dropped and only the
    /// new row and column are computed (`matrix_sz - 1` correlations instead
    /// of the full square). Returns `Ok(true)` once a full window's worth of
    /// self-similarity is available, `Ok(false)` while still buffering.
    ///
    /// Not safe for concurrent calls; intended for single-threaded
    /// frame-by-frame streaming.
    pub fn update(&mut self, frame: FrameView) -> Result<bool, KymoError> {
        self.finished = false;

        if let Some((width, height)) = self.frame_dims {
            if frame.dims() != (width, height) {
                return Err(KymoError::SizeMismatch {
                    expected_width: width,
                    expected_height: height,
                    got_width: frame.width(),
                    got_height: frame.height(),
                    index: self.window.len(),
                });
            }
        } else {
            self.frame_dims = Some(frame.dims());
        }

        let had_matrix = self.matrix.is_some();
        let evicted = self.window.push(WindowFrame {
            fingerprint: fingerprint(&frame),
            view: frame,
        });

        if !self.window.is_full() {
            self.entropies = None;
            self.finished = true;
            return Ok(false);
        }

        let last = self.matrix_sz - 1;
        match (had_matrix, evicted.is_some()) {
            (true, true) => {
                // Shift the matrix up-left by one frame, then fill the new
                // last row/column.
                let matrix = self.matrix.as_mut().expect("matrix present");
                for i in 0..last {
                    for j in 0..last {
                        matrix[[i, j]] = matrix[[i + 1, j + 1]];
                    }
                }
                for i in 0..last {
                    let r = self.correlate_pair(i, last)?;
                    let matrix = self.matrix.as_mut().expect("matrix present");
                    matrix[[i, last]] = r;
                    matrix[[last, i]] = r;
                }
                let matrix = self.matrix.as_mut().expect("matrix present");
                matrix[[last, last]] = 1.0;
            }
            _ => {
                // First time the window reaches capacity: full computation.
                let mut matrix = Array2::eye(self.matrix_sz);
                for i in 0..self.matrix_sz {
                    for j in (i + 1)..self.matrix_sz {
                        let r = self.correlate_pair(i, j)?;
                        matrix[[i, j]] = r;
                        matrix[[j, i]] = r;
                    }
                }
                self.matrix = Some(matrix);
            }
        }

        self.generate_signal();

        if let (Some(history), Some(entropies)) = (self.long_term.as_mut(), self.entropies.as_ref())
        {
            if let Some(&newest) = entropies.last() {
                history.push(newest);
            }
        }

        self.finished = true;
        Ok(true)
    }

    /// Correlates window frames `i` and `j`, consulting the pair memo.
    fn correlate_pair(&mut self, i: usize, j: usize) -> Result<f64, KymoError> {
        let (fp_a, fp_b) = {
            let a = self.window.get(i).expect("index within window");
            let b = self.window.get(j).expect("index within window");
            (a.fingerprint, b.fingerprint)
        };
        if let Some(r) = self.memo.get(fp_a, fp_b) {
            return Ok(r);
        }
        let r = {
            let a = self.window.get(i).expect("index within window");
            let b = self.window.get(j).expect("index within window");
            correlate(&a.view, &b.view)?
        };
        self.memo.insert(fp_a, fp_b, r);
        Ok(r)
    }

    /// Derives the per-frame novelty signal from the current matrix.
    ///
    /// Each row's similarity mass is normalized to a distribution whose
    /// Shannon entropy (in bits, scaled by log2(M)) measures how evenly the
    /// frame's similarity spreads over the window. Near-identical frames
    /// give a uniform row (H ~ 1); a frame unlike the rest concentrates its
    /// row on the diagonal (H ~ 0). The published signal is `1 - H`, so the
    /// most dissimilar frame carries the largest value.
    fn generate_signal(&mut self) {
        let matrix = self.matrix.as_ref().expect("matrix present");
        let m = self.matrix_sz;
        let log2_m = (m as f64).log2();

        let mut sums = vec![0.0; m];
        for i in 0..m {
            for j in 0..m {
                sums[i] += matrix[[i, j]].max(0.0);
            }
        }

        let mut signal = vec![0.0; m];
        for i in 0..m {
            let mut h = 0.0;
            for j in 0..m {
                let rr = matrix[[i, j]].max(0.0) / sums[i];
                if rr > 1e-12 {
                    h -= rr * rr.log2();
                }
            }
            signal[i] = 1.0 - h / log2_m;
        }

        self.row_means = Some(sums.iter().map(|&s| s / m as f64).collect());
        self.entropies = Some(signal);
    }

    /// Copy of the current self-similarity matrix.
    pub fn self_similarity_matrix(&self) -> Result<Array2<f64>, KymoError> {
        self.matrix.clone().ok_or(KymoError::NotReady)
    }

    /// The per-frame novelty signal, one value per window position (oldest
    /// first). Larger means more dissimilar from the rest of the window.
    pub fn entropies(&self) -> Result<Vec<f64>, KymoError> {
        self.entropies.clone().ok_or(KymoError::NotReady)
    }

    /// Correlation of each adjacent frame pair, length `matrix_sz - 1`.
    pub fn sequential_correlations(&self) -> Result<Vec<f64>, KymoError> {
        let matrix = self.matrix.as_ref().ok_or(KymoError::NotReady)?;
        Ok((0..self.matrix_sz - 1)
            .map(|i| matrix[[i, i + 1]])
            .collect())
    }

    /// Mean similarity of each frame against the window (the mean
    /// projection signal).
    pub fn mean_projection(&self) -> Result<Vec<f64>, KymoError> {
        self.row_means.clone().ok_or(KymoError::NotReady)
    }

    /// Enables or disables the long-term entropy history and returns the new
    /// state. While enabled, every generated signal appends to the history:
    /// a fill contributes the whole window, an update its newest value.
    pub fn set_long_term(&mut self, enabled: bool) -> bool {
        if enabled && self.long_term.is_none() {
            self.long_term = Some(Vec::new());
        } else if !enabled {
            self.long_term = None;
        }
        self.long_term.is_some()
    }

    /// Whether the long-term history is being collected.
    pub fn long_term(&self) -> bool {
        self.long_term.is_some()
    }

    /// The collected long-term entropy history (empty when disabled).
    pub fn long_term_entropy(&self) -> &[f64] {
        self.long_term.as_deref().unwrap_or(&[])
    }

    /// True when the last fill/update was interrupted before completing.
    pub fn aborted(&self) -> bool {
        !self.finished
    }

    /// True once a full window's worth of self-similarity exists.
    pub fn is_ready(&self) -> bool {
        self.matrix.is_some()
    }

    /// Temporal window size.
    pub fn matrix_sz(&self) -> usize {
        self.matrix_sz
    }

    /// Pair memo capacity.
    pub fn cache_sz(&self) -> usize {
        self.cache_sz
    }

    /// Bits per pixel of analyzed frames.
    pub fn depth(&self) -> u32 {
        PIXEL_DEPTH
    }

    /// Dimensions of the frames currently in the window, if any.
    pub fn fill_image_size(&self) -> Option<(usize, usize)> {
        self.frame_dims
    }
}
