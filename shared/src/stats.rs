//! Per-pixel statistics over a frame sequence.
//!
//! Accumulates sum and sum-of-squares images across a stack of equally-sized
//! frames, from which per-pixel mean, variance, and standard deviation
//! images are derived. Used for motion-variance maps alongside the
//! self-similarity surface.

use crate::frame::FrameView;
use ndarray::Array2;

/// Running per-pixel sum / sum-of-squares accumulator.
///
/// Frames are accumulated in f64 to avoid overflow over long sequences.
#[derive(Debug, Clone)]
pub struct SequenceStats {
    sum: Array2<f64>,
    sum_sq: Array2<f64>,
    count: usize,
}

impl SequenceStats {
    /// Creates an accumulator for frames of `width` x `height`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            sum: Array2::zeros((height, width)),
            sum_sq: Array2::zeros((height, width)),
            count: 0,
        }
    }

    /// Accumulates one frame. Returns false (and accumulates nothing) when
    /// the frame dimensions do not match.
    pub fn accumulate(&mut self, frame: &FrameView) -> bool {
        let (height, width) = self.sum.dim();
        if frame.width() != width || frame.height() != height {
            return false;
        }
        for y in 0..height {
            let row = frame.row(y);
            for (x, &v) in row.iter().enumerate() {
                let v = v as f64;
                self.sum[[y, x]] += v;
                self.sum_sq[[y, x]] += v * v;
            }
        }
        self.count += 1;
        true
    }

    /// Accumulates every frame of a stack. Returns the number accepted.
    pub fn accumulate_all<'a>(&mut self, frames: impl IntoIterator<Item = &'a FrameView>) -> usize {
        frames.into_iter().filter(|f| self.accumulate(f)).count()
    }

    /// Number of frames accumulated.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Per-pixel sum image.
    pub fn sum(&self) -> &Array2<f64> {
        &self.sum
    }

    /// Per-pixel sum-of-squares image.
    pub fn sum_sq(&self) -> &Array2<f64> {
        &self.sum_sq
    }

    /// Per-pixel mean image: `sum / N`. Zeros when nothing was accumulated.
    pub fn mean(&self) -> Array2<f64> {
        if self.count == 0 {
            return Array2::zeros(self.sum.dim());
        }
        &self.sum / self.count as f64
    }

    /// Per-pixel variance image: `sum_sq/N - (sum/N)^2`.
    ///
    /// Zeros when nothing was accumulated. Tiny negative values from
    /// floating cancellation are clamped to zero.
    pub fn variance(&self) -> Array2<f64> {
        if self.count == 0 {
            return Array2::zeros(self.sum.dim());
        }
        let one_by_n = 1.0 / self.count as f64;
        let mut var = &self.sum_sq * one_by_n - (&self.sum * one_by_n).mapv(|m| m * m);
        var.mapv_inplace(|v| v.max(0.0));
        var
    }

    /// Per-pixel standard deviation image.
    pub fn std_dev(&self) -> Array2<f64> {
        self.variance().mapv(f64::sqrt)
    }
}
