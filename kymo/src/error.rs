use shared::correlation::CorrelationError;
use shared::frame::FrameError;
use thiserror::Error;

/// Errors produced by the self-similarity engine.
#[derive(Error, Debug)]
pub enum KymoError {
    /// Frames supplied to one operation do not share dimensions.
    #[error("frame size mismatch: expected {expected_width}x{expected_height}, got {got_width}x{got_height} at index {index}")]
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        got_width: usize,
        got_height: usize,
        index: usize,
    },

    /// An accessor was called before the producer was filled.
    #[error("similarity producer has no computed matrix yet")]
    NotReady,

    /// Lattice geometry validation failure.
    #[error("invalid lattice geometry: {0}")]
    InvalidGeometry(String),

    /// Fewer frames than a self-similarity matrix needs.
    #[error("insufficient frames: got {got}, need at least 2")]
    InsufficientFrames { got: usize },

    /// Eigen-decomposition produced non-finite values.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Computation over a genuine stack produced an empty entropy vector.
    #[error("entropy vector is empty after computation")]
    EmptyResult,

    /// Frame view construction failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Correlation kernel failure.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}
