//! Pixel frame views over shared byte buffers.
//!
//! A [`FrameView`] is a rectangular window into 8-bit pixel data held in a
//! reference-counted backing buffer. Sub-windows alias the parent's buffer,
//! so slicing a frame into many small sample windows allocates nothing.

use ndarray::Array2;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced when constructing or slicing frame views.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The backing buffer is too small for the requested dimensions.
    #[error("backing buffer too small: {len} bytes for {width}x{height} stride {stride}")]
    BufferTooSmall {
        len: usize,
        width: usize,
        height: usize,
        stride: usize,
    },

    /// Row stride smaller than the row width.
    #[error("row stride {stride} smaller than width {width}")]
    StrideTooSmall { stride: usize, width: usize },

    /// A sub-window does not lie inside its parent view.
    #[error("window ({x},{y}) {width}x{height} outside parent {parent_width}x{parent_height}")]
    WindowOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        parent_width: usize,
        parent_height: usize,
    },

    /// Zero-sized frames are not representable.
    #[error("frame dimensions must be non-zero")]
    EmptyDimensions,
}

/// A rectangular view of 8-bit pixel data.
///
/// Multiple views may alias the same backing buffer; the buffer is shared by
/// reference count and freed when the last view drops. Views are cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct FrameView {
    data: Arc<Vec<u8>>,
    offset: usize,
    width: usize,
    height: usize,
    stride: usize,
}

impl FrameView {
    /// Creates a view owning `data` with a packed row stride (`stride == width`).
    pub fn from_vec(data: Vec<u8>, width: usize, height: usize) -> Result<Self, FrameError> {
        Self::with_stride(data, width, height, width)
    }

    /// Creates a view owning `data` with an explicit row stride in bytes.
    pub fn with_stride(
        data: Vec<u8>,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions);
        }
        if stride < width {
            return Err(FrameError::StrideTooSmall { stride, width });
        }
        let needed = (height - 1) * stride + width;
        if data.len() < needed {
            return Err(FrameError::BufferTooSmall {
                len: data.len(),
                width,
                height,
                stride,
            });
        }
        Ok(Self {
            data: Arc::new(data),
            offset: 0,
            width,
            height,
            stride,
        })
    }

    /// Creates a packed view filled with a constant pixel value.
    pub fn filled(value: u8, width: usize, height: usize) -> Result<Self, FrameError> {
        Self::from_vec(vec![value; width * height], width, height)
    }

    /// Creates a packed view from a row-major `Array2<u8>` (shape `(height, width)`).
    pub fn from_array(array: &Array2<u8>) -> Result<Self, FrameError> {
        let (height, width) = array.dim();
        Self::from_vec(array.iter().copied().collect(), width, height)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row stride of the backing buffer in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `(width, height)` pair.
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns true when `other` has the same width and height.
    pub fn same_dims(&self, other: &FrameView) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Pixel at `(x, y)`. Panics outside the view, like slice indexing.
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        self.data[self.offset + y * self.stride + x]
    }

    /// The `y`-th row as a byte slice of length `width`.
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.height, "row out of bounds");
        let start = self.offset + y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Shallow sub-window at `(x, y)` of size `width` x `height`.
    ///
    /// The returned view shares this view's backing buffer.
    pub fn window(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Result<FrameView, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions);
        }
        if x + width > self.width || y + height > self.height {
            return Err(FrameError::WindowOutOfBounds {
                x,
                y,
                width,
                height,
                parent_width: self.width,
                parent_height: self.height,
            });
        }
        Ok(FrameView {
            data: Arc::clone(&self.data),
            offset: self.offset + y * self.stride + x,
            width,
            height,
            stride: self.stride,
        })
    }

    /// Deep copy into a fresh packed buffer, detaching from any siblings.
    pub fn to_owned_frame(&self) -> FrameView {
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            data.extend_from_slice(self.row(y));
        }
        FrameView {
            data: Arc::new(data),
            offset: 0,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Sets every pixel of this view to `value`.
    ///
    /// Copy-on-write: if the backing buffer is shared with other views, this
    /// view detaches onto its own packed buffer first, leaving siblings
    /// untouched.
    pub fn fill(&mut self, value: u8) {
        if Arc::strong_count(&self.data) > 1 {
            *self = self.to_owned_frame();
        }
        let data = Arc::get_mut(&mut self.data).expect("unique after detach");
        for y in 0..self.height {
            let start = self.offset + y * self.stride;
            data[start..start + self.width].fill(value);
        }
    }

    /// Copies the view into a row-major `Array2<u8>` of shape `(height, width)`.
    pub fn to_array(&self) -> Array2<u8> {
        let mut out = Array2::zeros((self.height, self.width));
        for y in 0..self.height {
            let row = self.row(y);
            for (x, &v) in row.iter().enumerate() {
                out[[y, x]] = v;
            }
        }
        out
    }

    /// Number of views currently sharing this backing buffer.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}
