use ndarray::ArrayView3;

use crate::shared::frame::Frame;

/// Off-screen RGB pixel surface the detect loop paints capture frames into.
///
/// The surface tracks the dimensions of the last painted frame and resizes
/// itself whenever the source dimensions change, so detectors always see a
/// buffer that matches the current frame exactly.
#[derive(Debug)]
pub struct FrameSurface {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl FrameSurface {
    /// An empty surface. It has no usable pixels until the first `paint`.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Copies `frame` into the surface, reallocating when the frame
    /// dimensions differ from the surface's current dimensions.
    pub fn paint(&mut self, frame: &Frame) {
        if self.width != frame.width() || self.height != frame.height() {
            self.width = frame.width();
            self.height = frame.height();
            self.data = vec![0; (self.width as usize) * (self.height as usize) * 3];
        }
        self.data.copy_from_slice(frame.data());
    }

    /// True once at least one frame has been painted.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// View as (height, width, channel). Panics if called before the first
    /// paint; callers gate on `is_ready`.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, 3),
            &self.data,
        )
        .expect("surface data length must match dimensions")
    }
}

impl Default for FrameSurface {
    fn default() -> Self {
        Self::new()
    }
}
