use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("no usable capture device found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    Failure(String),
}

/// Which way a camera faces. On sources without an orientation concept
/// (files, single fixed cameras) providers may ignore it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Constraints and presentation options for opening a capture source.
///
/// `width`/`height` are ideal values; the provider may deliver a different
/// native size and the processing surface adapts. `show_video` and
/// `video_container` are hints for providers that can render a preview;
/// headless providers ignore them.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
    pub show_video: bool,
    pub video_container: Option<String>,
}

/// A live capture stream.
///
/// `read_frame` returning `Ok(None)` means the source is not currently
/// producing readable frames (still warming up, or drained); callers poll
/// again later rather than treating it as an error.
pub trait CaptureHandle: Send {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Native frame dimensions, once known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Releases the underlying device/stream. Best-effort; must be safe to
    /// call more than once.
    fn stop(&mut self);
}

/// Opens capture streams. Implementations handle device discovery,
/// permission checks, and pixel format conversion.
pub trait CaptureProvider: Send + Sync {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}
