use crate::detection::domain::face_box::FaceBox;
use crate::shared::surface::FrameSurface;

/// Domain interface for single-frame face detection.
///
/// Implementations may hold mutable inference state (sessions, scratch
/// buffers), hence `&mut self`. An empty result list means no face.
pub trait FaceDetector: Send {
    fn detect(&mut self, surface: &FrameSurface) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}
