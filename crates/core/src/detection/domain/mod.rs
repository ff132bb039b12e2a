pub mod face_box;
pub mod face_detector;
pub mod model_source;
