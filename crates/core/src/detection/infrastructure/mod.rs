pub mod library_resolver;
pub mod model_registry;
pub mod model_resolver;
pub mod onnx_blazeface_detector;
