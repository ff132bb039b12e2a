use std::time::Duration;

pub const BLAZEFACE_MODEL_NAME: &str = "blazeface-128.onnx";
pub const BLAZEFACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/facewatch/releases/download/v0.1.0/blazeface-128.onnx";

/// Library stems of the two ONNX Runtime dynamic libraries the resolver
/// must locate before any model can be loaded.
pub const ORT_RUNTIME_LIB: &str = "onnxruntime";
pub const ORT_PROVIDERS_LIB: &str = "onnxruntime_providers_shared";

pub const ORT_RUNTIME_LIB_URL: &str =
    "https://github.com/neutrinographics/facewatch/releases/download/v0.1.0/libonnxruntime";
pub const ORT_PROVIDERS_LIB_URL: &str =
    "https://github.com/neutrinographics/facewatch/releases/download/v0.1.0/libonnxruntime_providers_shared";

/// A model load attempt slower than this is treated as failed.
pub const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Delay between detect loop ticks when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;
