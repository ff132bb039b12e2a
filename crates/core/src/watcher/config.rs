use std::collections::HashMap;
use std::time::Duration;

use crate::capture::domain::capture_provider::{CaptureRequest, FacingMode};
use crate::detection::domain::model_source::ModelSource;
use crate::detection::infrastructure::library_resolver::LibrarySource;
use crate::shared::constants::{DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH, DEFAULT_INTERVAL};

#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub facing_mode: FacingMode,
    /// Ideal capture dimensions; the source's native size wins when they
    /// disagree and the processing surface adapts.
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
        }
    }
}

/// Per-watcher configuration, fixed at construction. Changing anything
/// means building a new watcher.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Ask the capture provider to render a visible preview.
    pub show_video: bool,
    /// Identifier of the presentation target for providers that support
    /// one; `None` lets the provider pick.
    pub video_container: Option<String>,
    /// Delay between detect loop ticks.
    pub interval: Duration,
    /// Emit per-tick trace logging.
    pub debug: bool,
    /// Explicit model source; outranks every other tier.
    pub model_source: Option<ModelSource>,
    /// Runtime library locators, keyed by library stem.
    pub lib_sources: HashMap<String, LibrarySource>,
    /// Forbid any remote fallback for dependency and model resolution.
    pub offline_only: bool,
    pub camera: CameraConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            show_video: false,
            video_container: None,
            interval: DEFAULT_INTERVAL,
            debug: false,
            model_source: None,
            lib_sources: HashMap::new(),
            offline_only: true,
            camera: CameraConfig::default(),
        }
    }
}

impl WatcherConfig {
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            facing_mode: self.camera.facing_mode,
            width: self.camera.width,
            height: self.camera.height,
            show_video: self.show_video,
            video_container: self.video_container.clone(),
        }
    }
}
