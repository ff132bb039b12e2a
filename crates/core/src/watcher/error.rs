use thiserror::Error;

use crate::capture::domain::capture_provider::CaptureError;
use crate::detection::infrastructure::library_resolver::DependencyError;
use crate::detection::infrastructure::model_registry::ModelLoadError;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("watcher is not initialized; call initialize() first")]
    NotInitialized,
    #[error("watcher is already initialized")]
    AlreadyInitialized,
    #[error("initialization is already in progress")]
    InitializationInProgress,
    #[error("watcher has been destroyed")]
    Destroyed,
    #[error("processing surface is not ready")]
    SurfaceNotReady,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Model(#[from] ModelLoadError),
    #[error("detection failed: {0}")]
    Detection(String),
}
