use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::model_source::{ModelArtifact, ModelSource};
use crate::detection::infrastructure::model_resolver;
use crate::detection::infrastructure::onnx_blazeface_detector::{
    OnnxBlazefaceDetector, DEFAULT_CONFIDENCE,
};
use crate::shared::constants::{BLAZEFACE_MODEL_URL, MODEL_LOAD_TIMEOUT};

/// The shared model: one stateful detector behind a mutex, borrowed by
/// every watcher in the process. Inference calls serialize through the lock.
pub type ModelHandle = Arc<Mutex<Box<dyn FaceDetector + Send>>>;

/// Cloneable so a single attempt's failure reaches every waiter.
#[derive(Error, Debug, Clone)]
pub enum ModelLoadError {
    #[error("model load timed out after {0:?}")]
    Timeout(Duration),
    #[error("model load failed: {0}")]
    Failed(String),
}

/// Performs one physical model load. Split behind a trait so tests can
/// count attempts and script outcomes.
pub trait ModelLoader: Send + Sync {
    /// `selected` is the source picked from the caller-visible tiers
    /// (explicit > default override > embedded artifact); `None` means fall
    /// through to the bundled file or the built-in remote location.
    fn load(
        &self,
        selected: Option<&ModelSource>,
        offline_only: bool,
    ) -> Result<Box<dyn FaceDetector + Send>, ModelLoadError>;
}

/// Production loader: resolves the source ladder's tail and builds an ONNX
/// BlazeFace session.
pub struct OnnxModelLoader;

impl ModelLoader for OnnxModelLoader {
    fn load(
        &self,
        selected: Option<&ModelSource>,
        offline_only: bool,
    ) -> Result<Box<dyn FaceDetector + Send>, ModelLoadError> {
        let source = match selected {
            Some(source) => source.clone(),
            None => {
                if let Some(bundled) = model_resolver::bundled_model_path() {
                    ModelSource::Path(bundled)
                } else if offline_only {
                    return Err(ModelLoadError::Failed(
                        "no local model source and offline-only mode forbids the built-in remote download"
                            .into(),
                    ));
                } else {
                    ModelSource::Url(BLAZEFACE_MODEL_URL.into())
                }
            }
        };

        log::info!("loading face model from {}", source.describe());

        let detector = match &source {
            ModelSource::Path(path) => OnnxBlazefaceDetector::new(path, DEFAULT_CONFIDENCE),
            ModelSource::Url(url) => {
                let path = model_resolver::resolve_url(
                    url,
                    Some(Box::new(|done, total| {
                        if total > 0 {
                            log::debug!("fetching model: {done}/{total} bytes");
                        }
                    })),
                )
                .map_err(|e| ModelLoadError::Failed(e.to_string()))?;
                OnnxBlazefaceDetector::new(&path, DEFAULT_CONFIDENCE)
            }
            ModelSource::Embedded(artifact) => {
                OnnxBlazefaceDetector::from_artifact(artifact, DEFAULT_CONFIDENCE)
            }
        }
        .map_err(|e| ModelLoadError::Failed(e.to_string()))?;

        Ok(Box::new(detector))
    }
}

enum SlotState {
    Empty,
    Loading(Arc<LoadAttempt>),
    Ready(ModelHandle),
}

struct ModelSlot {
    state: Mutex<SlotState>,
}

struct LoadAttempt {
    outcome: Mutex<Option<Result<ModelHandle, ModelLoadError>>>,
    done: Condvar,
    started: Instant,
}

impl LoadAttempt {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            started: Instant::now(),
        }
    }

    fn finish(&self, result: Result<ModelHandle, ModelLoadError>) {
        *self.outcome.lock().unwrap() = Some(result);
        self.done.notify_all();
    }

    /// Waits for the attempt's outcome, bounded by `timeout` measured from
    /// when the load started (all waiters share one deadline). `None`
    /// means the deadline passed first.
    fn wait_until_deadline(
        &self,
        timeout: Duration,
    ) -> Option<Result<ModelHandle, ModelLoadError>> {
        let deadline = self.started + timeout;
        let mut guard = self.outcome.lock().unwrap();
        loop {
            if let Some(ref result) = *guard {
                return Some(result.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (new_guard, _) = self.done.wait_timeout(guard, deadline - now).unwrap();
            guard = new_guard;
        }
    }
}

/// Process-wide shared model registry.
///
/// State machine: `Empty → Loading → Ready`, with `Loading → Empty` on
/// failure or timeout so a later acquire can retry, and `Ready` cached for
/// the rest of the process. At most one physical load is ever in flight;
/// every concurrent acquire before completion shares that attempt's
/// outcome. The registry is an explicit service (constructed per test, or
/// via `process_wide()` for default wiring) rather than hidden global
/// state.
pub struct ModelRegistry {
    slot: Arc<ModelSlot>,
    loader: Arc<dyn ModelLoader>,
    timeout: Duration,
    default_source: Mutex<Option<ModelSource>>,
    embedded: Mutex<Option<ModelArtifact>>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self::with_timeout(loader, MODEL_LOAD_TIMEOUT)
    }

    pub fn with_timeout(loader: Arc<dyn ModelLoader>, timeout: Duration) -> Self {
        Self {
            slot: Arc::new(ModelSlot {
                state: Mutex::new(SlotState::Empty),
            }),
            loader,
            timeout,
            default_source: Mutex::new(None),
            embedded: Mutex::new(None),
        }
    }

    /// The default process-wide registry instance.
    pub fn process_wide() -> Arc<ModelRegistry> {
        static INSTANCE: OnceLock<Arc<ModelRegistry>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| Arc::new(ModelRegistry::new(Arc::new(OnnxModelLoader))))
            .clone()
    }

    /// Registry-wide default model source, consulted when a config carries
    /// no explicit source.
    pub fn set_default_source(&self, source: ModelSource) {
        *self.default_source.lock().unwrap() = Some(source);
    }

    /// Injects an in-memory model artifact (used by embedded builds).
    /// Outranked by an explicit source and by the default override.
    pub fn set_embedded_artifact(&self, artifact: ModelArtifact) {
        *self.embedded.lock().unwrap() = Some(artifact);
    }

    /// Acquires the shared model, loading it on first use.
    pub fn acquire(
        &self,
        explicit_source: Option<&ModelSource>,
        offline_only: bool,
    ) -> Result<ModelHandle, ModelLoadError> {
        let attempt = {
            let mut state = self.slot.state.lock().unwrap();
            match &*state {
                SlotState::Ready(handle) => return Ok(handle.clone()),
                SlotState::Loading(attempt) => attempt.clone(),
                SlotState::Empty => {
                    let attempt = Arc::new(LoadAttempt::new());
                    *state = SlotState::Loading(attempt.clone());

                    let selected = model_resolver::select_source(
                        explicit_source,
                        self.default_source.lock().unwrap().as_ref(),
                        self.embedded.lock().unwrap().as_ref(),
                    );
                    self.spawn_loader(attempt.clone(), selected, offline_only);
                    attempt
                }
            }
        };

        match attempt.wait_until_deadline(self.timeout) {
            Some(result) => result,
            None => {
                // Deadline passed with the loader still running: treat the
                // attempt as failed and clear the slot so a later acquire
                // starts fresh. The stale loader's eventual completion is
                // discarded via the pointer identity check below.
                let mut state = self.slot.state.lock().unwrap();
                if let Some(result) = attempt.outcome.lock().unwrap().clone() {
                    // Loader finished right at the deadline; honor its
                    // outcome instead of reporting a spurious timeout.
                    return result;
                }
                if let SlotState::Loading(current) = &*state {
                    if Arc::ptr_eq(current, &attempt) {
                        *state = SlotState::Empty;
                    }
                }
                Err(ModelLoadError::Timeout(self.timeout))
            }
        }
    }

    fn spawn_loader(
        &self,
        attempt: Arc<LoadAttempt>,
        selected: Option<ModelSource>,
        offline_only: bool,
    ) {
        let slot = self.slot.clone();
        let loader = self.loader.clone();
        thread::spawn(move || {
            let result = loader
                .load(selected.as_ref(), offline_only)
                .map(|detector| Arc::new(Mutex::new(detector)) as ModelHandle);

            {
                let mut state = slot.state.lock().unwrap();
                if let SlotState::Loading(current) = &*state {
                    if Arc::ptr_eq(current, &attempt) {
                        *state = match &result {
                            Ok(handle) => SlotState::Ready(handle.clone()),
                            Err(e) => {
                                log::warn!("model load failed: {e}");
                                SlotState::Empty
                            }
                        };
                    }
                }
            }

            attempt.finish(result);
        });
    }
}
