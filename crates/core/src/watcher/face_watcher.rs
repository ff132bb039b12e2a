use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::capture::domain::capture_provider::CaptureProvider;
use crate::detection::infrastructure::library_resolver::LibraryResolver;
use crate::detection::infrastructure::model_registry::{ModelHandle, ModelRegistry};
use crate::shared::surface::FrameSurface;
use crate::watcher::callbacks::CallbackTable;
use crate::watcher::config::WatcherConfig;
use crate::watcher::detect_loop::{self, CaptureSession, LoopContext};
use crate::watcher::error::WatcherError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initializing,
    Ready,
    Detecting,
    Stopped,
    Destroyed,
}

/// Watches a capture source for face presence.
///
/// Lifecycle: `Created → Initializing → Ready → Detecting ⇄ Stopped →
/// Destroyed`. Initialization failures return to `Created` (retryable);
/// `Destroyed` is terminal. All operations take `&self`; state lives
/// behind mutexes so a watcher can be driven from callbacks or from
/// another thread without corrupting its lifecycle.
pub struct FaceWatcher {
    config: WatcherConfig,
    capture: Box<dyn CaptureProvider>,
    libraries: Arc<LibraryResolver>,
    registry: Arc<ModelRegistry>,
    state: Mutex<LifecycleState>,
    session: Arc<Mutex<Option<CaptureSession>>>,
    model: Mutex<Option<ModelHandle>>,
    callbacks: Arc<Mutex<CallbackTable>>,
    /// Replaced wholesale on every start so a loop stopped earlier can
    /// never be revived by a flag reset.
    stop_flag: Mutex<Arc<AtomicBool>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FaceWatcher {
    /// Builds a watcher wired to the process-wide registry and resolver.
    pub fn new(config: WatcherConfig, capture: Box<dyn CaptureProvider>) -> Self {
        Self::with_services(
            config,
            capture,
            LibraryResolver::process_wide(),
            ModelRegistry::process_wide(),
        )
    }

    /// Builds a watcher with explicit services; tests construct fresh
    /// registries/resolvers here instead of sharing process state.
    pub fn with_services(
        config: WatcherConfig,
        capture: Box<dyn CaptureProvider>,
        libraries: Arc<LibraryResolver>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            config,
            capture,
            libraries,
            registry,
            state: Mutex::new(LifecycleState::Created),
            session: Arc::new(Mutex::new(None)),
            model: Mutex::new(None),
            callbacks: Arc::new(Mutex::new(CallbackTable::default())),
            stop_flag: Mutex::new(Arc::new(AtomicBool::new(false))),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    // ── Callback registration (fluent, last write wins) ─────────────────

    pub fn on_initialized(&mut self, handler: impl FnMut() + Send + 'static) -> &mut Self {
        self.callbacks.lock().unwrap().on_initialized = Some(Box::new(handler));
        self
    }

    pub fn on_face_detected(&mut self, handler: impl FnMut() + Send + 'static) -> &mut Self {
        self.callbacks.lock().unwrap().on_face_detected = Some(Box::new(handler));
        self
    }

    pub fn on_no_face(&mut self, handler: impl FnMut() + Send + 'static) -> &mut Self {
        self.callbacks.lock().unwrap().on_no_face = Some(Box::new(handler));
        self
    }

    pub fn on_error(
        &mut self,
        handler: impl FnMut(&WatcherError) + Send + 'static,
    ) -> &mut Self {
        self.callbacks.lock().unwrap().on_error = Some(Box::new(handler));
        self
    }

    // ── Lifecycle operations ────────────────────────────────────────────

    /// Acquires the capture source, resolves runtime libraries, and
    /// borrows the shared model. Valid only from `Created`.
    ///
    /// Failures are reported on both channels: the returned error and the
    /// `on_error` callback.
    pub fn initialize(&self) -> Result<(), WatcherError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                LifecycleState::Created => *state = LifecycleState::Initializing,
                LifecycleState::Initializing => {
                    return Err(WatcherError::InitializationInProgress)
                }
                LifecycleState::Ready | LifecycleState::Detecting | LifecycleState::Stopped => {
                    return Err(WatcherError::AlreadyInitialized)
                }
                LifecycleState::Destroyed => return Err(WatcherError::Destroyed),
            }
        }

        match self.run_initialize() {
            Ok(()) => {
                *self.state.lock().unwrap() = LifecycleState::Ready;
                log::info!("watcher initialized");
                self.callbacks.lock().unwrap().fire_initialized();
                Ok(())
            }
            Err(e) => {
                // Back to a clean non-operational state so initialize can
                // be retried.
                self.release_session();
                *self.state.lock().unwrap() = LifecycleState::Created;
                log::warn!("initialization failed: {e}");
                self.callbacks.lock().unwrap().fire_error(&e);
                Err(e)
            }
        }
    }

    fn run_initialize(&self) -> Result<(), WatcherError> {
        let request = self.config.capture_request();
        let handle = self.capture.open(&request)?;
        if let Some((width, height)) = handle.dimensions() {
            log::debug!("capture opened at {width}x{height}");
        }
        *self.session.lock().unwrap() = Some(CaptureSession {
            handle,
            surface: FrameSurface::new(),
        });

        self.libraries
            .ensure_loaded(&self.config.lib_sources, self.config.offline_only)?;

        let model = self
            .registry
            .acquire(self.config.model_source.as_ref(), self.config.offline_only)?;
        *self.model.lock().unwrap() = Some(model);

        Ok(())
    }

    /// Starts the polling loop. Valid from `Ready` or `Stopped`; no-op
    /// when already `Detecting`.
    pub fn start_detection(&self) -> Result<(), WatcherError> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                LifecycleState::Detecting => return Ok(()),
                LifecycleState::Ready | LifecycleState::Stopped => {
                    *state = LifecycleState::Detecting
                }
                LifecycleState::Created | LifecycleState::Initializing => {
                    return Err(WatcherError::NotInitialized)
                }
                LifecycleState::Destroyed => return Err(WatcherError::Destroyed),
            }
        }

        // Wait out any previous loop so ticks never overlap across a
        // stop/start cycle.
        self.join_loop();

        let model = self
            .model
            .lock()
            .unwrap()
            .clone()
            .ok_or(WatcherError::NotInitialized)?;

        let stop = Arc::new(AtomicBool::new(false));
        *self.stop_flag.lock().unwrap() = stop.clone();

        let handle = detect_loop::spawn(LoopContext {
            session: self.session.clone(),
            model,
            callbacks: self.callbacks.clone(),
            stop,
            interval: self.config.interval,
            debug: self.config.debug,
        });
        *self.loop_handle.lock().unwrap() = Some(handle);

        log::info!("detection started");
        Ok(())
    }

    /// Raises the cooperative stop flag; the in-flight tick (if any)
    /// finishes and the loop exits instead of rescheduling. Idempotent,
    /// valid from any state.
    pub fn stop_detection(&self) {
        self.stop_flag.lock().unwrap().store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state == LifecycleState::Detecting {
            *state = LifecycleState::Stopped;
            log::info!("detection stopped");
        }
    }

    /// Stops detection and releases every resource this watcher acquired.
    /// Idempotent; after the call no callback fires and the capture device
    /// is released exactly once.
    pub fn destroy(&self) {
        self.stop_flag.lock().unwrap().store(true, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if *state == LifecycleState::Destroyed {
                return;
            }
            *state = LifecycleState::Destroyed;
        }

        // The loop must be fully drained before the capture handle goes
        // away, otherwise a late tick could fire callbacks after release.
        self.join_loop();
        self.release_session();
        *self.model.lock().unwrap() = None;
        log::info!("watcher destroyed");
    }

    /// Single-shot probe outside the loop: reads one frame and runs the
    /// model once. `Ok(false)` when the source is not producing frames.
    pub fn detect_face(&self) -> Result<bool, WatcherError> {
        match self.state() {
            LifecycleState::Ready | LifecycleState::Detecting | LifecycleState::Stopped => {}
            LifecycleState::Destroyed => return Err(WatcherError::Destroyed),
            LifecycleState::Created | LifecycleState::Initializing => {
                return Err(WatcherError::NotInitialized)
            }
        }

        let model = self
            .model
            .lock()
            .unwrap()
            .clone()
            .ok_or(WatcherError::NotInitialized)?;

        Ok(detect_loop::poll_once(&self.session, &model)?.unwrap_or(false))
    }

    fn join_loop(&self) {
        if let Some(handle) = self.loop_handle.lock().unwrap().take() {
            // A callback may call back into the watcher from the loop
            // thread itself; joining would deadlock there. The raised stop
            // flag already guarantees that loop exits after the current
            // tick.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn release_session(&self) {
        if let Some(mut session) = self.session.lock().unwrap().take() {
            session.handle.stop();
        }
    }
}

impl Drop for FaceWatcher {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::capture::domain::capture_provider::{
        CaptureError, CaptureHandle, CaptureRequest,
    };
    use crate::detection::domain::face_box::FaceBox;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::detection::infrastructure::library_resolver::{
        DependencyError, LibraryFetcher,
    };
    use crate::detection::infrastructure::model_registry::{ModelLoadError, ModelLoader};
    use crate::detection::domain::model_source::ModelSource;
    use crate::shared::frame::Frame;

    // ── Fakes ────────────────────────────────────────────────────────────

    /// Capture handle that serves a fixed number of warmup misses, then a
    /// scripted frame list (optionally cycling forever).
    struct FakeCaptureHandle {
        warmup: usize,
        frames: Vec<Frame>,
        cursor: usize,
        cycle: bool,
        stops: Arc<AtomicUsize>,
    }

    impl CaptureHandle for FakeCaptureHandle {
        fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.warmup > 0 {
                self.warmup -= 1;
                return Ok(None);
            }
            if self.cursor >= self.frames.len() {
                if !self.cycle || self.frames.is_empty() {
                    return Ok(None);
                }
                self.cursor = 0;
            }
            let frame = self.frames[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(frame))
        }

        fn dimensions(&self) -> Option<(u32, u32)> {
            self.frames.first().map(|f| (f.width(), f.height()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Copy)]
    enum OpenOutcome {
        Grant {
            warmup: usize,
            frame_count: usize,
            cycle: bool,
        },
        Deny,
    }

    struct FakeCaptureProvider {
        outcome: OpenOutcome,
        stops: Arc<AtomicUsize>,
    }

    impl FakeCaptureProvider {
        fn granting(frame_count: usize, cycle: bool) -> Self {
            Self {
                outcome: OpenOutcome::Grant {
                    warmup: 0,
                    frame_count,
                    cycle,
                },
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_warmup(warmup: usize, frame_count: usize) -> Self {
            Self {
                outcome: OpenOutcome::Grant {
                    warmup,
                    frame_count,
                    cycle: false,
                },
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn denying() -> Self {
            Self {
                outcome: OpenOutcome::Deny,
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CaptureProvider for FakeCaptureProvider {
        fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
            match self.outcome {
                OpenOutcome::Deny => Err(CaptureError::PermissionDenied(
                    "camera access blocked".into(),
                )),
                OpenOutcome::Grant {
                    warmup,
                    frame_count,
                    cycle,
                } => {
                    let frame = Frame::new(
                        vec![0u8; (request.width as usize) * (request.height as usize) * 3],
                        request.width,
                        request.height,
                    );
                    Ok(Box::new(FakeCaptureHandle {
                        warmup,
                        frames: vec![frame; frame_count],
                        cursor: 0,
                        cycle,
                        stops: self.stops.clone(),
                    }))
                }
            }
        }
    }

    /// Detector that replays a script of face counts / errors, then keeps
    /// returning the final entry.
    struct ScriptedDetector {
        script: VecDeque<Result<usize, String>>,
        last: Result<usize, String>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Result<usize, String>>) -> Self {
            Self {
                script: script.into(),
                last: Ok(0),
            }
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(
            &mut self,
            surface: &FrameSurface,
        ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            assert!(surface.is_ready(), "detector must only see painted surfaces");
            if let Some(next) = self.script.pop_front() {
                self.last = next;
            }
            match &self.last {
                Ok(count) => Ok(vec![
                    FaceBox {
                        x: 0.0,
                        y: 0.0,
                        width: 10.0,
                        height: 10.0,
                        score: 0.9,
                    };
                    *count
                ]),
                Err(message) => Err(message.clone().into()),
            }
        }
    }

    struct ScriptedLoader {
        detector: Mutex<Option<Box<dyn FaceDetector + Send>>>,
    }

    impl ScriptedLoader {
        fn new(detector: ScriptedDetector) -> Arc<Self> {
            Arc::new(Self {
                detector: Mutex::new(Some(Box::new(detector))),
            })
        }
    }

    impl ModelLoader for ScriptedLoader {
        fn load(
            &self,
            _selected: Option<&ModelSource>,
            _offline_only: bool,
        ) -> Result<Box<dyn FaceDetector + Send>, ModelLoadError> {
            self.detector
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ModelLoadError::Failed("already loaded".into()))
        }
    }

    /// Fetcher that treats every library as ambiently present, so watcher
    /// tests don't exercise resolution paths.
    struct AmbientFetcher;

    impl LibraryFetcher for AmbientFetcher {
        fn locate_ambient(&self, name: &str) -> Option<std::path::PathBuf> {
            Some(std::path::PathBuf::from(format!("/fake/{name}")))
        }

        fn download(
            &self,
            name: &str,
            _url: &str,
            _dest: &std::path::Path,
        ) -> Result<(), DependencyError> {
            panic!("unexpected download of {name}");
        }

        fn activate(&self, _runtime_lib: &std::path::Path) -> Result<(), DependencyError> {
            Ok(())
        }
    }

    struct MissingFetcher;

    impl LibraryFetcher for MissingFetcher {
        fn locate_ambient(&self, _name: &str) -> Option<std::path::PathBuf> {
            None
        }

        fn download(
            &self,
            name: &str,
            _url: &str,
            _dest: &std::path::Path,
        ) -> Result<(), DependencyError> {
            panic!("offline mode must never fetch ({name})");
        }

        fn activate(&self, _runtime_lib: &std::path::Path) -> Result<(), DependencyError> {
            Ok(())
        }
    }

    // ── Test harness ─────────────────────────────────────────────────────

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        Initialized,
        Face,
        NoFace,
        Error(String),
    }

    fn record_events(watcher: &mut FaceWatcher) -> Arc<Mutex<Vec<Event>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        watcher.on_initialized(move || sink.lock().unwrap().push(Event::Initialized));
        let sink = events.clone();
        watcher.on_face_detected(move || sink.lock().unwrap().push(Event::Face));
        let sink = events.clone();
        watcher.on_no_face(move || sink.lock().unwrap().push(Event::NoFace));
        let sink = events.clone();
        watcher.on_error(move |e| sink.lock().unwrap().push(Event::Error(e.to_string())));
        events
    }

    fn watcher_with(
        config: WatcherConfig,
        provider: FakeCaptureProvider,
        detector: ScriptedDetector,
    ) -> FaceWatcher {
        FaceWatcher::with_services(
            config,
            Box::new(provider),
            Arc::new(LibraryResolver::new(Arc::new(AmbientFetcher))),
            Arc::new(ModelRegistry::new(ScriptedLoader::new(detector))),
        )
    }

    fn fast_config() -> WatcherConfig {
        WatcherConfig {
            interval: Duration::from_millis(10),
            ..WatcherConfig::default()
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    #[test]
    fn test_initialize_transitions_to_ready_and_fires_callback() {
        let mut watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );
        let events = record_events(&mut watcher);

        watcher.initialize().unwrap();

        assert_eq!(watcher.state(), LifecycleState::Ready);
        assert_eq!(events.lock().unwrap().as_slice(), &[Event::Initialized]);
    }

    #[test]
    fn test_initialize_twice_is_rejected() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );

        watcher.initialize().unwrap();
        let err = watcher.initialize().unwrap_err();

        assert!(matches!(err, WatcherError::AlreadyInitialized));
        assert_eq!(watcher.state(), LifecycleState::Ready);
    }

    #[test]
    fn test_initialize_failure_reports_on_both_channels_and_allows_retry() {
        let mut watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::denying(),
            ScriptedDetector::new(vec![]),
        );
        let events = record_events(&mut watcher);

        let err = watcher.initialize().unwrap_err();

        assert!(matches!(err, WatcherError::Capture(_)));
        assert_eq!(watcher.state(), LifecycleState::Created);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Error(msg) if msg.contains("permission denied")));
    }

    #[test]
    fn test_initialize_offline_without_library_sources_fails_unavailable() {
        let watcher = FaceWatcher::with_services(
            fast_config(),
            Box::new(FakeCaptureProvider::granting(1, false)),
            Arc::new(LibraryResolver::new(Arc::new(MissingFetcher))),
            Arc::new(ModelRegistry::new(ScriptedLoader::new(
                ScriptedDetector::new(vec![]),
            ))),
        );

        let err = watcher.initialize().unwrap_err();

        assert!(
            matches!(err, WatcherError::Dependency(DependencyError::Unavailable(_))),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_start_before_initialize_fails() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );

        let err = watcher.start_detection().unwrap_err();
        assert!(matches!(err, WatcherError::NotInitialized));
    }

    #[test]
    fn test_start_stop_toggle_states() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, true),
            ScriptedDetector::new(vec![]),
        );
        watcher.initialize().unwrap();

        watcher.start_detection().unwrap();
        assert_eq!(watcher.state(), LifecycleState::Detecting);

        watcher.stop_detection();
        assert_eq!(watcher.state(), LifecycleState::Stopped);

        watcher.start_detection().unwrap();
        assert_eq!(watcher.state(), LifecycleState::Detecting);

        watcher.destroy();
        assert_eq!(watcher.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_start_while_detecting_is_noop() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, true),
            ScriptedDetector::new(vec![]),
        );
        watcher.initialize().unwrap();
        watcher.start_detection().unwrap();

        watcher.start_detection().unwrap();
        assert_eq!(watcher.state(), LifecycleState::Detecting);

        watcher.destroy();
    }

    #[test]
    fn test_stop_detection_is_idempotent_from_any_state() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );

        watcher.stop_detection();
        assert_eq!(watcher.state(), LifecycleState::Created);

        watcher.initialize().unwrap();
        watcher.stop_detection();
        watcher.stop_detection();
        assert_eq!(watcher.state(), LifecycleState::Ready);
    }

    // ── Detect loop behavior ─────────────────────────────────────────────

    #[test]
    fn test_face_then_no_face_fire_exactly_once_in_order() {
        let config = WatcherConfig {
            interval: Duration::from_millis(50),
            camera: crate::watcher::config::CameraConfig {
                width: 320,
                height: 240,
                ..Default::default()
            },
            ..WatcherConfig::default()
        };
        // Two frames only: tick 1 sees a face, tick 2 sees none, every
        // later tick gets no frame and stays silent.
        let mut watcher = watcher_with(
            config,
            FakeCaptureProvider::granting(2, false),
            ScriptedDetector::new(vec![Ok(1), Ok(0)]),
        );
        let events = record_events(&mut watcher);

        watcher.initialize().unwrap();
        watcher.start_detection().unwrap();
        thread::sleep(Duration::from_millis(300));
        watcher.stop_detection();
        watcher.destroy();

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[Event::Initialized, Event::Face, Event::NoFace]
        );
    }

    #[test]
    fn test_tick_error_fires_on_error_and_loop_continues() {
        let mut watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(2, false),
            ScriptedDetector::new(vec![Err("inference exploded".into()), Ok(1)]),
        );
        let events = record_events(&mut watcher);

        watcher.initialize().unwrap();
        watcher.start_detection().unwrap();
        thread::sleep(Duration::from_millis(150));
        watcher.destroy();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("inference exploded")));
        assert_eq!(events[2], Event::Face);
    }

    #[test]
    fn test_warmup_frames_produce_no_callbacks() {
        let mut watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::with_warmup(3, 1),
            ScriptedDetector::new(vec![Ok(1)]),
        );
        let events = record_events(&mut watcher);

        watcher.initialize().unwrap();
        watcher.start_detection().unwrap();
        thread::sleep(Duration::from_millis(150));
        watcher.destroy();

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[Event::Initialized, Event::Face]
        );
    }

    #[test]
    fn test_no_callback_after_destroy_and_single_release() {
        let provider = FakeCaptureProvider::granting(1, true);
        let stops = provider.stops.clone();
        let mut watcher = watcher_with(fast_config(), provider, ScriptedDetector::new(vec![Ok(1)]));
        let events = record_events(&mut watcher);

        watcher.initialize().unwrap();
        watcher.start_detection().unwrap();
        thread::sleep(Duration::from_millis(60));

        watcher.stop_detection();
        watcher.destroy();
        let count_at_destroy = events.lock().unwrap().len();

        thread::sleep(Duration::from_millis(60));
        assert_eq!(events.lock().unwrap().len(), count_at_destroy);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_twice_does_not_double_release() {
        let provider = FakeCaptureProvider::granting(1, true);
        let stops = provider.stops.clone();
        let watcher = watcher_with(fast_config(), provider, ScriptedDetector::new(vec![]));

        watcher.initialize().unwrap();
        watcher.destroy();
        watcher.destroy();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_destroy_without_initialize_is_safe() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );
        watcher.destroy();
        assert_eq!(watcher.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_operations_after_destroy_are_rejected() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );
        watcher.destroy();

        assert!(matches!(
            watcher.initialize().unwrap_err(),
            WatcherError::Destroyed
        ));
        assert!(matches!(
            watcher.start_detection().unwrap_err(),
            WatcherError::Destroyed
        ));
        assert!(matches!(
            watcher.detect_face().unwrap_err(),
            WatcherError::Destroyed
        ));
    }

    // ── Single-shot probe ────────────────────────────────────────────────

    #[test]
    fn test_detect_face_before_initialize_fails() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );
        assert!(matches!(
            watcher.detect_face().unwrap_err(),
            WatcherError::NotInitialized
        ));
    }

    #[test]
    fn test_detect_face_reports_presence() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(2, false),
            ScriptedDetector::new(vec![Ok(1), Ok(0)]),
        );
        watcher.initialize().unwrap();

        assert!(watcher.detect_face().unwrap());
        assert!(!watcher.detect_face().unwrap());
    }

    #[test]
    fn test_detect_face_without_frames_is_false() {
        let watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::with_warmup(5, 0),
            ScriptedDetector::new(vec![]),
        );
        watcher.initialize().unwrap();

        assert!(!watcher.detect_face().unwrap());
    }

    // ── Registration ergonomics ──────────────────────────────────────────

    #[test]
    fn test_callback_registration_chains() {
        let mut watcher = watcher_with(
            fast_config(),
            FakeCaptureProvider::granting(1, false),
            ScriptedDetector::new(vec![]),
        );

        watcher
            .on_initialized(|| {})
            .on_face_detected(|| {})
            .on_no_face(|| {})
            .on_error(|_| {});
    }
}
