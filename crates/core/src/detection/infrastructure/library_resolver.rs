use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use thiserror::Error;

use crate::detection::infrastructure::model_resolver;
use crate::shared::constants::{
    ORT_PROVIDERS_LIB, ORT_PROVIDERS_LIB_URL, ORT_RUNTIME_LIB, ORT_RUNTIME_LIB_URL,
};

/// Errors are cloneable so one failed attempt can be handed to every
/// concurrent waiter.
#[derive(Error, Debug, Clone)]
pub enum DependencyError {
    #[error("required library '{0}' is unavailable: offline-only mode and no local source")]
    Unavailable(String),
    #[error("failed to fetch library '{name}': {reason}")]
    Fetch { name: String, reason: String },
    #[error("runtime initialization failed: {0}")]
    Runtime(String),
}

/// Locator for one runtime library, keyed by library stem in
/// `WatcherConfig::lib_sources`.
#[derive(Clone, Debug)]
pub enum LibrarySource {
    Path(PathBuf),
    Url(String),
}

/// Side-effecting half of library resolution, split out so tests can
/// substitute a recording fake (and prove offline mode never fetches).
pub trait LibraryFetcher: Send + Sync {
    /// Checks whether the library is already present in the process
    /// environment (env override or previously cached file).
    fn locate_ambient(&self, name: &str) -> Option<PathBuf>;

    /// Downloads the library from `url` to `dest`.
    fn download(&self, name: &str, url: &str, dest: &Path) -> Result<(), DependencyError>;

    /// Points the inference runtime at the resolved core library and waits
    /// for it to report ready.
    fn activate(&self, runtime_lib: &Path) -> Result<(), DependencyError>;
}

/// Production fetcher: reuses the streaming model downloader and commits
/// the ort environment as the readiness signal.
pub struct OrtLibraryFetcher;

impl LibraryFetcher for OrtLibraryFetcher {
    fn locate_ambient(&self, name: &str) -> Option<PathBuf> {
        if name == ORT_RUNTIME_LIB {
            if let Ok(path) = std::env::var("ORT_DYLIB_PATH") {
                let path = PathBuf::from(path);
                if path.exists() {
                    return Some(path);
                }
            }
        }
        let cached = lib_cache_dir().ok()?.join(lib_filename(name));
        cached.exists().then_some(cached)
    }

    fn download(&self, name: &str, url: &str, dest: &Path) -> Result<(), DependencyError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DependencyError::Fetch {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }
        let lib = name.to_string();
        model_resolver::download(
            url,
            dest,
            Some(Box::new(move |done, total| {
                if total > 0 {
                    log::debug!("fetching {lib}: {done}/{total} bytes");
                }
            })),
        )
        .map_err(|e| DependencyError::Fetch {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn activate(&self, runtime_lib: &Path) -> Result<(), DependencyError> {
        std::env::set_var("ORT_DYLIB_PATH", runtime_lib);
        ort::init_from(runtime_lib)
            .map_err(|e| DependencyError::Runtime(e.to_string()))?
            .commit();
        Ok(())
    }
}

/// Platform dynamic-library filename for a library stem.
pub fn lib_filename(stem: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        format!("lib{stem}.dylib")
    }
    #[cfg(target_os = "windows")]
    {
        format!("{stem}.dll")
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        format!("lib{stem}.so")
    }
}

pub fn lib_cache_dir() -> Result<PathBuf, model_resolver::FetchError> {
    model_resolver::app_dir().map(|d| d.join("libs"))
}

enum LoadState {
    NotLoaded,
    Loading(Arc<LoadAttempt>),
    Loaded,
}

struct LoadAttempt {
    outcome: Mutex<Option<Result<(), DependencyError>>>,
    done: Condvar,
}

impl LoadAttempt {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn finish(&self, result: Result<(), DependencyError>) {
        *self.outcome.lock().unwrap() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<(), DependencyError> {
        let mut guard = self.outcome.lock().unwrap();
        loop {
            if let Some(ref result) = *guard {
                return result.clone();
            }
            guard = self.done.wait(guard).unwrap();
        }
    }
}

/// Load-once resolver for the runtime libraries the inference stack needs.
///
/// The first caller performs the resolution; concurrent callers wait on the
/// same in-flight attempt and receive its outcome. A failed attempt clears
/// the state so a later call can retry; success is cached for the process
/// lifetime.
pub struct LibraryResolver {
    state: Mutex<LoadState>,
    fetcher: Arc<dyn LibraryFetcher>,
    default_dir: Mutex<Option<PathBuf>>,
}

impl LibraryResolver {
    pub fn new(fetcher: Arc<dyn LibraryFetcher>) -> Self {
        Self {
            state: Mutex::new(LoadState::NotLoaded),
            fetcher,
            default_dir: Mutex::new(None),
        }
    }

    /// The default process-wide resolver instance. Tests construct their
    /// own resolvers instead of sharing this one.
    pub fn process_wide() -> Arc<LibraryResolver> {
        static INSTANCE: OnceLock<Arc<LibraryResolver>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| Arc::new(LibraryResolver::new(Arc::new(OrtLibraryFetcher))))
            .clone()
    }

    /// Process-wide default directory consulted after explicit sources.
    pub fn set_default_dir(&self, dir: impl Into<PathBuf>) {
        *self.default_dir.lock().unwrap() = Some(dir.into());
    }

    /// Ensures both runtime libraries are present and the runtime reports
    /// ready. Idempotent; concurrent callers share one attempt.
    pub fn ensure_loaded(
        &self,
        lib_sources: &HashMap<String, LibrarySource>,
        offline_only: bool,
    ) -> Result<(), DependencyError> {
        enum Role {
            Run(Arc<LoadAttempt>),
            Wait(Arc<LoadAttempt>),
        }

        let role = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                LoadState::Loaded => return Ok(()),
                LoadState::Loading(attempt) => Role::Wait(attempt.clone()),
                LoadState::NotLoaded => {
                    let attempt = Arc::new(LoadAttempt::new());
                    *state = LoadState::Loading(attempt.clone());
                    Role::Run(attempt)
                }
            }
        };

        match role {
            Role::Wait(attempt) => attempt.wait(),
            Role::Run(attempt) => {
                let result = self.load_all(lib_sources, offline_only);
                // Publish state before waking waiters so no caller can
                // observe Loading with a finished attempt.
                *self.state.lock().unwrap() = match result {
                    Ok(()) => LoadState::Loaded,
                    Err(_) => LoadState::NotLoaded,
                };
                attempt.finish(result.clone());
                result
            }
        }
    }

    fn load_all(
        &self,
        lib_sources: &HashMap<String, LibrarySource>,
        offline_only: bool,
    ) -> Result<(), DependencyError> {
        let runtime =
            self.resolve_library(ORT_RUNTIME_LIB, ORT_RUNTIME_LIB_URL, lib_sources, offline_only)?;
        self.resolve_library(
            ORT_PROVIDERS_LIB,
            ORT_PROVIDERS_LIB_URL,
            lib_sources,
            offline_only,
        )?;

        log::info!("runtime libraries resolved; activating {}", runtime.display());
        self.fetcher.activate(&runtime)
    }

    fn resolve_library(
        &self,
        name: &str,
        fallback_url: &str,
        lib_sources: &HashMap<String, LibrarySource>,
        offline_only: bool,
    ) -> Result<PathBuf, DependencyError> {
        if let Some(path) = self.fetcher.locate_ambient(name) {
            log::debug!("library {name} already present at {}", path.display());
            return Ok(path);
        }

        if let Some(source) = lib_sources.get(name) {
            return match source {
                LibrarySource::Path(path) => {
                    if path.exists() {
                        Ok(path.clone())
                    } else {
                        Err(DependencyError::Fetch {
                            name: name.to_string(),
                            reason: format!("{} does not exist", path.display()),
                        })
                    }
                }
                LibrarySource::Url(url) => {
                    let dest = self.download_dest(name)?;
                    self.fetcher.download(name, url, &dest)?;
                    Ok(dest)
                }
            };
        }

        if let Some(dir) = self.default_dir.lock().unwrap().as_ref() {
            let candidate = dir.join(lib_filename(name));
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        if offline_only {
            return Err(DependencyError::Unavailable(name.to_string()));
        }

        let dest = self.download_dest(name)?;
        self.fetcher.download(name, fallback_url, &dest)?;
        Ok(dest)
    }

    fn download_dest(&self, name: &str) -> Result<PathBuf, DependencyError> {
        lib_cache_dir()
            .map(|d| d.join(lib_filename(name)))
            .map_err(|e| DependencyError::Fetch {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}
