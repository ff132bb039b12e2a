use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::model_source::{ModelArtifact, ModelSource};
use crate::shared::constants::BLAZEFACE_MODEL_NAME;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Picks the model source for a load attempt from the three caller-visible
/// tiers, in priority order: the config's explicit source, then the
/// registry-wide default override, then an injected in-memory artifact.
/// Returns `None` when the loader should fall through to the bundled file
/// or the built-in remote location.
pub fn select_source(
    explicit: Option<&ModelSource>,
    default_override: Option<&ModelSource>,
    embedded: Option<&ModelArtifact>,
) -> Option<ModelSource> {
    if let Some(source) = explicit {
        return Some(source.clone());
    }
    if let Some(source) = default_override {
        return Some(source.clone());
    }
    embedded
        .cloned()
        .map(ModelSource::Embedded)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceWatch/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceWatch/models/` or `~/.cache/FaceWatch/models/`
/// - Windows: `%LOCALAPPDATA%/FaceWatch/models/`
pub fn model_cache_dir() -> Result<PathBuf, FetchError> {
    app_dir().map(|d| d.join("models"))
}

pub(crate) fn app_dir() -> Result<PathBuf, FetchError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceWatch"))
            .ok_or(FetchError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceWatch"))
            .ok_or(FetchError::NoCacheDir)
    }
}

/// Bundled model file, for pre-packaged installs: a `models/` directory
/// next to the running executable.
pub fn bundled_model_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join("models").join(BLAZEFACE_MODEL_NAME);
    candidate.exists().then_some(candidate)
}

/// Resolves a URL source to a local file, reusing a previous download when
/// one is already in the cache.
pub fn resolve_url(url: &str, progress: Option<ProgressFn>) -> Result<PathBuf, FetchError> {
    let cache_dir = model_cache_dir()?;
    let name = url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or(BLAZEFACE_MODEL_NAME);
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    fs::create_dir_all(&cache_dir).map_err(FetchError::CacheDir)?;
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Streams `url` to `dest`, writing through a `.part` file that is renamed
/// into place only on success so the cache never holds a truncated model.
pub fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), FetchError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), FetchError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| FetchError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(|e| FetchError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    // Stream in chunks: models can be large and Content-Length gives the
    // progress callback something accurate to report.
    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| FetchError::Write {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(|e| FetchError::Write {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| FetchError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| FetchError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
