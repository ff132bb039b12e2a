use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::domain::capture_provider::CaptureHandle;
use crate::detection::infrastructure::model_registry::ModelHandle;
use crate::shared::surface::FrameSurface;
use crate::watcher::callbacks::CallbackTable;
use crate::watcher::error::WatcherError;

/// The capture handle and its processing surface, created during
/// initialization and released on destroy.
pub struct CaptureSession {
    pub handle: Box<dyn CaptureHandle>,
    pub surface: FrameSurface,
}

/// Everything the detect loop thread needs, cloned out of the watcher at
/// spawn time so the loop never touches watcher internals directly.
pub struct LoopContext {
    pub session: Arc<Mutex<Option<CaptureSession>>>,
    pub model: ModelHandle,
    pub callbacks: Arc<Mutex<CallbackTable>>,
    pub stop: Arc<AtomicBool>,
    pub interval: Duration,
    pub debug: bool,
}

pub fn spawn(ctx: LoopContext) -> JoinHandle<()> {
    thread::spawn(move || run(ctx))
}

/// One tick at a time: poll, dispatch, sleep, repeat. The sleep happens
/// after the tick's work completes, so ticks never overlap; the stop flag
/// is cooperative and an in-flight tick always finishes.
fn run(ctx: LoopContext) {
    log::debug!("detect loop started (interval {:?})", ctx.interval);

    loop {
        if ctx.stop.load(Ordering::SeqCst) {
            break;
        }

        match poll_once(&ctx.session, &ctx.model) {
            Ok(Some(true)) => {
                if ctx.debug {
                    log::trace!("tick: face present");
                }
                ctx.callbacks.lock().unwrap().fire_face_detected();
            }
            Ok(Some(false)) => {
                if ctx.debug {
                    log::trace!("tick: no face");
                }
                ctx.callbacks.lock().unwrap().fire_no_face();
            }
            Ok(None) => {
                if ctx.debug {
                    log::trace!("tick: source not producing frames");
                }
            }
            Err(e) => {
                // Tick errors reach the error callback only; the loop
                // keeps going.
                log::debug!("tick failed: {e}");
                ctx.callbacks.lock().unwrap().fire_error(&e);
            }
        }

        if ctx.stop.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(ctx.interval);
    }

    log::debug!("detect loop exited");
}

/// Runs one detection pass: pull a frame, paint the surface, infer.
///
/// `Ok(None)` means the source produced no readable frame; callers skip
/// the tick without treating it as an error.
pub fn poll_once(
    session: &Mutex<Option<CaptureSession>>,
    model: &ModelHandle,
) -> Result<Option<bool>, WatcherError> {
    let mut guard = session.lock().unwrap();
    let session = guard.as_mut().ok_or(WatcherError::SurfaceNotReady)?;

    let Some(frame) = session.handle.read_frame()? else {
        return Ok(None);
    };

    // The surface resizes itself when the source dimensions change.
    session.surface.paint(&frame);

    let mut model = model.lock().unwrap();
    let faces = model
        .detect(&session.surface)
        .map_err(|e| WatcherError::Detection(e.to_string()))?;

    Ok(Some(!faces.is_empty()))
}
