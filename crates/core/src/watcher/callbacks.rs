use crate::watcher::error::WatcherError;

pub type EventHandler = Box<dyn FnMut() + Send>;
pub type ErrorHandler = Box<dyn FnMut(&WatcherError) + Send>;

/// Single-slot callback table: one handler per event, last registration
/// wins. Deliberately not a multi-subscriber emitter — callers wanting
/// fan-out compose it themselves.
#[derive(Default)]
pub struct CallbackTable {
    pub(crate) on_initialized: Option<EventHandler>,
    pub(crate) on_face_detected: Option<EventHandler>,
    pub(crate) on_no_face: Option<EventHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
}

impl CallbackTable {
    pub(crate) fn fire_initialized(&mut self) {
        if let Some(handler) = self.on_initialized.as_mut() {
            handler();
        }
    }

    pub(crate) fn fire_face_detected(&mut self) {
        if let Some(handler) = self.on_face_detected.as_mut() {
            handler();
        }
    }

    pub(crate) fn fire_no_face(&mut self) {
        if let Some(handler) = self.on_no_face.as_mut() {
            handler();
        }
    }

    pub(crate) fn fire_error(&mut self, error: &WatcherError) {
        if let Some(handler) = self.on_error.as_mut() {
            handler(error);
        }
    }
}
