//! Caller notifications
//!
//! Callbacks are snapshotted at the start of every `compile` call. Progress
//! goes through a [`ProgressSink`] tied to the session's lifetime, so a
//! notification raised after teardown is dropped instead of reaching the
//! caller out of order.

use itc_artifact::CompiledArtifact;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives human-readable progress text
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives the artifact of a successful call
pub type CompleteCallback = Arc<dyn Fn(&CompiledArtifact) + Send + Sync>;

/// Receives the error message of a failed call
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Registered caller callbacks
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) complete: Option<CompleteCallback>,
    pub(crate) error: Option<ErrorCallback>,
}

impl Callbacks {
    pub(crate) fn complete(&self, artifact: &CompiledArtifact) {
        if let Some(cb) = &self.complete {
            cb(artifact);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        if let Some(cb) = &self.error {
            cb(message);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("progress", &self.progress.is_some())
            .field("complete", &self.complete.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Progress emitter scoped to one session
#[derive(Clone)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
    active: Arc<AtomicBool>,
}

impl ProgressSink {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Forward `text` if the session is still live
    pub fn emit(&self, text: &str) {
        if !self.active.load(Ordering::Acquire) {
            tracing::trace!(text, "dropping progress after teardown");
            return;
        }
        tracing::debug!(text, "progress");
        if let Some(cb) = &self.callback {
            cb(text);
        }
    }

    /// Check if the owning session is still live
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn sink_stops_after_deactivate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let sink = ProgressSink::new(Some(Arc::new(move |t: &str| {
            seen_cb.lock().push(t.to_string());
        })));
        let late = sink.clone();

        sink.emit("Progress: 10%");
        sink.deactivate();
        late.emit("Progress: 20%");

        assert_eq!(*seen.lock(), vec!["Progress: 10%".to_string()]);
        assert!(!late.is_active());
    }
}
