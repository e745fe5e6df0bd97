//! Single-use compilation session
//!
//! A session owns the embedded surface for one `compile` call, at most one
//! message-listener registration and at most one download watch.
//! [`CompilationSession::teardown`] releases all three; it is idempotent, so
//! the controller can call it unconditionally on every exit path without
//! double-closing anything.

use crate::error::{CompileError, SurfaceError};
use crate::notify::ProgressSink;
use crate::surface::{DownloadLink, EmbeddedSurface, InboundMessage};
use tokio::sync::mpsc;
use ulid::Ulid;

/// Unique session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one `compile` call
pub struct CompilationSession {
    id: SessionId,
    surface: Option<Box<dyn EmbeddedSurface>>,
    listener: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    listener_registered: bool,
    watching_downloads: bool,
    progress: ProgressSink,
}

impl CompilationSession {
    pub(crate) fn new(surface: Box<dyn EmbeddedSurface>, progress: ProgressSink) -> Self {
        Self {
            id: SessionId::new(),
            surface: Some(surface),
            listener: None,
            listener_registered: false,
            watching_downloads: false,
            progress,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The live surface
    ///
    /// # Errors
    /// Returns [`CompileError::LoadFailure`] once the session is torn down
    pub fn surface(&self) -> Result<&dyn EmbeddedSurface, CompileError> {
        self.surface
            .as_deref()
            .ok_or_else(|| CompileError::LoadFailure(SurfaceError::Closed.to_string()))
    }

    /// Handle for emitting progress from this session
    #[must_use]
    pub fn progress(&self) -> ProgressSink {
        self.progress.clone()
    }

    /// Register the message listener on the surface
    ///
    /// # Errors
    /// Returns [`CompileError::InteractionFailure`] if a listener is already
    /// registered or the surface refuses the registration
    pub async fn register_listener(&mut self) -> Result<(), CompileError> {
        if self.listener_registered {
            return Err(CompileError::InteractionFailure(
                "message listener already registered for this session".into(),
            ));
        }
        let receiver = self
            .surface()?
            .listen()
            .await
            .map_err(|e| CompileError::InteractionFailure(e.to_string()))?;
        self.listener = Some(receiver);
        self.listener_registered = true;
        tracing::debug!(session = %self.id, "message listener registered");
        Ok(())
    }

    /// The registered listener's receiving end
    pub fn listener_mut(&mut self) -> Option<&mut mpsc::UnboundedReceiver<InboundMessage>> {
        self.listener.as_mut()
    }

    /// Open the download watch on the surface
    ///
    /// The watch is recorded before the surface is asked, and stays recorded
    /// until [`Self::unwatch_downloads`] or teardown, so a stage dropped by a
    /// timeout cannot leak it.
    ///
    /// # Errors
    /// Returns [`CompileError::DownloadFailure`] if the surface refuses it
    pub async fn watch_downloads(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<DownloadLink>, CompileError> {
        let surface = self
            .surface
            .as_deref()
            .ok_or_else(|| CompileError::LoadFailure(SurfaceError::Closed.to_string()))?;
        self.watching_downloads = true;
        match surface.watch_downloads().await {
            Ok(links) => Ok(links),
            Err(e) => {
                self.watching_downloads = false;
                Err(CompileError::DownloadFailure(e.to_string()))
            }
        }
    }

    /// Close the download watch, if open
    pub async fn unwatch_downloads(&mut self) {
        if !std::mem::take(&mut self.watching_downloads) {
            return;
        }
        let Some(surface) = self.surface.as_deref() else {
            return;
        };
        if let Err(e) = surface.unwatch_downloads().await {
            tracing::warn!(session = %self.id, error = %e, "failed to stop download watch");
        }
    }

    /// Check if teardown already ran
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.surface.is_none()
    }

    /// Stop the download watch, deregister the listener and remove the surface
    ///
    /// Failures are logged, never returned: the outcome of the call is
    /// already decided when teardown runs.
    pub async fn teardown(&mut self) {
        self.progress.deactivate();
        self.unwatch_downloads().await;
        let Some(surface) = self.surface.take() else {
            return;
        };

        self.listener = None;
        if std::mem::take(&mut self.listener_registered) {
            if let Err(e) = surface.unlisten().await {
                tracing::warn!(session = %self.id, error = %e, "failed to deregister listener");
            }
        }
        if let Err(e) = surface.close().await {
            tracing::warn!(session = %self.id, error = %e, "failed to remove surface");
        }
        tracing::debug!(session = %self.id, "session torn down");
    }
}

impl std::fmt::Debug for CompilationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationSession")
            .field("id", &self.id)
            .field("torn_down", &self.is_torn_down())
            .field("listener_registered", &self.listener_registered)
            .field("watching_downloads", &self.watching_downloads)
            .finish()
    }
}
