//! Error types for ITC Core
//!
//! Every rejected session carries exactly one [`CompileError`]. Backends
//! report their own failures as [`SurfaceError`]; the controller and the
//! detectors decide which [`FailureReason`] a surface failure maps to
//! depending on the stage it happened in.

use serde::Serialize;
use std::fmt;

/// Main compile error type
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Missing, malformed or non-image input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedded surface could not be created or never finished loading
    #[error("load failure: {0}")]
    LoadFailure(String),

    /// No recognizable upload affordance in the external tool
    #[error("interaction failure: {0}")]
    InteractionFailure(String),

    /// The external tool itself reported an error
    #[error("external tool error: {0}")]
    ExternalError(String),

    /// A wall-clock ceiling was exceeded
    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: Stage, after_ms: u64 },

    /// Download control missing or the result bytes could not be fetched
    #[error("download failure: {0}")]
    DownloadFailure(String),
}

impl CompileError {
    /// Tag of this failure
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidInput(_) => FailureReason::InvalidInput,
            Self::LoadFailure(_) => FailureReason::LoadFailure,
            Self::InteractionFailure(_) => FailureReason::InteractionFailure,
            Self::ExternalError(_) => FailureReason::ExternalError,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::DownloadFailure(_) => FailureReason::DownloadFailure,
        }
    }

    /// Check if a fresh attempt could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LoadFailure(_) | Self::Timeout { .. } | Self::DownloadFailure(_)
        )
    }

    pub(crate) fn timeout(stage: Stage, after: std::time::Duration) -> Self {
        Self::Timeout {
            stage,
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Tagged failure condition attached to every rejected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidInput,
    LoadFailure,
    InteractionFailure,
    ExternalError,
    Timeout,
    DownloadFailure,
}

/// Stage of a session, used to label timeouts and spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for the surface's load signal
    Load,
    /// Upload, trigger, monitor and retrieve under the global ceiling
    Session,
    /// Polling for progress and completion
    Monitor,
    /// Capturing and fetching the result
    Retrieval,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Session => "session",
            Self::Monitor => "monitor",
            Self::Retrieval => "retrieval",
        };
        f.write_str(name)
    }
}

/// Errors reported by an embedding backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurfaceError {
    /// Backend could not be reached or refused the request
    #[error("surface unavailable: {0}")]
    Unavailable(String),

    /// The embedded document refused access (e.g. cross-origin)
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A script or synthesized event failed inside the document
    #[error("script failed: {0}")]
    Script(String),

    /// Element handle no longer refers to a live element
    #[error("stale element: {0}")]
    StaleElement(String),

    /// Resource behind a reference could not be fetched
    #[error("fetch failed for {href}: {detail}")]
    Fetch { href: String, detail: String },

    /// Message or download channel could not be registered
    #[error("channel error: {0}")]
    Channel(String),

    /// Surface was already closed
    #[error("surface closed")]
    Closed,
}
