//! Completion detectors
//!
//! A [`CompletionDetector`] encapsulates everything that depends on how the
//! external tool behaves: how the file gets in, how completion is observed
//! and how the result comes back out. The controller only sequences the
//! three stages and bounds them with timeouts.
//!
//! - [`DomPollingDetector`]: scrapes rendered text and intercepts the
//!   download link
//! - [`MessageChannelDetector`]: waits for tagged notifications from a
//!   trusted origin

mod dom;
mod message;

pub use dom::{DomPollingDetector, DomPollingOptions};
pub use message::{MessageChannelDetector, ToolMessage};

use crate::error::CompileError;
use crate::session::CompilationSession;
use crate::surface::ElementId;
use async_trait::async_trait;
use itc_artifact::{CompilationRequest, CompiledArtifact};

/// What a detector observed when the tool finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A control that produces the download when activated
    DownloadControl(ElementId),
    /// A direct reference to the result
    ResultReference {
        href: String,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

/// Pluggable strategy for driving and observing the external tool
#[async_trait]
pub trait CompletionDetector: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Get the file into the tool and start compilation
    async fn submit(
        &self,
        session: &mut CompilationSession,
        request: &CompilationRequest,
    ) -> Result<(), CompileError>;

    /// Wait until the tool reports completion or failure
    async fn await_completion(
        &self,
        session: &mut CompilationSession,
    ) -> Result<Completion, CompileError>;

    /// Turn a completion into the artifact bytes
    async fn retrieve(
        &self,
        session: &mut CompilationSession,
        completion: Completion,
    ) -> Result<CompiledArtifact, CompileError>;
}

/// Fetch a reference through the surface and wrap it
pub(crate) async fn fetch_artifact(
    session: &CompilationSession,
    href: &str,
    filename: Option<String>,
    content_type: Option<String>,
    default_filename: &str,
) -> Result<CompiledArtifact, CompileError> {
    let resource = session
        .surface()?
        .fetch(href)
        .await
        .map_err(|e| CompileError::DownloadFailure(e.to_string()))?;
    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| default_filename.to_string());
    let artifact = CompiledArtifact::new(
        resource.bytes,
        Some(filename),
        content_type.or(resource.content_type),
    );
    tracing::info!(
        session = %session.id(),
        filename = artifact.filename(),
        bytes = artifact.len(),
        hash = %artifact.hash().short(),
        "artifact captured"
    );
    Ok(artifact)
}
