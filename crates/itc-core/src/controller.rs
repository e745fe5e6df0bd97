//! Image Target Compiler controller
//!
//! Sequences one compilation:
//! 1. Validate the request
//! 2. Create a hidden, sandboxed surface and wait for it to settle
//! 3. Run the detector's submit / await / retrieve stages under the
//!    global ceiling (retrieval also under its own ceiling)
//! 4. Tear the session down
//! 5. Deliver exactly one terminal notification

use crate::config::{CompilerConfig, DetectorKind};
use crate::detector::{
    CompletionDetector, DomPollingDetector, DomPollingOptions, MessageChannelDetector,
};
use crate::error::{CompileError, Stage};
use crate::notify::{Callbacks, ProgressSink};
use crate::observability::compile_span;
use crate::session::CompilationSession;
use crate::surface::{SurfaceFactory, SurfaceSpec};
use itc_artifact::{CompilationRequest, CompiledArtifact};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::Instrument;

/// Drives the external compiler tool
///
/// One call at a time per instance; concurrent `compile` calls on the same
/// instance are not arbitrated.
pub struct ImageTargetCompiler {
    config: CompilerConfig,
    factory: Arc<dyn SurfaceFactory>,
    detector: Arc<dyn CompletionDetector>,
    callbacks: RwLock<Callbacks>,
    last_result: RwLock<Option<CompiledArtifact>>,
}

impl ImageTargetCompiler {
    /// Create a controller using the detector named by `config.strategy`
    #[must_use]
    pub fn new(config: CompilerConfig, factory: Arc<dyn SurfaceFactory>) -> Self {
        let detector: Arc<dyn CompletionDetector> = match config.strategy {
            DetectorKind::DomPolling => {
                Arc::new(DomPollingDetector::new(DomPollingOptions::from(&config)))
            }
            DetectorKind::MessageChannel => Arc::new(MessageChannelDetector::from_config(&config)),
        };
        Self::with_detector(config, factory, detector)
    }

    /// Create a controller with a custom detector
    #[must_use]
    pub fn with_detector(
        config: CompilerConfig,
        factory: Arc<dyn SurfaceFactory>,
        detector: Arc<dyn CompletionDetector>,
    ) -> Self {
        Self {
            config,
            factory,
            detector,
            callbacks: RwLock::new(Callbacks::default()),
            last_result: RwLock::new(None),
        }
    }

    /// Register the progress callback
    pub fn on_progress(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.write().progress = Some(Arc::new(callback));
    }

    /// Register the completion callback
    pub fn on_complete(&self, callback: impl Fn(&CompiledArtifact) + Send + Sync + 'static) {
        self.callbacks.write().complete = Some(Arc::new(callback));
    }

    /// Register the error callback
    pub fn on_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.write().error = Some(Arc::new(callback));
    }

    /// Artifact of the most recent successful call
    #[must_use]
    pub fn last_result(&self) -> Option<CompiledArtifact> {
        self.last_result.read().clone()
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn detector(&self) -> &dyn CompletionDetector {
        self.detector.as_ref()
    }

    /// Compile `request` through the external tool
    ///
    /// # Errors
    /// Returns the [`CompileError`] of the first failing stage. The session is
    /// torn down before this returns, on every path.
    pub async fn compile(
        &self,
        request: CompilationRequest,
    ) -> Result<CompiledArtifact, CompileError> {
        let callbacks = self.callbacks.read().clone();
        let span = compile_span(&request, self.detector.name());

        async {
            let result = self.run(&request, &callbacks).await;
            match &result {
                Ok(artifact) => {
                    tracing::info!(bytes = artifact.len(), "compilation succeeded");
                    *self.last_result.write() = Some(artifact.clone());
                    callbacks.complete(artifact);
                }
                Err(e) => {
                    tracing::error!(reason = ?e.reason(), error = %e, "compilation failed");
                    callbacks.error(&e.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &CompilationRequest,
        callbacks: &Callbacks,
    ) -> Result<CompiledArtifact, CompileError> {
        request
            .validate()
            .map_err(|e| CompileError::InvalidInput(e.to_string()))?;

        let progress = ProgressSink::new(callbacks.progress.clone());
        progress.emit("Loading compiler");
        let spec = SurfaceSpec::hidden(&self.config.tool_url);
        let surface = self
            .factory
            .create(&spec)
            .await
            .map_err(|e| CompileError::LoadFailure(e.to_string()))?;

        let mut session = CompilationSession::new(surface, progress);
        tracing::Span::current().record("session", tracing::field::display(session.id()));
        tracing::info!(url = spec.url.as_str(), "surface created");

        let outcome = self.drive(&mut session, request).await;
        session.teardown().await;
        outcome
    }

    async fn drive(
        &self,
        session: &mut CompilationSession,
        request: &CompilationRequest,
    ) -> Result<CompiledArtifact, CompileError> {
        let load_timeout = self.config.load_timeout();
        match timeout(load_timeout, session.surface()?.wait_loaded()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CompileError::LoadFailure(e.to_string())),
            Err(_) => return Err(CompileError::timeout(Stage::Load, load_timeout)),
        }
        sleep(self.config.settle_delay()).await;
        session.progress().emit("Compiler ready");

        let global = self.config.global_timeout();
        timeout(global, self.stages(session, request))
            .await
            .unwrap_or_else(|_| Err(CompileError::timeout(Stage::Session, global)))
    }

    async fn stages(
        &self,
        session: &mut CompilationSession,
        request: &CompilationRequest,
    ) -> Result<CompiledArtifact, CompileError> {
        self.detector.submit(session, request).await?;
        tracing::debug!(session = %session.id(), "submitted");

        let completion = self.detector.await_completion(session).await?;
        session.progress().emit("Compilation complete");

        let retrieval = self.config.retrieval_timeout();
        timeout(retrieval, self.detector.retrieve(session, completion))
            .await
            .unwrap_or_else(|_| Err(CompileError::timeout(Stage::Retrieval, retrieval)))
    }
}

impl std::fmt::Debug for ImageTargetCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTargetCompiler")
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .field("callbacks", &*self.callbacks.read())
            .finish_non_exhaustive()
    }
}
