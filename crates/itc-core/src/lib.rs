//! ITC Core - Image Target Compiler controller
//!
//! Automates a third-party image-target compiler page:
//! - Hosts the page in a hidden, sandboxed [`EmbeddedSurface`]
//! - Uploads the source image and starts compilation
//! - Observes progress and completion through a pluggable
//!   [`CompletionDetector`] (DOM polling or message channel)
//! - Recovers the produced artifact and tears everything down
//!
//! # Example
//!
//! ```rust,ignore
//! use itc_core::{CompilerConfig, ImageTargetCompiler};
//! use itc_artifact::CompilationRequest;
//!
//! # use std::sync::Arc;
//! # async fn example(factory: Arc<dyn itc_core::SurfaceFactory>) -> anyhow::Result<()> {
//! let compiler = ImageTargetCompiler::new(CompilerConfig::new(), factory);
//! compiler.on_progress(|text| println!("{text}"));
//!
//! let request = CompilationRequest::from_path("poster.jpg")?;
//! let artifact = compiler.compile(request).await?;
//! artifact.save_to(".")?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod notify;
pub mod observability;
pub mod session;
pub mod surface;

pub use config::{
    CompilerConfig, ConfigError, DetectorKind, DEFAULT_TOOL_URL, DEFAULT_TRUSTED_ORIGIN,
};
pub use controller::ImageTargetCompiler;
pub use detector::{
    Completion, CompletionDetector, DomPollingDetector, DomPollingOptions,
    MessageChannelDetector, ToolMessage,
};
pub use error::{CompileError, FailureReason, Stage, SurfaceError};
pub use notify::ProgressSink;
pub use session::{CompilationSession, SessionId};
pub use surface::{
    DownloadLink, ElementId, ElementSnapshot, EmbeddedSurface, FetchedResource, InboundMessage,
    SandboxPolicy, SurfaceFactory, SurfaceSpec,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with ITC Core
    pub use crate::{
        CompileError, CompilerConfig, DetectorKind, EmbeddedSurface, ImageTargetCompiler,
        SurfaceFactory,
    };
    pub use itc_artifact::{CompilationRequest, CompiledArtifact};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
