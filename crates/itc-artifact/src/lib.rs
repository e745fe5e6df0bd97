//! ITC Artifact Model
//!
//! Data types exchanged with the image-target compiler automation:
//!
//! - [`CompilationRequest`]: the source image (name, media type, bytes)
//! - [`CompiledArtifact`]: the binary result recovered from the external tool
//! - [`ContentHash`]: 32-byte Blake3 hash identifying payloads
//! - [`DownloadReference`]: a self-contained, presentable link to an artifact
//!
//! # Example
//!
//! ```rust
//! use itc_artifact::{CompilationRequest, CompiledArtifact, DEFAULT_FILENAME};
//!
//! let request = CompilationRequest::new("poster.jpg", "image/jpeg", vec![0xFF, 0xD8]);
//! assert!(request.validate().is_ok());
//!
//! let artifact = CompiledArtifact::new(vec![1, 2, 3], None, None);
//! assert_eq!(artifact.filename(), DEFAULT_FILENAME);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod error;
mod hash;
mod request;

pub use artifact::{CompiledArtifact, DownloadReference, DEFAULT_CONTENT_TYPE, DEFAULT_FILENAME};
pub use error::ArtifactError;
pub use hash::{ContentHash, HashError};
pub use request::{is_image_media_type, CompilationRequest, UNKNOWN_MEDIA_TYPE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
