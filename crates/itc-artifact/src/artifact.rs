//! Compiled artifact returned by a successful session
//!
//! A [`CompiledArtifact`] is immutable once built. Its content hash is
//! computed at construction so that logs and callers can identify the
//! result without re-reading the bytes.

use crate::error::ArtifactError;
use crate::hash::ContentHash;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Filename used when the external tool does not declare one
pub const DEFAULT_FILENAME: &str = "compiled.mind";

/// Content type used when the external tool does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Binary result produced by the external compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledArtifact {
    #[serde(skip)]
    bytes: Bytes,
    filename: String,
    content_type: String,
    hash: ContentHash,
    produced_at: DateTime<Utc>,
}

impl CompiledArtifact {
    /// Wrap fetched bytes
    ///
    /// Empty or missing `filename`/`content_type` fall back to
    /// [`DEFAULT_FILENAME`] and [`DEFAULT_CONTENT_TYPE`].
    #[must_use]
    pub fn new(
        bytes: impl Into<Bytes>,
        filename: Option<String>,
        content_type: Option<String>,
    ) -> Self {
        let bytes = bytes.into();
        let hash = ContentHash::compute(&bytes);
        Self {
            bytes,
            filename: non_empty(filename.map(|f| base_name(&f)))
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            content_type: non_empty(content_type)
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            hash,
            produced_at: Utc::now(),
        }
    }

    /// Artifact bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Declared filename
    #[inline]
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Declared content type
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Content hash of the bytes
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// When the artifact was captured
    #[inline]
    #[must_use]
    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Build a presentable download reference
    ///
    /// The reference is self-contained (a `data:` URL) so it stays valid after
    /// the session that produced the artifact is gone. The reference is named
    /// `filename`, or [`DEFAULT_FILENAME`] when that is absent or blank; the
    /// artifact's declared name is not consulted.
    #[must_use]
    pub fn download_reference(&self, filename: Option<&str>) -> DownloadReference {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let href = format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        );
        DownloadReference { filename, href }
    }

    /// Write the artifact into `dir` under its filename
    ///
    /// # Errors
    /// Returns [`ArtifactError::Io`] if the write fails.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ArtifactError> {
        let path = dir.as_ref().join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Downloadable reference to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReference {
    /// Suggested filename
    pub filename: String,
    /// Self-contained URL carrying the bytes
    pub href: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Last path component, so a declared name cannot escape the save directory
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .filter(|n| *n != "." && *n != "..")
        .unwrap_or_default()
        .to_string()
}
