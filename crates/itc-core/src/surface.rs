//! Embedding abstraction
//!
//! An [`EmbeddedSurface`] is an isolated, non-visible browsing context that
//! hosts the external tool. The controller never talks to a browser directly;
//! it only uses the operations below, which keeps the fragile page heuristics
//! in the detectors and the browser plumbing in the backend.
//!
//! Two capabilities are scoped acquisitions that the caller must release:
//! [`EmbeddedSurface::watch_downloads`] / [`EmbeddedSurface::unwatch_downloads`]
//! and [`EmbeddedSurface::listen`] / [`EmbeddedSurface::unlisten`].
//! Closing the surface releases both.

use crate::error::SurfaceError;
use async_trait::async_trait;
use bytes::Bytes;
use itc_artifact::CompilationRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Sandbox capabilities granted to the embedded page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub allow_scripts: bool,
    pub allow_forms: bool,
    pub allow_same_origin: bool,
}

impl SandboxPolicy {
    /// Script execution and form submission, no origin trust
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            allow_scripts: true,
            allow_forms: true,
            allow_same_origin: false,
        }
    }

    /// Value of an iframe `sandbox` attribute
    #[must_use]
    pub fn to_attribute(&self) -> String {
        let mut tokens = Vec::new();
        if self.allow_scripts {
            tokens.push("allow-scripts");
        }
        if self.allow_forms {
            tokens.push("allow-forms");
        }
        if self.allow_same_origin {
            tokens.push("allow-same-origin");
        }
        tokens.join(" ")
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::minimal()
    }
}

/// What the factory should create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub url: String,
    pub sandbox: SandboxPolicy,
    pub visible: bool,
}

impl SurfaceSpec {
    /// Hidden surface with the minimal sandbox
    #[must_use]
    pub fn hidden(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sandbox: SandboxPolicy::minimal(),
            visible: false,
        }
    }
}

/// Opaque handle to an element inside the embedded document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl ElementId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view of an element, captured at query time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    pub id: ElementId,
    /// Lowercase tag name
    pub tag: String,
    /// Visible label: text content, value or aria-label
    pub label: String,
    pub class_name: String,
    pub element_id: String,
    /// Computed background color, if the backend reports one
    pub background: Option<String>,
}

/// A newly created downloadable reference inside the embedded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub href: String,
    /// Value of the link's `download` attribute
    pub filename: Option<String>,
}

/// A message posted by some window to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub origin: String,
    pub data: serde_json::Value,
}

/// Bytes behind a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Isolated browsing context hosting the external tool
#[async_trait]
pub trait EmbeddedSurface: Send + Sync {
    /// Resolve once the surface reports its load event
    async fn wait_loaded(&self) -> Result<(), SurfaceError>;

    /// Full visible text of the embedded document
    async fn visible_text(&self) -> Result<String, SurfaceError>;

    /// Elements matching a CSS selector, in document order
    async fn query(&self, selector: &str) -> Result<Vec<ElementSnapshot>, SurfaceError>;

    /// Synthesize a drag-and-drop of `file` onto `target`
    async fn drop_file(
        &self,
        target: &ElementId,
        file: &CompilationRequest,
    ) -> Result<(), SurfaceError>;

    /// Assign `file` to a file-selection input
    async fn assign_file(
        &self,
        target: &ElementId,
        file: &CompilationRequest,
    ) -> Result<(), SurfaceError>;

    /// Fire a bubbling `change` event at `target`
    async fn dispatch_change(&self, target: &ElementId) -> Result<(), SurfaceError>;

    /// Activate `target`
    async fn click(&self, target: &ElementId) -> Result<(), SurfaceError>;

    /// Start reporting newly created downloadable links
    async fn watch_downloads(&self)
        -> Result<mpsc::UnboundedReceiver<DownloadLink>, SurfaceError>;

    /// Stop reporting downloadable links
    async fn unwatch_downloads(&self) -> Result<(), SurfaceError>;

    /// Register the host-level message listener
    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundMessage>, SurfaceError>;

    /// Deregister the host-level message listener
    async fn unlisten(&self) -> Result<(), SurfaceError>;

    /// Send the source file into the embedded page
    ///
    /// `target_origin` is the origin the page is served from. A backend whose
    /// frame has an opaque origin addresses the frame directly instead, since
    /// the browser would drop a message restricted to the nominal origin.
    async fn post_file(
        &self,
        file: &CompilationRequest,
        target_origin: &str,
    ) -> Result<(), SurfaceError>;

    /// Fetch the bytes behind a reference, from inside the embedded context
    async fn fetch(&self, href: &str) -> Result<FetchedResource, SurfaceError>;

    /// Remove the surface
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Creates embedded surfaces
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    /// Create a new, isolated surface pointed at `spec.url`
    async fn create(&self, spec: &SurfaceSpec) -> Result<Box<dyn EmbeddedSurface>, SurfaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_sandbox_withholds_origin_trust() {
        assert_eq!(SandboxPolicy::minimal().to_attribute(), "allow-scripts allow-forms");
        let spec = SurfaceSpec::hidden("https://tool.test/compile");
        assert!(!spec.visible);
        assert!(!spec.sandbox.allow_same_origin);
    }

    #[test]
    fn snapshot_reads_camel_case() {
        let snapshot: ElementSnapshot = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "tag": "button",
            "label": "Start",
            "className": "btn primary",
            "elementId": "",
            "background": "rgb(37, 194, 160)"
        }))
        .unwrap();
        assert_eq!(snapshot.id, ElementId::new("e1"));
        assert_eq!(snapshot.class_name, "btn primary");
    }
}
