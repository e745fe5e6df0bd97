//! Testing utilities for ITC workspace
//!
//! A scriptable stand-in for the external compiler page. [`FakeTool`] holds
//! the script and the shared counters; [`FakeSurfaceFactory`] hands out
//! surfaces that all report into the same tool, so a test can check how many
//! surfaces were created, closed, and how many listeners were registered.

#![allow(missing_docs)]

use async_trait::async_trait;
use bytes::Bytes;
use itc_artifact::CompilationRequest;
use itc_core::{
    DownloadLink, ElementId, ElementSnapshot, EmbeddedSurface, FetchedResource,
    ImageTargetCompiler, InboundMessage, SurfaceError, SurfaceFactory, SurfaceSpec,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DROP_ZONE: &str = "drop-zone";
pub const FILE_INPUT: &str = "file-input";
pub const START_BUTTON: &str = "start-button";
pub const DOWNLOAD_BUTTON: &str = "download-button";
pub const ERROR_BANNER: &str = "error-banner";

/// Bytes served for the scripted download link
pub const MIND_BYTES: &[u8] = b"MIND\x00\x01compiled-target-data";

/// Href of the scripted download link
pub const RESULT_HREF: &str = "blob:https://tool.test/4f9c";

pub const TOOL_URL: &str = "https://tool.test/compile";
pub const TRUSTED_ORIGIN: &str = "https://tool.test";

/// How the page accepts the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAffordance {
    DropZone,
    FileInput,
    None,
}

/// Scripted behavior of the fake page
#[derive(Debug, Clone)]
pub struct ToolScript {
    pub upload: UploadAffordance,
    /// Label of the start button, if the page has one
    pub start_label: Option<String>,
    /// Visible text per inspection; the last entry repeats
    pub pages: Vec<String>,
    /// Inspection count at which the download control appears
    pub download_after: Option<usize>,
    /// Inspection count and text of the error banner
    pub error_after: Option<(usize, String)>,
    /// Link created when the download control is clicked
    pub link: Option<DownloadLink>,
    pub resources: HashMap<String, Bytes>,
    /// Messages posted to the host once the file arrives
    pub messages: Vec<InboundMessage>,
    pub fail_load: bool,
    pub never_loads: bool,
    /// Number of leading inspections that fail with an access error
    pub transient_failures: usize,
    /// Further controls on the page; only `button` tags match a bare button query
    pub extra_controls: Vec<ElementSnapshot>,
    /// Number of queries that see the download control before it disappears
    pub download_sightings: Option<usize>,
}

impl ToolScript {
    /// The happy path: drop zone, start button, 0% → 100%, download link
    #[must_use]
    pub fn happy_path() -> Self {
        let mut resources = HashMap::new();
        resources.insert(RESULT_HREF.to_string(), Bytes::from_static(MIND_BYTES));
        Self {
            upload: UploadAffordance::DropZone,
            start_label: Some("Start".into()),
            pages: vec!["Progress: 0%".into(), "Progress: 100%".into()],
            download_after: Some(2),
            error_after: None,
            link: Some(DownloadLink {
                href: RESULT_HREF.into(),
                filename: None,
            }),
            resources,
            messages: Vec::new(),
            fail_load: false,
            never_loads: false,
            transient_failures: 0,
            extra_controls: Vec::new(),
            download_sightings: None,
        }
    }

    /// Page that accepts the file and then never finishes
    #[must_use]
    pub fn stalls() -> Self {
        Self {
            pages: vec!["Progress: 10%".into()],
            download_after: None,
            ..Self::happy_path()
        }
    }

    /// Page that shows an error banner on the second inspection
    #[must_use]
    pub fn fails_with(text: &str) -> Self {
        Self {
            download_after: None,
            error_after: Some((2, text.to_string())),
            ..Self::happy_path()
        }
    }

    /// Page driven only through the message channel
    #[must_use]
    pub fn messaging(messages: Vec<InboundMessage>) -> Self {
        Self {
            upload: UploadAffordance::None,
            start_label: None,
            pages: Vec::new(),
            download_after: None,
            link: None,
            messages,
            ..Self::happy_path()
        }
    }
}

/// Counters observed across every surface of a tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolStats {
    pub surfaces_created: usize,
    pub surfaces_closed: usize,
    pub listeners_registered: usize,
    pub listeners_removed: usize,
    pub watches_started: usize,
    pub watches_stopped: usize,
    pub inspections: usize,
    pub clicks: Vec<String>,
    pub drops: usize,
    pub files_assigned: usize,
    pub changes: usize,
    pub files_posted: usize,
    pub download_sightings: usize,
    pub last_spec: Option<SurfaceSpec>,
}

#[derive(Debug)]
struct ToolState {
    script: ToolScript,
    stats: ToolStats,
    downloads: Option<mpsc::UnboundedSender<DownloadLink>>,
    messages: Option<mpsc::UnboundedSender<InboundMessage>>,
}

/// Shared handle to the fake page
#[derive(Debug, Clone)]
pub struct FakeTool {
    state: Arc<Mutex<ToolState>>,
}

impl FakeTool {
    #[must_use]
    pub fn new(script: ToolScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(ToolState {
                script,
                stats: ToolStats::default(),
                downloads: None,
                messages: None,
            })),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ToolStats {
        self.state.lock().stats.clone()
    }

    #[must_use]
    pub fn factory(&self) -> Arc<FakeSurfaceFactory> {
        Arc::new(FakeSurfaceFactory { tool: self.clone() })
    }

    /// Post a message to the host, as the page or any other window would
    ///
    /// Returns `false` if no listener is registered.
    pub fn post_to_host(&self, message: InboundMessage) -> bool {
        let state = self.state.lock();
        state
            .messages
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.state.lock().messages.is_some()
    }
}

/// Factory handing out surfaces backed by one [`FakeTool`]
#[derive(Debug)]
pub struct FakeSurfaceFactory {
    tool: FakeTool,
}

#[async_trait]
impl SurfaceFactory for FakeSurfaceFactory {
    async fn create(&self, spec: &SurfaceSpec) -> Result<Box<dyn EmbeddedSurface>, SurfaceError> {
        let mut state = self.tool.state.lock();
        state.stats.surfaces_created += 1;
        state.stats.last_spec = Some(spec.clone());
        Ok(Box::new(FakeSurface {
            tool: self.tool.clone(),
            closed: Mutex::new(false),
        }))
    }
}

/// One embedded surface of the fake page
#[derive(Debug)]
pub struct FakeSurface {
    tool: FakeTool,
    closed: Mutex<bool>,
}

impl FakeSurface {
    fn ensure_open(&self) -> Result<(), SurfaceError> {
        if *self.closed.lock() {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }

}

/// Snapshot of a page element whose class name equals its id
#[must_use]
pub fn element(id: &str, tag: &str, label: &str) -> ElementSnapshot {
    ElementSnapshot {
        id: ElementId::new(id),
        tag: tag.into(),
        label: label.into(),
        class_name: id.into(),
        ..ElementSnapshot::default()
    }
}

#[async_trait]
impl EmbeddedSurface for FakeSurface {
    async fn wait_loaded(&self) -> Result<(), SurfaceError> {
        let (fail, never) = {
            let state = self.tool.state.lock();
            (state.script.fail_load, state.script.never_loads)
        };
        if never {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(SurfaceError::Unavailable("page failed to load".into()));
        }
        Ok(())
    }

    async fn visible_text(&self) -> Result<String, SurfaceError> {
        self.ensure_open()?;
        let mut state = self.tool.state.lock();
        state.stats.inspections += 1;
        let tick = state.stats.inspections;
        if tick <= state.script.transient_failures {
            return Err(SurfaceError::AccessDenied("cross-origin frame".into()));
        }
        let pages = &state.script.pages;
        Ok(pages
            .get(tick.saturating_sub(1).min(pages.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementSnapshot>, SurfaceError> {
        self.ensure_open()?;
        let mut state = self.tool.state.lock();
        let state = &mut *state;
        let script = &state.script;
        let tick = state.stats.inspections;
        let mut found = Vec::new();

        if selector.contains("error") {
            if let Some((after, text)) = &script.error_after {
                if tick >= *after {
                    found.push(element(ERROR_BANNER, "div", text));
                }
            }
        } else if selector.contains("drop") {
            if script.upload == UploadAffordance::DropZone {
                found.push(element(DROP_ZONE, "div", "Drop an image here"));
            }
        } else if selector.contains(r#"type="file""#) {
            if script.upload == UploadAffordance::FileInput {
                found.push(element(FILE_INPUT, "input", ""));
            }
        } else if selector.contains("button") {
            let any_control = selector.contains("role");
            if let Some(label) = &script.start_label {
                found.push(element(START_BUTTON, "button", label));
            }
            found.extend(
                script
                    .extra_controls
                    .iter()
                    .filter(|c| any_control || c.tag == "button")
                    .cloned(),
            );
            let shown = script.download_after.is_some_and(|after| tick >= after)
                && script
                    .download_sightings
                    .map_or(true, |limit| state.stats.download_sightings < limit);
            if shown {
                state.stats.download_sightings += 1;
                found.push(element(DOWNLOAD_BUTTON, "button", "Download compiled"));
            }
        }
        Ok(found)
    }

    async fn drop_file(
        &self,
        target: &ElementId,
        _file: &CompilationRequest,
    ) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        if target.0 != DROP_ZONE {
            return Err(SurfaceError::StaleElement(target.0.clone()));
        }
        self.tool.state.lock().stats.drops += 1;
        Ok(())
    }

    async fn assign_file(
        &self,
        target: &ElementId,
        _file: &CompilationRequest,
    ) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        if target.0 != FILE_INPUT {
            return Err(SurfaceError::StaleElement(target.0.clone()));
        }
        self.tool.state.lock().stats.files_assigned += 1;
        Ok(())
    }

    async fn dispatch_change(&self, _target: &ElementId) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        self.tool.state.lock().stats.changes += 1;
        Ok(())
    }

    async fn click(&self, target: &ElementId) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        let mut state = self.tool.state.lock();
        state.stats.clicks.push(target.0.clone());
        if target.0 == DOWNLOAD_BUTTON {
            if let (Some(tx), Some(link)) = (&state.downloads, &state.script.link) {
                let _ = tx.send(link.clone());
            }
        }
        Ok(())
    }

    async fn watch_downloads(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<DownloadLink>, SurfaceError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.tool.state.lock();
        state.stats.watches_started += 1;
        state.downloads = Some(tx);
        Ok(rx)
    }

    async fn unwatch_downloads(&self) -> Result<(), SurfaceError> {
        let mut state = self.tool.state.lock();
        if state.downloads.take().is_some() {
            state.stats.watches_stopped += 1;
        }
        Ok(())
    }

    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundMessage>, SurfaceError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.tool.state.lock();
        state.stats.listeners_registered += 1;
        state.messages = Some(tx);
        Ok(rx)
    }

    async fn unlisten(&self) -> Result<(), SurfaceError> {
        let mut state = self.tool.state.lock();
        if state.messages.take().is_some() {
            state.stats.listeners_removed += 1;
        }
        Ok(())
    }

    async fn post_file(
        &self,
        _file: &CompilationRequest,
        _target_origin: &str,
    ) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        let mut state = self.tool.state.lock();
        state.stats.files_posted += 1;
        let scripted = state.script.messages.clone();
        if let Some(tx) = &state.messages {
            for message in scripted {
                let _ = tx.send(message);
            }
        }
        Ok(())
    }

    async fn fetch(&self, href: &str) -> Result<FetchedResource, SurfaceError> {
        self.ensure_open()?;
        let state = self.tool.state.lock();
        state
            .script
            .resources
            .get(href)
            .map(|bytes| FetchedResource {
                bytes: bytes.clone(),
                content_type: None,
            })
            .ok_or_else(|| SurfaceError::Fetch {
                href: href.to_string(),
                detail: "404".into(),
            })
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let mut closed = self.closed.lock();
        if *closed {
            return Err(SurfaceError::Closed);
        }
        *closed = true;
        let mut state = self.tool.state.lock();
        state.stats.surfaces_closed += 1;
        state.downloads = None;
        state.messages = None;
        Ok(())
    }
}

/// Message from `origin` with the given JSON body
#[must_use]
pub fn message(origin: &str, data: serde_json::Value) -> InboundMessage {
    InboundMessage {
        origin: origin.to_string(),
        data,
    }
}

/// Minimal JPEG request
#[must_use]
pub fn jpeg_request() -> CompilationRequest {
    CompilationRequest::new(
        "poster.jpg",
        "image/jpeg",
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9],
    )
}

/// Notification observed by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Progress(String),
    Complete(String),
    Error(String),
}

/// Records every callback of a controller, in order
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationLog {
    /// Register recording callbacks on `compiler`
    #[must_use]
    pub fn attach(compiler: &ImageTargetCompiler) -> Self {
        let log = Self::default();
        let events = Arc::clone(&log.events);
        compiler.on_progress(move |t| events.lock().push(Notification::Progress(t.to_string())));
        let events = Arc::clone(&log.events);
        compiler.on_complete(move |a| {
            events
                .lock()
                .push(Notification::Complete(a.filename().to_string()));
        });
        let events = Arc::clone(&log.events);
        compiler.on_error(move |m| events.lock().push(Notification::Error(m.to_string())));
        log
    }

    #[must_use]
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn progress(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Notification::Progress(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| !matches!(e, Notification::Progress(_)))
            .count()
    }
}
