//! [`EmbeddedSurface`] over a WebDriver session
//!
//! Each surface owns one browser session. The top-level page is blank and
//! hosts a single sandboxed iframe (frame 0) pointed at the tool. Download
//! and message capture run as background pollers that drain queues filled by
//! the injected scripts.

use crate::client::{FrameTarget, WebDriverClient};
use crate::config::WebDriverConfig;
use crate::error::WebDriverError;
use crate::scripts;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use itc_artifact::CompilationRequest;
use itc_core::{
    DownloadLink, ElementId, ElementSnapshot, EmbeddedSurface, FetchedResource, InboundMessage,
    SurfaceError, SurfaceFactory, SurfaceSpec,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const BLANK_HOST: &str = "about:blank";
const TOOL_FRAME: FrameTarget = FrameTarget::Index(0);

/// Opens one WebDriver session per surface
#[derive(Debug, Clone)]
pub struct WebDriverSurfaceFactory {
    config: WebDriverConfig,
}

impl WebDriverSurfaceFactory {
    #[must_use]
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }
}

#[async_trait]
impl SurfaceFactory for WebDriverSurfaceFactory {
    async fn create(&self, spec: &SurfaceSpec) -> Result<Box<dyn EmbeddedSurface>, SurfaceError> {
        let client = WebDriverClient::connect(&self.config)
            .await
            .map_err(|e| SurfaceError::Unavailable(e.to_string()))?;

        if let Err(e) = mount(&client, spec).await {
            if let Err(cleanup) = client.delete_session().await {
                tracing::warn!(error = %cleanup, "failed to delete session after mount failure");
            }
            return Err(e.into());
        }

        tracing::info!(
            session_id = client.session_id(),
            url = spec.url.as_str(),
            sandbox = spec.sandbox.to_attribute().as_str(),
            "tool frame mounted"
        );
        Ok(Box::new(WebDriverSurface::new(
            client,
            self.config.poll_interval(),
            spec.sandbox.allow_same_origin,
        )))
    }
}

async fn mount(client: &WebDriverClient, spec: &SurfaceSpec) -> Result<(), WebDriverError> {
    client.navigate(BLANK_HOST).await?;
    client
        .execute(
            scripts::HOST_MOUNT,
            vec![
                json!(spec.url),
                json!(spec.sandbox.to_attribute()),
                json!(spec.visible),
            ],
        )
        .await
        .map(drop)
}

/// Session shared between the surface and its pollers
#[derive(Debug)]
struct Shared {
    client: Mutex<WebDriverClient>,
    closed: AtomicBool,
}

impl Shared {
    /// Run a synchronous script in `target`
    ///
    /// The frame switch and the script run under one lock so pollers cannot
    /// interleave a switch of their own.
    async fn run(
        &self,
        target: FrameTarget,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SurfaceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SurfaceError::Closed);
        }
        let client = self.client.lock().await;
        enter(&client, target).await?;
        Ok(client.execute(script, args).await?)
    }

    async fn run_async(
        &self,
        target: FrameTarget,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SurfaceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SurfaceError::Closed);
        }
        let client = self.client.lock().await;
        enter(&client, target).await?;
        Ok(client.execute_async(script, args).await?)
    }

    async fn run_on(
        &self,
        target: &ElementId,
        script: &str,
        args: Vec<Value>,
    ) -> Result<(), SurfaceError> {
        let value = self.run(TOOL_FRAME, script, args).await?;
        if value.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(SurfaceError::StaleElement(target.to_string()))
        }
    }
}

async fn enter(client: &WebDriverClient, target: FrameTarget) -> Result<(), WebDriverError> {
    client.switch_frame(FrameTarget::Top).await?;
    if target != FrameTarget::Top {
        client.switch_frame(target).await?;
    }
    Ok(())
}

/// Tool page hosted in a sandboxed iframe of a WebDriver session
#[derive(Debug)]
pub struct WebDriverSurface {
    shared: Arc<Shared>,
    poll_interval: Duration,
    /// Frame keeps its own origin; otherwise it is opaque
    same_origin: bool,
    downloads: parking_lot::Mutex<Option<JoinHandle<()>>>,
    messages: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WebDriverSurface {
    fn new(client: WebDriverClient, poll_interval: Duration, same_origin: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                client: Mutex::new(client),
                closed: AtomicBool::new(false),
            }),
            poll_interval,
            same_origin,
            downloads: parking_lot::Mutex::new(None),
            messages: parking_lot::Mutex::new(None),
        }
    }

    /// Drain `script` every tick into `tx` until the receiver or session goes away
    fn spawn_poller<T>(
        &self,
        target: FrameTarget,
        script: &'static str,
        tx: mpsc::UnboundedSender<T>,
    ) -> JoinHandle<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    break;
                }
                match shared.run(target, script, Vec::new()).await {
                    Ok(value) => {
                        for item in drain::<T>(value) {
                            if tx.send(item).is_err() {
                                return;
                            }
                        }
                    }
                    Err(SurfaceError::Closed) => break,
                    Err(e) => tracing::debug!(error = %e, "poll failed, retrying"),
                }
            }
        })
    }

    fn stop(slot: &parking_lot::Mutex<Option<JoinHandle<()>>>) -> bool {
        match slot.lock().take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for WebDriverSurface {
    fn drop(&mut self) {
        Self::stop(&self.downloads);
        Self::stop(&self.messages);
    }
}

fn file_args(target: &ElementId, file: &CompilationRequest) -> Vec<Value> {
    vec![
        json!(target.0),
        json!(file.name()),
        json!(file.media_type()),
        json!(STANDARD.encode(file.bytes())),
    ]
}

/// `postMessage` target for the tool frame
///
/// An opaque-origin frame never matches a concrete origin, so it is addressed
/// with `"*"`.
fn post_target(same_origin: bool, tool_origin: &str) -> &str {
    if same_origin {
        tool_origin
    } else {
        "*"
    }
}

/// Items of a drained queue; malformed entries are skipped
fn drain<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct FetchReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    status: u16,
    #[serde(default, rename = "type")]
    content_type: Option<String>,
    #[serde(default)]
    data: String,
    #[serde(default)]
    error: Option<String>,
}

fn decode_fetch(href: &str, value: Value) -> Result<FetchedResource, SurfaceError> {
    let fetch_error = |detail: String| SurfaceError::Fetch {
        href: href.to_string(),
        detail,
    };
    let reply: FetchReply =
        serde_json::from_value(value).map_err(|e| fetch_error(format!("malformed reply: {e}")))?;
    if let Some(error) = reply.error {
        return Err(fetch_error(error));
    }
    if !reply.ok {
        return Err(fetch_error(format!("status {}", reply.status)));
    }
    let bytes = STANDARD
        .decode(reply.data.as_bytes())
        .map_err(|e| fetch_error(format!("invalid base64 body: {e}")))?;
    Ok(FetchedResource {
        bytes: Bytes::from(bytes),
        content_type: reply.content_type.filter(|t| !t.is_empty()),
    })
}

#[async_trait]
impl EmbeddedSurface for WebDriverSurface {
    async fn wait_loaded(&self) -> Result<(), SurfaceError> {
        loop {
            let loaded = self
                .shared
                .run(FrameTarget::Top, scripts::HOST_LOADED, Vec::new())
                .await?;
            if loaded.as_bool() == Some(true) {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn visible_text(&self) -> Result<String, SurfaceError> {
        let value = self
            .shared
            .run(TOOL_FRAME, scripts::FRAME_TEXT, Vec::new())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementSnapshot>, SurfaceError> {
        let value = self
            .shared
            .run(TOOL_FRAME, scripts::FRAME_QUERY, vec![json!(selector)])
            .await?;
        serde_json::from_value(value).map_err(|e| SurfaceError::Script(e.to_string()))
    }

    async fn drop_file(
        &self,
        target: &ElementId,
        file: &CompilationRequest,
    ) -> Result<(), SurfaceError> {
        self.shared
            .run_on(target, &scripts::frame_drop_file(), file_args(target, file))
            .await
    }

    async fn assign_file(
        &self,
        target: &ElementId,
        file: &CompilationRequest,
    ) -> Result<(), SurfaceError> {
        self.shared
            .run_on(target, &scripts::frame_assign_file(), file_args(target, file))
            .await
    }

    async fn dispatch_change(&self, target: &ElementId) -> Result<(), SurfaceError> {
        self.shared
            .run_on(target, scripts::FRAME_CHANGE, vec![json!(target.0)])
            .await
    }

    async fn click(&self, target: &ElementId) -> Result<(), SurfaceError> {
        self.shared
            .run_on(target, scripts::FRAME_CLICK, vec![json!(target.0)])
            .await
    }

    async fn watch_downloads(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<DownloadLink>, SurfaceError> {
        self.shared
            .run(TOOL_FRAME, scripts::FRAME_WATCH_DOWNLOADS, Vec::new())
            .await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = self.spawn_poller(TOOL_FRAME, scripts::FRAME_DRAIN_DOWNLOADS, tx);
        if let Some(previous) = self.downloads.lock().replace(task) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn unwatch_downloads(&self) -> Result<(), SurfaceError> {
        if !Self::stop(&self.downloads) {
            return Ok(());
        }
        self.shared
            .run(TOOL_FRAME, scripts::FRAME_UNWATCH_DOWNLOADS, Vec::new())
            .await
            .map(drop)
    }

    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundMessage>, SurfaceError> {
        self.shared
            .run(FrameTarget::Top, scripts::HOST_LISTEN, Vec::new())
            .await
            .map_err(|e| SurfaceError::Channel(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = self.spawn_poller(FrameTarget::Top, scripts::HOST_DRAIN_MESSAGES, tx);
        if let Some(previous) = self.messages.lock().replace(task) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn unlisten(&self) -> Result<(), SurfaceError> {
        if !Self::stop(&self.messages) {
            return Ok(());
        }
        self.shared
            .run(FrameTarget::Top, scripts::HOST_UNLISTEN, Vec::new())
            .await
            .map(drop)
    }

    async fn post_file(
        &self,
        file: &CompilationRequest,
        target_origin: &str,
    ) -> Result<(), SurfaceError> {
        let args = vec![
            json!(file.name()),
            json!(file.media_type()),
            json!(STANDARD.encode(file.bytes())),
            json!(post_target(self.same_origin, target_origin)),
        ];
        let posted = self
            .shared
            .run(FrameTarget::Top, scripts::HOST_POST_FILE, args)
            .await?;
        if posted.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(SurfaceError::Channel("tool frame has no content window".into()))
        }
    }

    async fn fetch(&self, href: &str) -> Result<FetchedResource, SurfaceError> {
        let value = self
            .shared
            .run_async(TOOL_FRAME, scripts::FRAME_FETCH, vec![json!(href)])
            .await?;
        decode_fetch(href, value)
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(SurfaceError::Closed);
        }
        Self::stop(&self.downloads);
        Self::stop(&self.messages);

        let client = self.shared.client.lock().await;
        client.delete_session().await?;
        tracing::debug!(session_id = client.session_id(), "webdriver session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn opaque_frame_is_posted_to_any_origin() {
        assert_eq!(post_target(false, "https://tool.test"), "*");
        assert_eq!(post_target(true, "https://tool.test"), "https://tool.test");
    }

    #[test]
    fn listener_maps_own_frame_origin() {
        assert!(scripts::HOST_MOUNT.contains("__itcToolOrigin"));
        assert!(scripts::HOST_LISTEN.contains("event.source === frame.contentWindow"));
        assert!(scripts::HOST_LISTEN.contains("event.origin === 'null'"));
    }

    #[test]
    fn drain_skips_malformed_entries() {
        let links: Vec<DownloadLink> = drain(json!([
            { "href": "blob:https://tool/1", "filename": "a.mind" },
            { "nope": true },
            { "href": "blob:https://tool/2", "filename": null },
        ]));
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].filename.as_deref(), Some("a.mind"));
        assert_eq!(links[1].filename, None);

        let none: Vec<DownloadLink> = drain(Value::Null);
        assert!(none.is_empty());
    }

    #[test]
    fn drain_reads_messages() {
        let messages: Vec<InboundMessage> = drain(json!([
            { "origin": "https://tool.test", "data": { "type": "progress" } },
        ]));
        assert_eq!(messages[0].origin, "https://tool.test");
        assert_eq!(messages[0].data["type"], "progress");
    }

    #[test]
    fn fetch_reply_decodes_body() {
        let value = json!({
            "ok": true,
            "status": 200,
            "type": "application/octet-stream",
            "data": STANDARD.encode(b"MIND"),
        });
        let resource = decode_fetch("blob:x", value).unwrap();
        assert_eq!(resource.bytes.as_ref(), b"MIND");
        assert_eq!(resource.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn fetch_reply_reports_failures() {
        let err =
            decode_fetch("blob:x", json!({ "error": "TypeError: Failed to fetch" })).unwrap_err();
        assert!(err.to_string().contains("Failed to fetch"));

        let err =
            decode_fetch("blob:x", json!({ "ok": false, "status": 404, "data": "" })).unwrap_err();
        assert!(err.to_string().contains("status 404"));

        let garbled = json!({ "ok": true, "status": 200, "data": "%%%" });
        let err = decode_fetch("blob:x", garbled).unwrap_err();
        assert!(matches!(err, SurfaceError::Fetch { .. }));
    }

    #[test]
    fn empty_content_type_is_dropped() {
        let value = json!({ "ok": true, "status": 200, "type": "", "data": "" });
        assert_eq!(decode_fetch("blob:x", value).unwrap().content_type, None);
    }

    #[test]
    fn file_args_carry_base64_payload() {
        let request = CompilationRequest::new("cat.png", "image/png", vec![1, 2, 3]);
        let args = file_args(&ElementId::new("itc-1"), &request);
        assert_eq!(args[0], "itc-1");
        assert_eq!(args[2], "image/png");
        assert_eq!(args[3], STANDARD.encode([1u8, 2, 3]));
    }
}
