//! DOM polling detector
//!
//! Best-effort observation of a page we do not control. Every heuristic in
//! here (selector fragments, label keywords, accent colors, the progress text
//! pattern) mirrors what the external tool currently renders; when the tool
//! changes, this detector degrades to `InteractionFailure` or `Timeout`.

use super::{fetch_artifact, Completion, CompletionDetector};
use crate::config::CompilerConfig;
use crate::error::{CompileError, Stage, SurfaceError};
use crate::notify::ProgressSink;
use crate::session::CompilationSession;
use crate::surface::{ElementSnapshot, EmbeddedSurface};
use async_trait::async_trait;
use itc_artifact::{CompilationRequest, CompiledArtifact};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const UPLOAD_AFFORDANCE_SELECTOR: &str =
    r#"[class*="drop"], [id*="drop"], [class*="upload"], [id*="upload"]"#;
const FILE_INPUT_SELECTOR: &str = r#"input[type="file"]"#;
const BUTTON_SELECTOR: &str = "button";
const CONTROL_SELECTOR: &str =
    r#"button, a, [role="button"], input[type="button"], input[type="submit"]"#;
const ERROR_SELECTOR: &str = r#"[class*="error"], [id*="error"], [role="alert"]"#;

static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)progress:\s*(\d{1,3}(?:\.\d+)?)\s*%").expect("progress pattern is valid")
});

/// Tunables for [`DomPollingDetector`]
#[derive(Debug, Clone)]
pub struct DomPollingOptions {
    pub trigger_delay: Duration,
    pub poll_interval: Duration,
    /// Upper bound on inspections before giving up
    pub max_ticks: u64,
    pub retrieval_timeout: Duration,
    pub accent_colors: Vec<String>,
    pub default_filename: String,
}

impl From<&CompilerConfig> for DomPollingOptions {
    fn from(config: &CompilerConfig) -> Self {
        Self {
            trigger_delay: config.trigger_delay(),
            poll_interval: config.poll_interval(),
            max_ticks: config.max_poll_ticks(),
            retrieval_timeout: config.retrieval_timeout(),
            accent_colors: config.accent_colors.clone(),
            default_filename: config.default_filename.clone(),
        }
    }
}

/// Drives the tool through synthesized input and scrapes its DOM
#[derive(Debug)]
pub struct DomPollingDetector {
    options: DomPollingOptions,
    accents: Vec<(u8, u8, u8)>,
}

/// Outcome of a single inspection
enum Tick {
    Pending,
    Complete(Completion),
    Failed(String),
}

impl DomPollingDetector {
    #[must_use]
    pub fn new(options: DomPollingOptions) -> Self {
        let accents = options
            .accent_colors
            .iter()
            .filter_map(|c| parse_color(c))
            .collect();
        Self { options, accents }
    }

    async fn upload(
        &self,
        surface: &dyn EmbeddedSurface,
        request: &CompilationRequest,
    ) -> Result<(), CompileError> {
        let zones = surface
            .query(UPLOAD_AFFORDANCE_SELECTOR)
            .await
            .map_err(interaction)?;
        if let Some(zone) = zones.first() {
            match surface.drop_file(&zone.id, request).await {
                Ok(()) => {
                    tracing::debug!(target_el = %zone.id, "dropped file onto upload affordance");
                    return Ok(());
                }
                Err(e) => tracing::warn!(error = %e, "drop rejected, trying file input"),
            }
        }

        let inputs = surface.query(FILE_INPUT_SELECTOR).await.map_err(interaction)?;
        let input = inputs.first().ok_or_else(|| {
            CompileError::InteractionFailure("no upload affordance or file input found".into())
        })?;
        surface
            .assign_file(&input.id, request)
            .await
            .map_err(interaction)?;
        surface.dispatch_change(&input.id).await.map_err(interaction)?;
        tracing::debug!(target_el = %input.id, "assigned file to file input");
        Ok(())
    }

    /// Click the start control if one can be recognised
    ///
    /// Finding nothing is not an error: the tool may start on its own once
    /// the file is in, and the monitor stage will time out otherwise.
    async fn trigger(&self, surface: &dyn EmbeddedSurface) -> Result<bool, SurfaceError> {
        let buttons = surface.query(BUTTON_SELECTOR).await?;
        let mut target = buttons.into_iter().find(|b| label_contains(b, &["start"]));

        if target.is_none() {
            let controls = surface.query(CONTROL_SELECTOR).await?;
            target = controls
                .into_iter()
                .find(|c| label_contains(c, &["start", "compile"]) || self.is_accent(c));
        }

        match target {
            Some(control) => {
                surface.click(&control.id).await?;
                tracing::debug!(label = control.label.trim(), "clicked start control");
                Ok(true)
            }
            None => {
                tracing::debug!("no start control found, relying on auto-start");
                Ok(false)
            }
        }
    }

    async fn inspect(
        &self,
        surface: &dyn EmbeddedSurface,
        last_progress: &mut Option<String>,
        progress: &ProgressSink,
    ) -> Result<Tick, SurfaceError> {
        let text = surface.visible_text().await?;
        if let Some(value) = Self::progress_value(&text) {
            if last_progress.as_deref() != Some(value.as_str()) {
                progress.emit(&format!("Progress: {value}%"));
                *last_progress = Some(value);
            }
        }

        if let Some(control) = find_download_control(surface).await? {
            return Ok(Tick::Complete(Completion::DownloadControl(control.id)));
        }

        let errors = surface.query(ERROR_SELECTOR).await?;
        if let Some(error) = errors.iter().find(|e| !e.label.trim().is_empty()) {
            return Ok(Tick::Failed(error.label.trim().to_string()));
        }

        Ok(Tick::Pending)
    }

    fn progress_value(text: &str) -> Option<String> {
        PROGRESS_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn is_accent(&self, element: &ElementSnapshot) -> bool {
        element
            .background
            .as_deref()
            .and_then(parse_color)
            .is_some_and(|rgb| self.accents.contains(&rgb))
    }
}

#[async_trait]
impl CompletionDetector for DomPollingDetector {
    fn name(&self) -> &'static str {
        "dom-polling"
    }

    async fn submit(
        &self,
        session: &mut CompilationSession,
        request: &CompilationRequest,
    ) -> Result<(), CompileError> {
        let progress = session.progress();
        let surface = session.surface()?;

        progress.emit(&format!("Uploading {}", request.name()));
        self.upload(surface, request).await?;

        sleep(self.options.trigger_delay).await;
        match self.trigger(surface).await {
            Ok(true) => progress.emit("Compilation started"),
            Ok(false) => progress.emit("Waiting for compilation to start"),
            Err(e) => {
                tracing::warn!(error = %e, "start control lookup failed, relying on auto-start");
            }
        }
        Ok(())
    }

    async fn await_completion(
        &self,
        session: &mut CompilationSession,
    ) -> Result<Completion, CompileError> {
        let progress = session.progress();
        let surface = session.surface()?;
        let mut last_progress = None;

        for tick in 0..self.options.max_ticks {
            sleep(self.options.poll_interval).await;
            match self.inspect(surface, &mut last_progress, &progress).await {
                Ok(Tick::Pending) => {}
                Ok(Tick::Complete(completion)) => {
                    tracing::info!(tick, "download control appeared");
                    return Ok(completion);
                }
                Ok(Tick::Failed(detail)) => {
                    tracing::warn!(tick, detail = detail.as_str(), "tool displayed an error");
                    return Err(CompileError::ExternalError(detail));
                }
                Err(e) => tracing::debug!(tick, error = %e, "inspection failed, retrying"),
            }
        }

        let waited = self
            .options
            .poll_interval
            .saturating_mul(u32::try_from(self.options.max_ticks).unwrap_or(u32::MAX));
        Err(CompileError::timeout(Stage::Monitor, waited))
    }

    async fn retrieve(
        &self,
        session: &mut CompilationSession,
        completion: Completion,
    ) -> Result<CompiledArtifact, CompileError> {
        if let Completion::ResultReference {
            href,
            filename,
            content_type,
        } = completion
        {
            return fetch_artifact(
                session,
                &href,
                filename,
                content_type,
                &self.options.default_filename,
            )
            .await;
        }

        session.progress().emit("Downloading result");
        let control = find_download_control(session.surface()?)
            .await
            .map_err(download)?
            .ok_or_else(|| CompileError::DownloadFailure("download control not found".into()))?;

        let mut links = session.watch_downloads().await?;
        let surface = session.surface()?;
        let captured = timeout(self.options.retrieval_timeout, async {
            surface.click(&control.id).await.map_err(download)?;
            let link = links.recv().await.ok_or_else(|| {
                CompileError::DownloadFailure(
                    "download watch closed before a link appeared".into(),
                )
            })?;
            Ok::<_, CompileError>(link)
        })
        .await;
        session.unwatch_downloads().await;

        let link = match captured {
            Ok(result) => result?,
            Err(_) => {
                return Err(CompileError::timeout(
                    Stage::Retrieval,
                    self.options.retrieval_timeout,
                ))
            }
        };
        tracing::debug!(href = link.href.as_str(), "captured download link");

        fetch_artifact(
            session,
            &link.href,
            link.filename,
            None,
            &self.options.default_filename,
        )
        .await
    }
}

async fn find_download_control(
    surface: &dyn EmbeddedSurface,
) -> Result<Option<ElementSnapshot>, SurfaceError> {
    let controls = surface.query(CONTROL_SELECTOR).await?;
    Ok(controls
        .into_iter()
        .find(|c| label_contains(c, &["download"])))
}

fn label_contains(element: &ElementSnapshot, keywords: &[&str]) -> bool {
    let label = element.label.to_lowercase();
    keywords.iter().any(|k| label.contains(k))
}

fn interaction(e: SurfaceError) -> CompileError {
    CompileError::InteractionFailure(e.to_string())
}

fn download(e: SurfaceError) -> CompileError {
    CompileError::DownloadFailure(e.to_string())
}

/// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or `rgba(r, g, b, a)`
fn parse_color(value: &str) -> Option<(u8, u8, u8)> {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        return Some((channel(0)?, channel(2)?, channel(4)?));
    }

    let inner = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>().ok());
    Some((parts.next()??, parts.next()??, parts.next()??))
}
