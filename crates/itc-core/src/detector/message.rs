//! Message channel detector
//!
//! Used when the embedded tool posts structured notifications of the form
//! `{ "type": "progress" | "complete" | "error", "data": { .. } }` to its
//! host. Only messages whose origin equals the trusted origin are looked at;
//! anything else is dropped before parsing.

use super::{fetch_artifact, Completion, CompletionDetector};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::session::CompilationSession;
use crate::surface::InboundMessage;
use async_trait::async_trait;
use itc_artifact::{CompilationRequest, CompiledArtifact};
use serde::Deserialize;

/// Notification posted by the embedded tool
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ToolMessage {
    Progress {
        #[serde(default, alias = "detail", alias = "text")]
        message: Option<String>,
        #[serde(default, alias = "progress")]
        percent: Option<f64>,
    },
    Complete {
        #[serde(alias = "href", alias = "result")]
        url: String,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default, alias = "contentType")]
        content_type: Option<String>,
    },
    Error {
        #[serde(default, alias = "detail", alias = "error")]
        message: Option<String>,
    },
}

impl ToolMessage {
    /// Human-readable text of a progress message
    fn progress_detail(message: Option<String>, percent: Option<f64>) -> String {
        match (message, percent) {
            (Some(m), _) if !m.trim().is_empty() => m,
            (_, Some(p)) => format!("Progress: {p}%"),
            _ => "Compiling".to_string(),
        }
    }
}

/// Waits for tagged notifications instead of scraping the page
#[derive(Debug, Clone)]
pub struct MessageChannelDetector {
    trusted_origin: String,
    default_filename: String,
}

impl MessageChannelDetector {
    #[must_use]
    pub fn new(trusted_origin: impl Into<String>, default_filename: impl Into<String>) -> Self {
        Self {
            trusted_origin: trim_origin(&trusted_origin.into()).to_string(),
            default_filename: default_filename.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.trusted_origin.clone(), config.default_filename.clone())
    }

    fn is_trusted(&self, message: &InboundMessage) -> bool {
        trim_origin(&message.origin) == self.trusted_origin
    }
}

#[async_trait]
impl CompletionDetector for MessageChannelDetector {
    fn name(&self) -> &'static str {
        "message-channel"
    }

    async fn submit(
        &self,
        session: &mut CompilationSession,
        request: &CompilationRequest,
    ) -> Result<(), CompileError> {
        session.register_listener().await?;
        session.progress().emit(&format!("Uploading {}", request.name()));
        session
            .surface()?
            .post_file(request, &self.trusted_origin)
            .await
            .map_err(|e| CompileError::InteractionFailure(e.to_string()))
    }

    async fn await_completion(
        &self,
        session: &mut CompilationSession,
    ) -> Result<Completion, CompileError> {
        let progress = session.progress();
        let session_id = session.id();
        let listener = session.listener_mut().ok_or_else(|| {
            CompileError::InteractionFailure("message listener not registered".into())
        })?;

        while let Some(message) = listener.recv().await {
            if !self.is_trusted(&message) {
                tracing::debug!(
                    session = %session_id,
                    origin = message.origin.as_str(),
                    "ignoring message from untrusted origin"
                );
                continue;
            }
            let parsed = match serde_json::from_value::<ToolMessage>(message.data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::debug!(
                        session = %session_id,
                        error = %e,
                        "ignoring unrecognised message"
                    );
                    continue;
                }
            };
            match parsed {
                ToolMessage::Progress { message, percent } => {
                    progress.emit(&ToolMessage::progress_detail(message, percent));
                }
                ToolMessage::Complete {
                    url,
                    filename,
                    content_type,
                } => {
                    tracing::info!(session = %session_id, "tool reported completion");
                    return Ok(Completion::ResultReference {
                        href: url,
                        filename,
                        content_type,
                    });
                }
                ToolMessage::Error { message } => {
                    let detail = message.unwrap_or_else(|| "unknown error".to_string());
                    tracing::warn!(
                        session = %session_id,
                        detail = detail.as_str(),
                        "tool reported an error"
                    );
                    return Err(CompileError::ExternalError(detail));
                }
            }
        }

        Err(CompileError::ExternalError(
            "message channel closed before completion".into(),
        ))
    }

    async fn retrieve(
        &self,
        session: &mut CompilationSession,
        completion: Completion,
    ) -> Result<CompiledArtifact, CompileError> {
        match completion {
            Completion::ResultReference {
                href,
                filename,
                content_type,
            } => {
                session.progress().emit("Downloading result");
                fetch_artifact(
                    session,
                    &href,
                    filename,
                    content_type,
                    &self.default_filename,
                )
                .await
            }
            Completion::DownloadControl(id) => Err(CompileError::DownloadFailure(format!(
                "message channel cannot activate download control {id}"
            ))),
        }
    }
}

fn trim_origin(origin: &str) -> &str {
    origin.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_tagged_messages() {
        let progress: ToolMessage =
            serde_json::from_value(json!({"type": "progress", "data": {"progress": 40}})).unwrap();
        assert_eq!(
            progress,
            ToolMessage::Progress {
                message: None,
                percent: Some(40.0)
            }
        );

        let complete: ToolMessage = serde_json::from_value(json!({
            "type": "complete",
            "data": {"url": "blob:https://tool/1", "filename": "a.mind"}
        }))
        .unwrap();
        assert!(matches!(
            complete,
            ToolMessage::Complete { ref url, .. } if url == "blob:https://tool/1"
        ));

        let error: ToolMessage =
            serde_json::from_value(json!({"type": "error", "data": {"message": "Bad image"}}))
                .unwrap();
        assert_eq!(
            error,
            ToolMessage::Error {
                message: Some("Bad image".into())
            }
        );
    }

    #[test]
    fn unknown_kind_does_not_parse() {
        let result = serde_json::from_value::<ToolMessage>(json!({"type": "ready", "data": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn progress_detail_prefers_text() {
        assert_eq!(
            ToolMessage::progress_detail(Some("Extracting features".into()), Some(10.0)),
            "Extracting features"
        );
        assert_eq!(ToolMessage::progress_detail(None, Some(55.0)), "Progress: 55%");
        assert_eq!(ToolMessage::progress_detail(None, None), "Compiling");
    }

    #[test]
    fn origin_check_is_exact() {
        let detector = MessageChannelDetector::new("https://tool.test/", "compiled.mind");
        let message = |origin: &str| InboundMessage {
            origin: origin.into(),
            data: json!({}),
        };
        assert!(detector.is_trusted(&message("https://tool.test")));
        assert!(!detector.is_trusted(&message("https://tool.test.evil")));
        assert!(!detector.is_trusted(&message("http://tool.test")));
        assert!(!detector.is_trusted(&message("null")));
    }
}
