//! Minimal W3C WebDriver client
//!
//! Only the commands the surface needs: session lifecycle, navigation, frame
//! switching and script execution. Every response is unwrapped from the
//! `{"value": ...}` envelope.

use crate::config::WebDriverConfig;
use crate::error::WebDriverError;
use reqwest::{Client, Method};
use serde_json::{json, Value};

/// Frame selector for `POST /session/{id}/frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTarget {
    /// Top-level browsing context
    Top,
    /// Child frame by index
    Index(u16),
}

/// One WebDriver session
#[derive(Debug)]
pub struct WebDriverClient {
    http: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Start a new browser session
    ///
    /// # Errors
    /// Returns an error if the server is unreachable or refuses the session.
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, WebDriverError> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        let base_url = config.base_url().to_string();

        let response = http
            .post(format!("{base_url}/session"))
            .json(&config.capabilities())
            .send()
            .await?;
        let value = unwrap_value(response).await?;
        let session_id = session_id_of(&value)?;

        tracing::debug!(
            session_id = session_id.as_str(),
            browser = config.browser.name(),
            "webdriver session created"
        );
        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Navigate the top-level context
    ///
    /// # Errors
    /// Returns the server's error if navigation fails.
    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    /// Switch the current browsing context
    ///
    /// # Errors
    /// Returns the server's error, typically `no such frame`.
    pub async fn switch_frame(&self, target: FrameTarget) -> Result<(), WebDriverError> {
        let id = match target {
            FrameTarget::Top => Value::Null,
            FrameTarget::Index(index) => json!(index),
        };
        self.command(Method::POST, "frame", Some(json!({ "id": id })))
            .await
            .map(drop)
    }

    /// Run a synchronous script in the current context
    ///
    /// # Errors
    /// Returns the server's error, typically `javascript error`.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, WebDriverError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// Run a script that signals completion through its last argument
    ///
    /// # Errors
    /// Returns the server's error, including `script timeout`.
    pub async fn execute_async(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, WebDriverError> {
        self.command(
            Method::POST,
            "execute/async",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// End the session and close the browser
    ///
    /// # Errors
    /// Returns the server's error if the session could not be deleted.
    pub async fn delete_session(&self) -> Result<(), WebDriverError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self.http.delete(url).send().await?;
        unwrap_value(response).await.map(drop)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}/{path}", self.base_url, self.session_id);
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        unwrap_value(response).await
    }
}

async fn unwrap_value(response: reqwest::Response) -> Result<Value, WebDriverError> {
    let status = response.status();
    let body: Value = response.json().await?;
    parse_envelope(status.is_success(), body)
}

fn parse_envelope(success: bool, mut body: Value) -> Result<Value, WebDriverError> {
    let value = body
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| WebDriverError::UnexpectedResponse(body.to_string()))?;

    if success {
        return Ok(value);
    }
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(WebDriverError::Protocol { error, message })
}

fn session_id_of(value: &Value) -> Result<String, WebDriverError> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebDriverError::UnexpectedResponse(format!("no sessionId in {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn success_envelope_yields_value() {
        let value = parse_envelope(true, json!({ "value": { "sessionId": "abc" } })).unwrap();
        assert_eq!(session_id_of(&value).unwrap(), "abc");
    }

    #[test]
    fn error_envelope_yields_protocol_error() {
        let err = parse_envelope(
            false,
            json!({
                "value": { "error": "no such frame", "message": "frame 0 gone", "stacktrace": "" }
            }),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some("no such frame"));
        assert_eq!(err.to_string(), "no such frame: frame 0 gone");
    }

    #[test]
    fn missing_envelope_is_unexpected() {
        let err = parse_envelope(true, json!({ "status": 0 })).unwrap_err();
        assert!(matches!(err, WebDriverError::UnexpectedResponse(_)));
    }

    #[test]
    fn missing_session_id_is_unexpected() {
        assert!(session_id_of(&json!({ "capabilities": {} })).is_err());
    }
}
