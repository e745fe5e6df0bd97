//! WebDriver errors

use itc_core::SurfaceError;

/// Failure talking to the WebDriver server
#[derive(Debug, thiserror::Error)]
pub enum WebDriverError {
    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// W3C error response (`{"value": {"error", "message"}}`)
    #[error("{error}: {message}")]
    Protocol { error: String, message: String },

    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl WebDriverError {
    /// W3C error code, if the server sent one
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Protocol { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

impl From<WebDriverError> for SurfaceError {
    fn from(e: WebDriverError) -> Self {
        match e.code() {
            Some("invalid session id" | "no such window") => SurfaceError::Closed,
            Some("stale element reference" | "no such element") => {
                SurfaceError::StaleElement(e.to_string())
            }
            Some("no such frame" | "insecure certificate") => {
                SurfaceError::AccessDenied(e.to_string())
            }
            Some("javascript error" | "script timeout" | "unexpected alert open") => {
                SurfaceError::Script(e.to_string())
            }
            _ => SurfaceError::Unavailable(e.to_string()),
        }
    }
}
