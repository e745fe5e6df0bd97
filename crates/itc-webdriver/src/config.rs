//! WebDriver connection settings

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Browser behind the WebDriver endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "firefox" | "gecko" => Ok(Self::Firefox),
            other => Err(format!("unsupported browser: {other}")),
        }
    }
}

/// Where and how to start browser sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// Base URL of the WebDriver server (chromedriver, geckodriver, grid)
    pub endpoint: String,
    pub browser: Browser,
    pub headless: bool,
    /// Per-request HTTP ceiling
    pub request_timeout_ms: u64,
    /// Ceiling for `execute/async` scripts
    pub script_timeout_ms: u64,
    /// Interval of the download and message pollers
    pub poll_interval_ms: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4444".to_string(),
            browser: Browser::default(),
            headless: true,
            request_timeout_ms: 60_000,
            script_timeout_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

impl WebDriverConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_browser(mut self, browser: Browser) -> Self {
        self.browser = browser;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Body of the W3C `New Session` command
    #[must_use]
    pub fn capabilities(&self) -> Value {
        let mut always = json!({
            "browserName": self.browser.name(),
            "timeouts": { "script": self.script_timeout_ms },
        });
        let options = match self.browser {
            Browser::Chrome => {
                let mut args = vec!["--disable-gpu", "--no-first-run"];
                if self.headless {
                    args.push("--headless=new");
                }
                ("goog:chromeOptions", json!({ "args": args }))
            }
            Browser::Firefox => {
                let args: Vec<&str> = if self.headless { vec!["-headless"] } else { Vec::new() };
                ("moz:firefoxOptions", json!({ "args": args }))
            }
        };
        always[options.0] = options.1;
        json!({ "capabilities": { "alwaysMatch": always } })
    }

    pub(crate) fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
