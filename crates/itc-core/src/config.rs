//! Controller configuration
//!
//! All delays and ceilings are plain millisecond counts so the config reads
//! naturally from TOML:
//!
//! ```toml
//! strategy = "message-channel"
//! global_timeout_ms = 120000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the external compiler tool
pub const DEFAULT_TOOL_URL: &str = "https://hiukim.github.io/mind-ar-js-doc/tools/compile";

/// Origin the message channel accepts notifications from
pub const DEFAULT_TRUSTED_ORIGIN: &str = "https://hiukim.github.io";

/// Which completion detector the controller builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    /// Scrape the rendered DOM and intercept the download link
    #[default]
    DomPolling,
    /// Wait for tagged notifications posted by the embedded tool
    MessageChannel,
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// URL loaded into the embedded surface
    pub tool_url: String,
    /// Only origin whose messages are processed
    pub trusted_origin: String,
    /// Completion detection strategy
    pub strategy: DetectorKind,
    /// Extra wait after the load event for the page's own initialization
    pub settle_delay_ms: u64,
    /// Wait between upload and looking for the start control
    pub trigger_delay_ms: u64,
    /// Interval between DOM inspections
    pub poll_interval_ms: u64,
    /// Ceiling for upload, trigger, monitor and retrieve together
    pub global_timeout_ms: u64,
    /// Ceiling for capturing and fetching the result
    pub retrieval_timeout_ms: u64,
    /// Ceiling for the surface's load signal
    pub load_timeout_ms: u64,
    /// Filename used when the tool does not declare one
    pub default_filename: String,
    /// Background colors of the tool's primary action (CSS hex or rgb())
    pub accent_colors: Vec<String>,
}

impl CompilerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With completion strategy
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: DetectorKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// With tool URL and trusted origin
    #[inline]
    #[must_use]
    pub fn with_tool(mut self, url: impl Into<String>, origin: impl Into<String>) -> Self {
        self.tool_url = url.into();
        self.trusted_origin = origin.into();
        self
    }

    /// With global ceiling
    #[inline]
    #[must_use]
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout_ms = millis(timeout);
        self
    }

    /// With retrieval ceiling
    #[inline]
    #[must_use]
    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout_ms = millis(timeout);
        self
    }

    /// With polling interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    /// With settle delay
    #[inline]
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = millis(delay);
        self
    }

    /// Wait after the load signal before the global ceiling starts
    #[inline]
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Wait between upload and the start-control lookup
    #[inline]
    #[must_use]
    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }

    /// Interval between DOM inspections
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Ceiling for submit, monitor and retrieve together
    #[inline]
    #[must_use]
    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    /// Ceiling for capturing and fetching the result
    #[inline]
    #[must_use]
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    /// Ceiling for the surface's load signal
    #[inline]
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Number of DOM inspections that fit in the global ceiling
    #[must_use]
    pub fn max_poll_ticks(&self) -> u64 {
        (self.global_timeout_ms / self.poll_interval_ms.max(1)).max(1)
    }

    /// Parse from TOML, filling unspecified fields with defaults
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or the values are invalid
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values are usable
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("global_timeout_ms", self.global_timeout_ms),
            ("retrieval_timeout_ms", self.retrieval_timeout_ms),
            ("load_timeout_ms", self.load_timeout_ms),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }
        if self.tool_url.trim().is_empty() {
            return Err(ConfigError::Invalid("tool_url is empty".into()));
        }
        if self.strategy == DetectorKind::MessageChannel && self.trusted_origin.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "trusted_origin is required for the message channel".into(),
            ));
        }
        if self.trusted_origin.trim() == "null" {
            return Err(ConfigError::Invalid(
                "trusted_origin cannot be the opaque origin \"null\"".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            tool_url: DEFAULT_TOOL_URL.to_string(),
            trusted_origin: DEFAULT_TRUSTED_ORIGIN.to_string(),
            strategy: DetectorKind::default(),
            settle_delay_ms: 3_000,
            trigger_delay_ms: 1_000,
            poll_interval_ms: 1_000,
            global_timeout_ms: 300_000,
            retrieval_timeout_ms: 30_000,
            load_timeout_ms: 30_000,
            default_filename: itc_artifact::DEFAULT_FILENAME.to_string(),
            accent_colors: vec!["#25c2a0".to_string(), "#2e8555".to_string()],
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the config file failed
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML could not be rendered
    #[error("config render error: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_ceilings() {
        let config = CompilerConfig::default();
        assert_eq!(config.global_timeout(), Duration::from_secs(300));
        assert_eq!(config.retrieval_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_poll_ticks(), 300);
        assert_eq!(config.default_filename, "compiled.mind");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CompilerConfig::from_toml_str(
            "strategy = \"message-channel\"\npoll_interval_ms = 250\n",
        )
        .unwrap();
        assert_eq!(config.strategy, DetectorKind::MessageChannel);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.tool_url, DEFAULT_TOOL_URL);
    }

    #[test]
    fn opaque_trusted_origin_is_rejected() {
        let config = CompilerConfig::new().with_tool("https://tool.test/compile", "null");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("opaque")
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = CompilerConfig::from_toml_str("poll_interval_ms = 0");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid(msg)) if msg.contains("poll_interval_ms")
        ));
    }

    #[test]
    fn toml_rendering_parses_back() {
        let config = CompilerConfig::new()
            .with_strategy(DetectorKind::MessageChannel)
            .with_global_timeout(Duration::from_secs(60));
        let text = config.to_toml_string().unwrap();
        assert_eq!(CompilerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itc.toml");
        std::fs::write(&path, "settle_delay_ms = 10").unwrap();
        assert_eq!(CompilerConfig::load(&path).unwrap().settle_delay_ms, 10);
    }
}
