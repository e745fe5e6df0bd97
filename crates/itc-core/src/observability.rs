//! Logging setup and the compile span
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once at startup to install a subscriber. Every event of a compilation is
//! recorded inside the span returned by [`compile_span`].

use itc_artifact::CompilationRequest;
use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset; WebDriver HTTP traffic stays quiet
pub const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human-readable logs
    #[default]
    Pretty,
}

/// Install the global subscriber
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Subsequent calls
/// are no-ops.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry().with(env_filter);

        match format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init(),
        }
    });
}

/// Span covering one compilation
///
/// `session` starts empty and is recorded once the surface exists, so load
/// failures are still attributed to the input that caused them.
#[must_use]
pub fn compile_span(request: &CompilationRequest, strategy: &str) -> tracing::Span {
    tracing::info_span!(
        "compile",
        file = request.name(),
        input = %request.hash().short(),
        strategy,
        session = tracing::field::Empty,
    )
}
