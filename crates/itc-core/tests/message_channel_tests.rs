//! Message Channel Tests
//!
//! The tool reports progress and completion by posting messages to the host;
//! only messages from the trusted origin may move the session forward.

use itc_core::prelude::*;
use itc_core::{FailureReason, Stage};
use itc_test_utils::{
    jpeg_request, message, FakeTool, Notification, NotificationLog, ToolScript, MIND_BYTES,
    RESULT_HREF, TOOL_URL, TRUSTED_ORIGIN,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn compiler_for(tool: &FakeTool) -> ImageTargetCompiler {
    let config = CompilerConfig::new()
        .with_tool(TOOL_URL, TRUSTED_ORIGIN)
        .with_strategy(DetectorKind::MessageChannel);
    ImageTargetCompiler::new(config, tool.factory())
}

fn complete(origin: &str) -> itc_core::InboundMessage {
    message(
        origin,
        json!({"type": "complete", "data": {"url": RESULT_HREF, "filename": "poster.mind"}}),
    )
}

#[tokio::test(start_paused = true)]
async fn test_trusted_completion_resolves() {
    let tool = FakeTool::new(ToolScript::messaging(vec![
        message(TRUSTED_ORIGIN, json!({"type": "progress", "data": {"progress": 40}})),
        message(
            TRUSTED_ORIGIN,
            json!({"type": "progress", "data": {"message": "Extracting features"}}),
        ),
        complete(TRUSTED_ORIGIN),
    ]));
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let artifact = compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(artifact.bytes().as_ref(), MIND_BYTES);
    assert_eq!(artifact.filename(), "poster.mind");

    let progress = log.progress();
    assert!(progress.contains(&"Progress: 40%".to_string()));
    assert!(progress.contains(&"Extracting features".to_string()));
    assert_eq!(
        log.events().last(),
        Some(&Notification::Complete("poster.mind".into()))
    );
    assert_eq!(log.terminal_count(), 1);
    assert_eq!(tool.stats().files_posted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_listener_registered_and_removed_once() {
    let tool = FakeTool::new(ToolScript::messaging(vec![complete(TRUSTED_ORIGIN)]));
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    let stats = tool.stats();
    assert_eq!(stats.listeners_registered, 1);
    assert_eq!(stats.listeners_removed, 1);
    assert_eq!(stats.surfaces_closed, 1);
    assert!(!tool.has_listener());
}

#[tokio::test(start_paused = true)]
async fn test_untrusted_completion_is_ignored() {
    let tool = FakeTool::new(ToolScript::messaging(vec![
        complete("https://evil.test"),
        message(
            "https://evil.test",
            json!({"type": "error", "data": {"message": "spoofed"}}),
        ),
    ]));
    let compiler = Arc::new(compiler_for(&tool));
    let log = NotificationLog::attach(&compiler);

    let handle = tokio::spawn({
        let compiler = Arc::clone(&compiler);
        async move { compiler.compile(jpeg_request()).await }
    });

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!handle.is_finished());
    assert_eq!(log.terminal_count(), 0);
    assert!(tool.has_listener());

    assert!(tool.post_to_host(complete(TRUSTED_ORIGIN)));
    let artifact = handle.await.unwrap().unwrap();

    assert_eq!(artifact.filename(), "poster.mind");
    assert_eq!(log.terminal_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_only_untrusted_messages_times_out() {
    let tool = FakeTool::new(ToolScript::messaging(vec![complete("https://evil.test")]));
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Session, .. }));
    let stats = tool.stats();
    assert_eq!(stats.listeners_removed, 1);
    assert_eq!(stats.surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_opaque_origin_is_never_trusted() {
    let tool = FakeTool::new(ToolScript::messaging(vec![complete("null")]));
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Session, .. }));
    assert!(compiler.last_result().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unrecognised_messages_are_skipped() {
    let tool = FakeTool::new(ToolScript::messaging(vec![
        message(TRUSTED_ORIGIN, json!({"type": "heartbeat"})),
        message(TRUSTED_ORIGIN, json!("ready")),
        complete(TRUSTED_ORIGIN),
    ]));
    let compiler = compiler_for(&tool);

    let artifact = compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(artifact.bytes().as_ref(), MIND_BYTES);
}

#[tokio::test(start_paused = true)]
async fn test_error_message_is_external_error() {
    let tool = FakeTool::new(ToolScript::messaging(vec![message(
        TRUSTED_ORIGIN,
        json!({"type": "error", "data": {"message": "Bad image"}}),
    )]));
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::ExternalError);
    assert!(err.to_string().contains("Bad image"));
    assert_eq!(log.terminal_count(), 1);
    assert_eq!(tool.stats().listeners_removed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_result_is_download_failure() {
    let tool = FakeTool::new(ToolScript {
        resources: Default::default(),
        ..ToolScript::messaging(vec![complete(TRUSTED_ORIGIN)])
    });
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::DownloadFailure);
    assert_eq!(tool.stats().surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_message_strategy_never_touches_the_dom() {
    let tool = FakeTool::new(ToolScript::messaging(vec![complete(TRUSTED_ORIGIN)]));
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    let stats = tool.stats();
    assert_eq!(stats.inspections, 0);
    assert_eq!(stats.drops, 0);
    assert!(stats.clicks.is_empty());
}
