//! DOM Polling Tests
//!
//! End-to-end runs of the controller against the scripted fake page, using
//! tokio's paused clock so ceilings of minutes resolve instantly.

use itc_core::prelude::*;
use itc_core::{FailureReason, Stage};
use itc_core::ElementSnapshot;
use itc_test_utils::{
    element, jpeg_request, FakeTool, Notification, NotificationLog, ToolScript,
    UploadAffordance, DOWNLOAD_BUTTON, MIND_BYTES, START_BUTTON, TOOL_URL, TRUSTED_ORIGIN,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

fn compiler_for(tool: &FakeTool) -> ImageTargetCompiler {
    let config = CompilerConfig::new().with_tool(TOOL_URL, TRUSTED_ORIGIN);
    ImageTargetCompiler::new(config, tool.factory())
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_returns_downloaded_bytes() {
    let tool = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let artifact = compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(artifact.bytes().as_ref(), MIND_BYTES);
    assert_eq!(artifact.filename(), "compiled.mind");
    assert_eq!(compiler.last_result(), Some(artifact));

    let progress = log.progress();
    assert!(progress.contains(&"Progress: 0%".to_string()));
    assert!(progress.contains(&"Progress: 100%".to_string()));
    assert_eq!(
        log.events().last(),
        Some(&Notification::Complete("compiled.mind".into()))
    );
    assert_eq!(log.terminal_count(), 1);

    let stats = tool.stats();
    assert_eq!(stats.drops, 1);
    assert_eq!(stats.clicks, vec![START_BUTTON.to_string(), DOWNLOAD_BUTTON.to_string()]);
    assert_eq!(stats.watches_started, 1);
    assert_eq!(stats.watches_stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_surface_is_hidden_and_sandboxed() {
    let tool = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    let spec = tool.stats().last_spec.unwrap();
    assert_eq!(spec.url, TOOL_URL);
    assert!(!spec.visible);
    assert_eq!(spec.sandbox.to_attribute(), "allow-scripts allow-forms");
}

#[tokio::test(start_paused = true)]
async fn test_teardown_runs_once_on_success() {
    let tool = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    let stats = tool.stats();
    assert_eq!(stats.surfaces_created, 1);
    assert_eq!(stats.surfaces_closed, 1);
    assert_eq!(stats.listeners_registered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_file_input_fallback() {
    let tool = FakeTool::new(ToolScript {
        upload: UploadAffordance::FileInput,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    let stats = tool.stats();
    assert_eq!(stats.drops, 0);
    assert_eq!(stats.files_assigned, 1);
    assert_eq!(stats.changes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_upload_affordance_is_interaction_failure() {
    let tool = FakeTool::new(ToolScript {
        upload: UploadAffordance::None,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::InteractionFailure);
    assert_eq!(tool.stats().surfaces_closed, 1);
    assert_eq!(log.terminal_count(), 1);
    assert!(matches!(log.events().last(), Some(Notification::Error(_))));
}

#[tokio::test(start_paused = true)]
async fn test_missing_start_control_relies_on_auto_start() {
    let tool = FakeTool::new(ToolScript {
        start_label: None,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let artifact = compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(artifact.bytes().as_ref(), MIND_BYTES);
    assert_eq!(tool.stats().clicks, vec![DOWNLOAD_BUTTON.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_compile_labelled_control_is_clicked_without_start_button() {
    let tool = FakeTool::new(ToolScript {
        start_label: None,
        extra_controls: vec![
            element("reset-button", "button", "Reset"),
            element("compile-link", "a", "Compile target"),
        ],
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(
        tool.stats().clicks,
        vec!["compile-link".to_string(), DOWNLOAD_BUTTON.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_accent_colored_control_is_clicked_without_label() {
    let tool = FakeTool::new(ToolScript {
        start_label: None,
        extra_controls: vec![
            ElementSnapshot {
                background: Some("rgb(0, 0, 0)".into()),
                ..element("dark-action", "div", "")
            },
            ElementSnapshot {
                background: Some("rgb(37, 194, 160)".into()),
                ..element("accent-action", "div", "")
            },
        ],
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(
        tool.stats().clicks,
        vec!["accent-action".to_string(), DOWNLOAD_BUTTON.to_string()]
    );
    assert!(log.progress().contains(&"Compilation started".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_start_button_wins_over_other_controls() {
    let tool = FakeTool::new(ToolScript {
        extra_controls: vec![element("compile-link", "a", "Compile target")],
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(tool.stats().clicks.first().map(String::as_str), Some(START_BUTTON));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_progress_is_reported_once() {
    let tool = FakeTool::new(ToolScript {
        pages: vec![
            "Progress: 10%".into(),
            "Progress: 10%".into(),
            "Progress: 50%".into(),
        ],
        download_after: Some(3),
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    compiler.compile(jpeg_request()).await.unwrap();

    let percentages: Vec<String> = log
        .progress()
        .into_iter()
        .filter(|t| t.starts_with("Progress:"))
        .collect();
    assert_eq!(percentages, vec!["Progress: 10%", "Progress: 50%"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_inspection_failures_are_retried() {
    let tool = FakeTool::new(ToolScript {
        transient_failures: 3,
        download_after: Some(5),
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let artifact = compiler.compile(jpeg_request()).await.unwrap();

    assert_eq!(artifact.bytes().as_ref(), MIND_BYTES);
    assert_eq!(tool.stats().inspections, 5);
}

#[tokio::test(start_paused = true)]
async fn test_error_banner_surfaces_text() {
    let tool = FakeTool::new(ToolScript::fails_with("Bad image"));
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::ExternalError);
    assert!(err.to_string().contains("Bad image"));
    assert_eq!(
        log.events().last(),
        Some(&Notification::Error(err.to_string()))
    );
    assert_eq!(tool.stats().surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_tool_times_out_at_global_ceiling() {
    let tool = FakeTool::new(ToolScript::stalls());
    let compiler = compiler_for(&tool);
    let global = compiler.config().global_timeout();
    let settle = compiler.config().settle_delay();

    let started = Instant::now();
    let err = compiler.compile(jpeg_request()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Session, .. }));
    assert!(elapsed >= global, "timed out early: {elapsed:?}");
    assert!(elapsed <= global + settle + Duration::from_secs(2), "timed out late: {elapsed:?}");
    assert_eq!(tool.stats().surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_link_times_out_retrieval() {
    let tool = FakeTool::new(ToolScript {
        link: None,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let started = Instant::now();
    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Retrieval, .. }));
    assert!(started.elapsed() < compiler.config().global_timeout());
    let stats = tool.stats();
    assert_eq!(stats.watches_stopped, 1);
    assert_eq!(stats.surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_download_watch_released_when_session_times_out() {
    let tool = FakeTool::new(ToolScript {
        link: None,
        ..ToolScript::happy_path()
    });
    let config = CompilerConfig::new()
        .with_tool(TOOL_URL, TRUSTED_ORIGIN)
        .with_global_timeout(Duration::from_secs(5));
    let compiler = ImageTargetCompiler::new(config, tool.factory());

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Session, .. }));
    let stats = tool.stats();
    assert_eq!(stats.watches_started, 1);
    assert_eq!(stats.watches_stopped, stats.watches_started);
    assert_eq!(stats.surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_download_control_vanishing_before_retrieval_is_download_failure() {
    let tool = FakeTool::new(ToolScript {
        download_sightings: Some(1),
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);
    let log = NotificationLog::attach(&compiler);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::DownloadFailure);
    let stats = tool.stats();
    assert_eq!(stats.clicks, vec![START_BUTTON.to_string()]);
    assert_eq!(stats.watches_started, 0);
    assert_eq!(stats.surfaces_closed, 1);
    assert_eq!(log.terminal_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unfetchable_result_is_download_failure() {
    let tool = FakeTool::new(ToolScript {
        resources: Default::default(),
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::DownloadFailure);
    assert!(compiler.last_result().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_still_tears_down() {
    let tool = FakeTool::new(ToolScript {
        fail_load: true,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert_eq!(err.reason(), FailureReason::LoadFailure);
    let stats = tool.stats();
    assert_eq!(stats.surfaces_created, 1);
    assert_eq!(stats.surfaces_closed, 1);
    assert_eq!(stats.drops, 0);
}

#[tokio::test(start_paused = true)]
async fn test_surface_that_never_loads_times_out() {
    let tool = FakeTool::new(ToolScript {
        never_loads: true,
        ..ToolScript::happy_path()
    });
    let compiler = compiler_for(&tool);

    let err = compiler.compile(jpeg_request()).await.unwrap_err();

    assert!(matches!(err, CompileError::Timeout { stage: Stage::Load, .. }));
    assert_eq!(tool.stats().surfaces_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_never_touches_the_tool() {
    let tool = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&tool);

    let inputs = [
        CompilationRequest::new("notes.txt", "text/plain", b"hello".to_vec()),
        CompilationRequest::new("poster.jpg", "", vec![0xFF, 0xD8]),
        CompilationRequest::new("poster.jpg", "image/jpeg", Vec::new()),
    ];
    for request in inputs {
        let err = compiler.compile(request).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::InvalidInput);
    }

    assert_eq!(tool.stats().surfaces_created, 0);
}

#[tokio::test(start_paused = true)]
async fn test_last_result_survives_failed_call() {
    let good = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&good);
    let first = compiler.compile(jpeg_request()).await.unwrap();

    let bad = CompilationRequest::new("notes.txt", "text/plain", b"x".to_vec());
    assert!(compiler.compile(bad).await.is_err());

    assert_eq!(compiler.last_result(), Some(first));
}

#[tokio::test(start_paused = true)]
async fn test_each_call_gets_a_fresh_surface() {
    let tool = FakeTool::new(ToolScript::happy_path());
    let compiler = compiler_for(&tool);

    compiler.compile(jpeg_request()).await.unwrap();
    let _ = compiler.compile(jpeg_request()).await;

    let stats = tool.stats();
    assert_eq!(stats.surfaces_created, 2);
    assert_eq!(stats.surfaces_closed, 2);
}
