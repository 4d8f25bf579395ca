//! Crate-level tests exercising the orchestrator against a real event
//! log and the full resolver -> executor pipeline, covering scenarios
//! that a single module's unit tests don't reach end-to-end.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use gf_browser::driver::BrowserDriver;
use gf_browser::fake::FakeBrowserDriver;
use gf_domain::config::{ImageConfig, OrchestratorConfig, QuiescenceConfig};
use gf_domain::event::EventKind;
use gf_domain::session::{SessionKind, SessionStatus};
use gf_domain::step::Step;
use gf_engine::executor::StepExecutor;
use gf_engine::resolver::PlaceholderResolver;
use gf_engine::Orchestrator;
use gf_llm::openai_compat::StaticLlmClient;
use gf_sessions::manager::SessionManager;
use gf_store::{EventLogWriter, Tailer, WorkspaceLayout};

fn scripted_reply(step_json: &str, goal_complete: bool) -> String {
    format!(
        r#"{{"step": {step_json}, "confidence": 0.9, "matches_goal": {goal_complete}, "reasoning": "ok", "goal_validation": {{"is_complete": {goal_complete}, "reasoning": "done"}}}}"#
    )
}

/// Scenario 1 + 3: a replayed script's events land in the NDJSON mirror
/// as they're emitted, and a Tailer started only after the session has
/// already finished still delivers every event in order, ending on the
/// terminal one.
#[tokio::test]
async fn replay_events_are_durable_and_late_tailer_sees_all_of_them() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace = WorkspaceLayout::new(tmp.path(), "acct-1", "ws-1");
    let session_id = Uuid::new_v4();
    let events_path = workspace.events_path(session_id);
    WorkspaceLayout::ensure_dir(events_path.parent().unwrap()).unwrap();

    let sessions = Arc::new(SessionManager::new(64));
    sessions
        .create(session_id, SessionKind::Run, Some(EventLogWriter::new(events_path.clone())))
        .unwrap();

    let fake = Arc::new(
        FakeBrowserDriver::new(
            "https://example.com/login",
            vec!["Username".into(), "Password".into(), "Login".into()],
        )
        .with_transition("https://example.com/login", "Login", "https://example.com/dashboard"),
    );
    let driver: Arc<dyn BrowserDriver> = fake;
    let llm = Arc::new(StaticLlmClient::new("{}"));

    let orchestrator = Orchestrator::with_placeholder_values(
        sessions.clone(),
        driver,
        llm,
        OrchestratorConfig::default(),
        QuiescenceConfig::default(),
        ImageConfig::default(),
        HashMap::from([("pw".to_string(), "hunter2".to_string())]),
        HashMap::from([("user".to_string(), "alice".to_string())]),
    );

    let script = vec![
        Step::Goto { url: "https://example.com/login".into() },
        Step::Type { label: "Username".into(), value: Some("{{var.user}}".into()), sensitive: false },
        Step::Type { label: "Password".into(), value: Some("{{secret.pw}}".into()), sensitive: true },
        Step::Click { label: "Login".into() },
        Step::AssertPage { url: "https://example.com/dashboard".into() },
    ];

    orchestrator.replay(session_id, script).await.unwrap();
    assert_eq!(sessions.status(session_id).unwrap().status, SessionStatus::Completed);

    // The session is already terminal; this tailer is the "late,
    // cross-process subscriber" spec.md 4.9 describes.
    let tailer = Tailer::new(events_path, std::time::Duration::from_millis(5), std::time::Duration::from_secs(2));
    let (tx, mut rx) = mpsc::channel(64);
    tailer.run(tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(events.iter().any(|e| e.kind == EventKind::SessionStarted));
    assert_eq!(events.iter().filter(|e| matches!(e.kind, EventKind::StepExecuted { .. })).count(), 5);
    assert!(events.last().unwrap().is_terminal());
    assert_eq!(events.last().unwrap().kind, EventKind::SessionCompleted);
}

/// Scenario 2: a planner that always proposes the same click never
/// reaches goal completion, and the loop must fail with a "stuck"
/// error well before the session's own step cap.
#[tokio::test]
async fn prompt_session_fails_as_stuck_before_reaching_the_step_cap() {
    let sessions = Arc::new(SessionManager::new(64));
    let driver: Arc<dyn BrowserDriver> =
        Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
    let llm = Arc::new(StaticLlmClient::new(scripted_reply(
        r#"{"type": "click", "label": "Next"}"#,
        false,
    )));

    let mut cfg = OrchestratorConfig::default();
    cfg.iteration_pause_ms = 0;
    cfg.max_steps_per_session = 30;
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        driver,
        llm,
        cfg,
        QuiescenceConfig::default(),
        ImageConfig::default(),
    );

    let id = Uuid::new_v4();
    sessions.create(id, SessionKind::Run, None).unwrap();
    let err = orchestrator.run(id, "click next forever", "https://example.com").await.unwrap_err();

    assert!(err.to_string().contains("stuck"));
    assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Failed);
}

/// Scenario 2b: a planner whose replies never parse as JSON exhausts
/// its one tightened retry and fails the session as a planning error,
/// well before the stuck-loop or step-cap paths would ever trigger.
#[tokio::test]
async fn prompt_session_fails_on_planner_error_after_one_retry() {
    let sessions = Arc::new(SessionManager::new(64));
    let driver: Arc<dyn BrowserDriver> =
        Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
    let llm = Arc::new(StaticLlmClient::new("not json at all"));

    let mut cfg = OrchestratorConfig::default();
    cfg.iteration_pause_ms = 0;
    cfg.max_steps_per_session = 30;
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        driver,
        llm,
        cfg,
        QuiescenceConfig::default(),
        ImageConfig::default(),
    );

    let id = Uuid::new_v4();
    sessions.create(id, SessionKind::Run, None).unwrap();
    let err = orchestrator.run(id, "click next forever", "https://example.com").await.unwrap_err();

    assert!(matches!(err, gf_domain::error::Error::Planning(_)));
    assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Failed);
}

/// Scenario 5: an LLM that tries to map an email-shaped label to a
/// password-shaped key gets filtered at the resolver, so a Type step
/// for that label still has no value to execute with, end to end
/// through the real resolver and executor (not a mock of either).
#[tokio::test]
async fn cross_type_unsafe_mapping_is_dropped_through_the_full_pipeline() {
    let driver = Arc::new(FakeBrowserDriver::new("https://example.com/login", vec!["Email".into()]));
    let executor = StepExecutor::new(driver, QuiescenceConfig::default());

    let llm = Arc::new(StaticLlmClient::new(r#"{"Email": "ADMIN_PASSWORD"}"#));
    let resolver = PlaceholderResolver::with_values(
        llm,
        HashMap::from([("ADMIN_PASSWORD".to_string(), "hunter2".to_string())]),
        HashMap::new(),
    );
    resolver
        .resolve_secrets(
            "https://example.com/login",
            &["Email".into()],
            &["ADMIN_PASSWORD".into()],
            &HashMap::new(),
        )
        .await
        .unwrap();

    // The unsafe Email -> ADMIN_PASSWORD mapping must not have survived.
    assert_eq!(resolver.lookup("https://example.com/login", "Email"), None);

    let err = executor
        .execute(&Step::Type { label: "Email".into(), value: None, sensitive: false }, &resolver)
        .await
        .unwrap_err();
    assert!(matches!(err, gf_domain::error::Error::Placeholder(_)));
}

/// Scenario 6: cancelling mid-session, after a handful of steps have
/// already executed, stops the Prompt loop before it reaches the step
/// cap and resolves the session as Cancelled rather than Failed or
/// Completed.
#[tokio::test]
async fn cancellation_after_several_prompt_steps_stops_the_session() {
    let sessions = Arc::new(SessionManager::new(64));
    let driver: Arc<dyn BrowserDriver> =
        Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
    let llm = Arc::new(StaticLlmClient::new(scripted_reply(
        r#"{"type": "click", "label": "Next"}"#,
        false,
    )));

    let mut cfg = OrchestratorConfig::default();
    cfg.iteration_pause_ms = 20;
    cfg.max_steps_per_session = 30;
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        driver,
        llm,
        cfg,
        QuiescenceConfig::default(),
        ImageConfig::default(),
    );

    let id = Uuid::new_v4();
    sessions.create(id, SessionKind::Run, None).unwrap();

    let mut rx = sessions.subscribe(id).unwrap();
    let watcher_sessions = sessions.clone();
    let watcher = tokio::spawn(async move {
        let mut executed = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event.kind, EventKind::StepExecuted { .. }) {
                executed += 1;
                if executed == 3 {
                    watcher_sessions.cancel(id);
                    return;
                }
            }
        }
    });

    let result = orchestrator.run(id, "click next forever", "https://example.com").await;
    watcher.await.unwrap();

    assert!(result.is_err());
    assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Cancelled);
}
