use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use gf_browser::driver::BrowserDriver;
use gf_domain::config::{ImageConfig, OrchestratorConfig, QuiescenceConfig};
use gf_domain::error::Result;
use gf_domain::event::EventKind;
use gf_domain::planning::{PlanningContext, PreviousState};
use gf_domain::session::SessionStatus;
use gf_domain::step::Step;
use gf_llm::client::LlmClient;
use gf_sessions::manager::SessionManager;

use crate::emitter::MarkdownEmitter;
use crate::executor::StepExecutor;
use crate::planner::LlmPlanner;
use crate::resolver::PlaceholderResolver;

/// A completed run, handed back to whatever finalizes the script
/// (spec.md 4.6 termination: markdown generation, saving, completion).
pub struct RunOutcome {
    pub steps: Vec<Step>,
    pub markdown: String,
}

/// Per-session state the loop carries across iterations (spec.md 4.6).
struct LoopState {
    steps: Vec<Step>,
    previous_step_state: Option<PreviousState>,
    previous_planned_key: Option<String>,
    retry_counts: HashMap<String, u32>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            previous_step_state: None,
            previous_planned_key: None,
            retry_counts: HashMap::new(),
        }
    }

    /// Last six executed steps split into two consecutive triples; true
    /// if both triples match on (type, label/url) (spec.md 4.6 step 4).
    fn is_stuck(&self, window: usize) -> bool {
        if window < 6 || self.steps.len() < window {
            return false;
        }
        let recent = &self.steps[self.steps.len() - window..];
        let (first_half, second_half) = recent.split_at(window / 2);
        first_half
            .iter()
            .zip(second_half.iter())
            .all(|(a, b)| a.stable_key() == b.stable_key())
    }
}

/// Ties the Placeholder Resolver, LLM Planner, Step Executor, and
/// Markdown Emitter together into the per-session plan → execute →
/// capture → validate loop (spec.md 4.6). Grounded on the teacher's
/// `run_turn_inner` bounded loop: cancellation checked before every
/// external call, three-way success/cancel/error exit.
pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    driver: Arc<dyn BrowserDriver>,
    planner: LlmPlanner,
    resolver: PlaceholderResolver,
    executor: StepExecutor,
    cfg: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        driver: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LlmClient>,
        cfg: OrchestratorConfig,
        quiescence: QuiescenceConfig,
        image_cfg: ImageConfig,
    ) -> Self {
        Self::with_placeholder_values(sessions, driver, llm, cfg, quiescence, image_cfg, HashMap::new(), HashMap::new())
    }

    /// Like [`Orchestrator::new`], but with the workspace's actual
    /// secret/variable values already known — needed for Run sessions
    /// replaying a script whose Type steps carry literal
    /// `{{secret.KEY}}`/`{{var.KEY}}` tokens (spec.md 3, 4.3).
    pub fn with_placeholder_values(
        sessions: Arc<SessionManager>,
        driver: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LlmClient>,
        cfg: OrchestratorConfig,
        quiescence: QuiescenceConfig,
        image_cfg: ImageConfig,
        secret_values: HashMap<String, String>,
        variable_values: HashMap<String, String>,
    ) -> Self {
        Self {
            sessions,
            executor: StepExecutor::new(driver.clone(), quiescence),
            driver,
            planner: LlmPlanner::new(llm.clone(), image_cfg),
            resolver: PlaceholderResolver::with_values(llm, secret_values, variable_values),
            cfg,
        }
    }

    /// Runs the session to a terminal state and returns the produced
    /// guide on success. Never lets an error escape past the session
    /// boundary (spec.md 7): any `Err` here has already been recorded
    /// as `SessionFailed` before being returned to the caller for
    /// logging purposes only.
    pub async fn run(&self, session_id: Uuid, goal_prompt: &str, base_url: &str) -> Result<RunOutcome> {
        self.sessions.start(session_id)?;
        self.sessions.emit(session_id, EventKind::SessionStarted)?;

        match self.drive(session_id, goal_prompt, base_url).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.sessions
                    .complete(session_id, SessionStatus::Failed, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Replays a fixed, already-authored script step-by-step against
    /// the browser (Run sessions, spec.md 3: "replay a markdown
    /// guide"). No planner call happens; each step is executed in
    /// order, with a successful `AssertPage` terminating the session
    /// even mid-script (the same back-compat goal-complete path the
    /// Prompt loop honors).
    pub async fn replay(&self, session_id: Uuid, steps: Vec<Step>) -> Result<RunOutcome> {
        self.sessions.start(session_id)?;
        self.sessions.emit(session_id, EventKind::SessionStarted)?;

        match self.drive_replay(session_id, steps).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.sessions
                    .complete(session_id, SessionStatus::Failed, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    async fn drive_replay(&self, session_id: Uuid, steps: Vec<Step>) -> Result<RunOutcome> {
        let mut executed = Vec::with_capacity(steps.len());

        for (index, step) in steps.into_iter().enumerate() {
            if self.sessions.is_cancelled(session_id) {
                self.sessions.complete(session_id, SessionStatus::Cancelled, None)?;
                return Err(gf_domain::error::Error::Other("session cancelled".into()));
            }

            self.sessions.emit(session_id, EventKind::StepExecuting)?;
            let outcome = match self.executor.execute(&step, &self.resolver).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let kind = match &e {
                        gf_domain::error::Error::Execution { kind, .. } => kind.to_string(),
                        _ => "other".into(),
                    };
                    self.sessions.emit(
                        session_id,
                        EventKind::StepFailed { index: index as u32, kind, message: e.to_string() },
                    )?;
                    self.sessions
                        .complete(session_id, SessionStatus::Failed, Some(e.to_string()))?;
                    return Err(e);
                }
            };
            self.sessions.emit(
                session_id,
                EventKind::StepExecuted { index: index as u32, success: true, duration_ms: outcome.duration.as_millis() as u64 },
            )?;

            let assert_page_success = matches!(step, Step::AssertPage { .. }) && outcome.success;
            executed.push(step);
            if assert_page_success {
                return self.finish(session_id, executed).await;
            }
        }

        self.finish(session_id, executed).await
    }

    async fn drive(&self, session_id: Uuid, goal_prompt: &str, base_url: &str) -> Result<RunOutcome> {
        let mut state = LoopState::new();
        let goal_success_criteria = format!("the goal has been accomplished: {goal_prompt}");
        let cap = self.cfg.max_steps_per_session;

        for i in 0..cap {
            if self.sessions.is_cancelled(session_id) {
                self.sessions.complete(session_id, SessionStatus::Cancelled, None)?;
                return Err(gf_domain::error::Error::Other("session cancelled".into()));
            }

            // Step 1: acquire page content and screenshot.
            let current_url = self.driver.current_url().await.unwrap_or_else(|_| base_url.to_string());
            let dom = self.driver.dom_snapshot().await.unwrap_or_default();
            let screenshot = self.driver.screenshot().await.ok();

            // Step 2: build context and plan.
            let ctx = PlanningContext {
                goal_prompt: goal_prompt.to_string(),
                current_url: current_url.clone(),
                cleaned_dom: dom.clone(),
                screenshot: screenshot.clone(),
                step_history: state.steps.clone(),
                previous_reasoning: None,
                previous_state: state.previous_step_state.clone(),
                goal_success_criteria: goal_success_criteria.clone(),
            };

            // Step 3: emit planning events. A fallback reply is a
            // planning error (spec.md 7): retry once immediately with a
            // tightened system prompt, then fail the session if that
            // retry is also a fallback.
            self.sessions.emit(session_id, EventKind::StepPlanning)?;
            let mut reply = self.planner.plan(&ctx, false).await?;
            if reply.is_fallback {
                tracing::warn!(session_id = %session_id, reason = %reply.reasoning, "planning error; retrying with tightened prompt");
                self.sessions.emit(session_id, EventKind::StepPlanning)?;
                reply = self.planner.plan(&ctx, true).await?;
                if reply.is_fallback {
                    let message = format!("planning error: {}", reply.reasoning);
                    self.sessions.complete(session_id, SessionStatus::Failed, Some(message.clone()))?;
                    return Err(gf_domain::error::Error::Planning(message));
                }
            }
            self.sessions.emit(
                session_id,
                EventKind::StepPlanned { step: reply.step.clone(), screenshot: None },
            )?;

            // Step 4: loop detection over the last six executed steps.
            if state.is_stuck(self.cfg.loop_detection_window) {
                self.sessions.complete(session_id, SessionStatus::Failed, Some("stuck".into()))?;
                return Err(gf_domain::error::Error::Stuck("repeated step pattern detected".into()));
            }

            // Step 5: retry accounting on the planned step's stable key.
            let planned_key = reply.step.stable_key();
            if state.previous_planned_key.as_deref() == Some(planned_key.as_str()) {
                let attempts = state.retry_counts.entry(planned_key.clone()).or_insert(0);
                *attempts += 1;
                self.sessions
                    .emit(session_id, EventKind::StepRefinementStarted { attempt: *attempts })?;
            } else {
                state.retry_counts.remove(&planned_key);
            }
            state.previous_planned_key = Some(planned_key.clone());

            if self.sessions.is_cancelled(session_id) {
                self.sessions.complete(session_id, SessionStatus::Cancelled, None)?;
                return Err(gf_domain::error::Error::Other("session cancelled".into()));
            }

            // Step 6: execute, emit step_executing / step_executed.
            self.sessions.emit(session_id, EventKind::StepExecuting)?;
            let step = reply.step.clone();
            let execution = self.executor.execute(&step, &self.resolver).await;
            let index = state.steps.len() as u32;

            let outcome = match execution {
                Ok(outcome) => {
                    self.sessions.emit(
                        session_id,
                        EventKind::StepExecuted { index, success: true, duration_ms: outcome.duration.as_millis() as u64 },
                    )?;
                    outcome
                }
                Err(e) => {
                    // An execution error ends the session as Failed
                    // unless it falls within the refinement cap for
                    // this step key, in which case the loop replans
                    // instead of terminating (spec.md 7).
                    let kind = match &e {
                        gf_domain::error::Error::Execution { kind, .. } => kind.to_string(),
                        _ => "other".into(),
                    };
                    self.sessions
                        .emit(session_id, EventKind::StepFailed { index, kind, message: e.to_string() })?;

                    let attempts = state.retry_counts.get(&planned_key).copied().unwrap_or(0);
                    if attempts < self.cfg.max_refines_per_step {
                        tokio::time::sleep(Duration::from_millis(self.cfg.iteration_pause_ms)).await;
                        continue;
                    }

                    self.sessions
                        .complete(session_id, SessionStatus::Failed, Some(e.to_string()))?;
                    return Err(e);
                }
            };
            state.steps.push(step.clone());

            // Step 7: capture post-execution context for next iteration.
            let post_dom = outcome.dom_snapshot.clone().unwrap_or_default();
            state.previous_step_state = Some(PreviousState {
                url: self.driver.current_url().await.unwrap_or(current_url),
                cleaned_dom: post_dom,
                screenshot: outcome.screenshot.clone(),
                navigation_occurred: outcome.ui_change.navigation_occurred,
            });

            if let Some(validation) = &reply.step_validation {
                self.sessions.emit(
                    session_id,
                    EventKind::ValidationPerformed {
                        step_valid: validation.success,
                        goal_complete: reply.goal_validation.as_ref().map(|g| g.is_complete).unwrap_or(false),
                    },
                )?;
            }

            // Step 8: terminate on goal completion, or AssertPage
            // back-compat success.
            let goal_complete = reply.goal_validation.as_ref().map(|g| g.is_complete).unwrap_or(false);
            let assert_page_backcompat = matches!(step, Step::AssertPage { .. }) && outcome.success;
            if goal_complete || assert_page_backcompat {
                return self.finish(session_id, state.steps).await;
            }

            // Step 9: progress.
            self.sessions.emit(
                session_id,
                EventKind::GoalProgress { fraction: (i + 1) as f32 / cap as f32 },
            )?;

            // Step 10: cooperative pause, then loop.
            tokio::time::sleep(Duration::from_millis(self.cfg.iteration_pause_ms)).await;
        }

        self.sessions
            .complete(session_id, SessionStatus::Failed, Some("step cap exceeded".into()))?;
        Err(gf_domain::error::Error::Other("step cap exceeded".into()))
    }

    async fn finish(&self, session_id: Uuid, steps: Vec<Step>) -> Result<RunOutcome> {
        let guide = MarkdownEmitter::render(
            "Generated Guide",
            &steps
                .iter()
                .find_map(|s| match s {
                    Step::Goto { url } => Some(url.clone()),
                    _ => None,
                })
                .unwrap_or_default(),
            "en",
            "generated-scripts",
            false,
            steps,
            "Automatically generated from a recorded session.",
            None,
        )?;

        self.sessions.emit(session_id, EventKind::MarkdownGenerated)?;
        self.sessions.emit(session_id, EventKind::ScriptSaving)?;
        self.sessions
            .emit(session_id, EventKind::ScriptSaved { path: "generated-scripts".into() })?;
        self.sessions.emit(session_id, EventKind::Completed)?;
        self.sessions.complete(session_id, SessionStatus::Completed, None)?;

        Ok(RunOutcome { steps: guide.steps.clone(), markdown: guide.markdown })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_browser::driver::ElementHandle;
    use gf_browser::fake::FakeBrowserDriver;
    use gf_domain::session::SessionKind;
    use gf_llm::openai_compat::StaticLlmClient;
    use parking_lot::Mutex;

    /// Wraps a `FakeBrowserDriver` and cancels the session after the
    /// Nth click, to deterministically exercise mid-script cancellation
    /// without relying on task-scheduling timing.
    struct CancelAfterNClicks {
        inner: FakeBrowserDriver,
        sessions: Arc<SessionManager>,
        session_id: Uuid,
        trigger_after: u32,
        clicks_seen: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl BrowserDriver for CancelAfterNClicks {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.inner.navigate(url).await
        }
        async fn locate_by_label(&self, label: &str) -> Result<ElementHandle> {
            self.inner.locate_by_label(label).await
        }
        async fn type_text(&self, target: &ElementHandle, value: &str) -> Result<()> {
            self.inner.type_text(target, value).await
        }
        async fn click(&self, target: &ElementHandle) -> Result<()> {
            self.inner.click(target).await?;
            let mut seen = self.clicks_seen.lock();
            *seen += 1;
            if *seen == self.trigger_after {
                self.sessions.cancel(self.session_id);
            }
            Ok(())
        }
        async fn press_key(&self, key: &str) -> Result<()> {
            self.inner.press_key(key).await
        }
        async fn screenshot(&self) -> Result<Vec<u8>> {
            self.inner.screenshot().await
        }
        async fn dom_snapshot(&self) -> Result<String> {
            self.inner.dom_snapshot().await
        }
        async fn wait_quiescence(&self, cfg: &QuiescenceConfig) -> Result<()> {
            self.inner.wait_quiescence(cfg).await
        }
        async fn current_url(&self) -> Result<String> {
            self.inner.current_url().await
        }
    }

    fn scripted_reply(step_json: &str, goal_complete: bool) -> String {
        format!(
            r#"{{"step": {step_json}, "confidence": 0.9, "matches_goal": {goal_complete}, "reasoning": "ok", "goal_validation": {{"is_complete": {goal_complete}, "reasoning": "done"}}}}"#
        )
    }

    #[tokio::test]
    async fn happy_path_completes_on_goal_validation() {
        let sessions = Arc::new(SessionManager::new(64));
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
        let llm = Arc::new(StaticLlmClient::new(scripted_reply(
            r#"{"type": "click", "label": "Next"}"#,
            true,
        )));

        let orchestrator = Orchestrator::new(
            sessions.clone(),
            driver,
            llm,
            OrchestratorConfig::default(),
            QuiescenceConfig::default(),
            ImageConfig::default(),
        );

        let id = Uuid::new_v4();
        sessions.create(id, SessionKind::Run, None).unwrap();
        let outcome = orchestrator.run(id, "click next", "https://example.com").await.unwrap();
        assert!(!outcome.steps.is_empty());
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn stuck_loop_fails_after_repeated_triples() {
        let sessions = Arc::new(SessionManager::new(64));
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
        let llm = Arc::new(StaticLlmClient::new(scripted_reply(
            r#"{"type": "click", "label": "Next"}"#,
            false,
        )));

        let mut cfg = OrchestratorConfig::default();
        cfg.max_steps_per_session = 10;
        cfg.iteration_pause_ms = 0;
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
        let result = orchestrator.run(id, "click forever", "https://example.com").await;
        assert!(result.is_err());
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_iteration_boundary() {
        let sessions = Arc::new(SessionManager::new(64));
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeBrowserDriver::new("https://example.com", vec!["Next".into()]));
        let llm = Arc::new(StaticLlmClient::new(scripted_reply(
            r#"{"type": "click", "label": "Next"}"#,
            false,
        )));

        let mut cfg = OrchestratorConfig::default();
        cfg.iteration_pause_ms = 0;
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
        sessions.cancel(id);
        let result = orchestrator.run(id, "anything", "https://example.com").await;
        assert!(result.is_err());
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn replay_happy_path_resolves_placeholders_and_completes() {
        let sessions = Arc::new(SessionManager::new(64));
        let fake = Arc::new(
            FakeBrowserDriver::new(
                "https://example.com/login",
                vec!["Username".into(), "Password".into(), "Login".into()],
            )
            .with_transition("https://example.com/login", "Login", "https://example.com/dashboard"),
        );
        let driver: Arc<dyn BrowserDriver> = fake.clone();
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

        let id = Uuid::new_v4();
        sessions.create(id, SessionKind::Run, None).unwrap();
        let outcome = orchestrator.replay(id, script).await.unwrap();

        assert_eq!(outcome.steps.len(), 5);
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Completed);
        assert_eq!(fake.typed_value("Username"), Some("alice".to_string()));
        assert_eq!(fake.typed_value("Password"), Some("hunter2".to_string()));
    }

    #[tokio::test]
    async fn replay_cancellation_mid_script_stops_before_remaining_steps() {
        let sessions = Arc::new(SessionManager::new(64));
        let id = Uuid::new_v4();
        sessions.create(id, SessionKind::Run, None).unwrap();

        let driver: Arc<dyn BrowserDriver> = Arc::new(CancelAfterNClicks {
            inner: FakeBrowserDriver::new("https://example.com", vec!["Next".into()]),
            sessions: sessions.clone(),
            session_id: id,
            trigger_after: 3,
            clicks_seen: Mutex::new(0),
        });
        let llm = Arc::new(StaticLlmClient::new("{}"));

        let orchestrator = Orchestrator::new(
            sessions.clone(),
            driver,
            llm,
            OrchestratorConfig::default(),
            QuiescenceConfig::default(),
            ImageConfig::default(),
        );

        let script = vec![
            Step::Goto { url: "https://example.com".into() },
            Step::Click { label: "Next".into() },
            Step::Click { label: "Next".into() },
            Step::Click { label: "Next".into() },
            Step::Click { label: "Next".into() },
            Step::Click { label: "Next".into() },
        ];

        let result = orchestrator.replay(id, script).await;
        assert!(result.is_err());
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn execution_errors_tolerate_refinement_then_fail() {
        let sessions = Arc::new(SessionManager::new(64));
        let driver: Arc<dyn BrowserDriver> =
            Arc::new(FakeBrowserDriver::new("https://example.com", vec![]));
        let llm = Arc::new(StaticLlmClient::new(scripted_reply(
            r#"{"type": "click", "label": "Ghost"}"#,
            false,
        )));

        let mut cfg = OrchestratorConfig::default();
        cfg.max_refines_per_step = 1;
        cfg.max_steps_per_session = 5;
        cfg.iteration_pause_ms = 0;
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
        let result = orchestrator.run(id, "click ghost", "https://example.com").await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Ghost"));
        assert_eq!(sessions.status(id).unwrap().status, SessionStatus::Failed);
    }
}
