//! `gf-worker`: the detached worker entrypoint re-executed by
//! [`gf_gateway::WorkerSupervisor`]. Reads a [`gf_gateway::JobSpec`]
//! off disk, runs it to completion against a durable event log, and
//! exits. Never imports `clap` or an HTTP stack (spec.md 2 scopes the
//! transport surface out): args are parsed by hand, the same way the
//! facade's own surface is a plain function-call API rather than a
//! server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use gf_browser::driver::BrowserDriver;
use gf_browser::fake::FakeBrowserDriver;
use gf_domain::config::Config;
use gf_domain::session::SessionKind;
use gf_engine::Orchestrator;
use gf_gateway::job::{JobKind, JobSpec};
use gf_llm::client::LlmClient;
use gf_llm::openai_compat::OpenAiCompatClient;
use gf_sessions::manager::SessionManager;
use gf_store::EventLogWriter;

struct Args {
    session: Uuid,
    job: PathBuf,
    events: PathBuf,
}

fn parse_args() -> Args {
    let mut session = None;
    let mut job = None;
    let mut events = None;

    let mut raw = std::env::args().skip(1);
    while let Some(flag) = raw.next() {
        let value = raw.next().unwrap_or_else(|| panic!("missing value for {flag}"));
        match flag.as_str() {
            "--session" => session = Some(Uuid::parse_str(&value).expect("--session must be a UUID")),
            "--job" => job = Some(PathBuf::from(value)),
            "--events" => events = Some(PathBuf::from(value)),
            other => panic!("unrecognized argument {other}"),
        }
    }

    Args {
        session: session.expect("--session is required"),
        job: job.expect("--job is required"),
        events: events.expect("--events is required"),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gf_worker=debug")))
        .json()
        .init();
}

/// Builds the LLM client a worker process plans/resolves with. The
/// real network-backed adapter is used whenever credentials are
/// present in the environment; otherwise a static client lets `Run`
/// sessions (which never call the planner) still function without
/// configuration.
fn build_llm_client() -> Arc<dyn LlmClient> {
    match std::env::var("GF_LLM_API_KEY") {
        Ok(api_key) => {
            let base_url = std::env::var("GF_LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
            let model = std::env::var("GF_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".into());
            Arc::new(OpenAiCompatClient::new(base_url, api_key, model))
        }
        Err(_) => Arc::new(gf_llm::openai_compat::StaticLlmClient::new(
            r#"{"step": {"type": "click", "label": "Next"}, "confidence": 0.5, "matches_goal": true, "reasoning": "no credentials configured", "goal_validation": {"is_complete": true, "reasoning": "no credentials configured"}}"#,
        )),
    }
}

/// Builds the browser driver a worker process executes steps against.
/// No real automation library is wired in (spec.md 1 scopes it out of
/// this engine); a worker embedding this binary for real runs swaps
/// this out for its own `BrowserDriver` implementation.
fn build_browser_driver() -> Arc<dyn BrowserDriver> {
    Arc::new(FakeBrowserDriver::new("about:blank", Vec::new()))
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = parse_args();

    let config_path = std::env::var("GF_CONFIG_PATH").ok().map(PathBuf::from);
    let config = match config_path {
        Some(path) => Config::load(&path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };

    let job_raw = std::fs::read_to_string(&args.job).expect("failed to read job file");
    let job: JobSpec = serde_json::from_str(&job_raw).expect("failed to parse job file");

    let sessions = Arc::new(SessionManager::new(config.event_log.event_buffer_size));
    let kind = match &job.kind {
        JobKind::Generate { .. } => SessionKind::Prompt,
        JobKind::Run { .. } => SessionKind::Run,
    };
    sessions
        .create(args.session, kind, Some(EventLogWriter::new(args.events.clone())))
        .expect("failed to register session");

    let orchestrator = Orchestrator::with_placeholder_values(
        sessions.clone(),
        build_browser_driver(),
        build_llm_client(),
        config.orchestrator.clone(),
        config.quiescence.clone(),
        config.image.clone(),
        job.secret_values,
        job.variable_values,
    );

    let result = match job.kind {
        JobKind::Generate { goal_prompt, base_url } => orchestrator.run(args.session, &goal_prompt, &base_url).await,
        JobKind::Run { steps } => orchestrator.replay(args.session, steps).await,
    };

    match result {
        Ok(outcome) => {
            tracing::info!(session_id = %args.session, steps = outcome.steps.len(), "session completed");
        }
        Err(e) => {
            // The orchestrator has already recorded a terminal
            // `session_failed`/`session_cancelled` event; this is just
            // process-exit-code bookkeeping for the supervisor.
            tracing::error!(session_id = %args.session, error = %e, "session did not complete");
            std::process::exit(1);
        }
    }
}
