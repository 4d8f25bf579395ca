use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use gf_domain::config::Config;
use gf_domain::error::{Error, Result};
use gf_domain::event::{Event, EventKind};
use gf_domain::session::{Session, SessionKind, SessionStatus};
use gf_domain::step::Step;
use gf_store::{Tailer, WorkspaceLayout};

use crate::job::{JobKind, JobSpec};
use crate::worker_supervisor::WorkerSupervisor;

/// The library-level entrypoint consumers embed (spec.md 2, 5): one
/// call per operation, no HTTP surface. Grounded on the teacher's
/// `AppState`: a small struct of `Arc<...>`-wrapped services handed to
/// every call site, rather than a free-floating set of functions.
pub struct GatewayFacade {
    storage_root: PathBuf,
    config: Config,
    supervisor: Arc<WorkerSupervisor>,
}

impl GatewayFacade {
    pub fn new(storage_root: PathBuf, config: Config, worker_binary: PathBuf) -> Self {
        Self {
            storage_root,
            config,
            supervisor: Arc::new(WorkerSupervisor::new(worker_binary)),
        }
    }

    fn workspace(&self, account_id: &str, workspace_id: &str) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.storage_root, account_id, workspace_id)
    }

    /// Writes the job file and hands it to a freshly spawned worker,
    /// returning the session id the caller subscribes/cancels against.
    fn dispatch(
        &self,
        account_id: &str,
        workspace_id: &str,
        secret_values: HashMap<String, String>,
        variable_values: HashMap<String, String>,
        kind: JobKind,
    ) -> Result<Uuid> {
        let session_id = Uuid::new_v4();
        let workspace = self.workspace(account_id, workspace_id);
        let session_dir = workspace.session_dir(session_id);
        WorkspaceLayout::ensure_dir(&session_dir)?;

        let job = JobSpec {
            account_id: account_id.to_string(),
            workspace_id: workspace_id.to_string(),
            secret_values,
            variable_values,
            kind,
        };
        let job_path = session_dir.join("job.json");
        let job_json = serde_json::to_string_pretty(&job)?;
        std::fs::write(&job_path, job_json)?;

        let events_path = workspace.events_path(session_id);
        self.supervisor.spawn(session_id, &job_path, &events_path)?;
        Ok(session_id)
    }

    /// Starts a Prompt session: a worker process plans and executes
    /// steps toward `goal_prompt` starting from `base_url` (spec.md 3).
    pub fn start_generate(
        &self,
        account_id: &str,
        workspace_id: &str,
        goal_prompt: String,
        base_url: String,
        secret_values: HashMap<String, String>,
        variable_values: HashMap<String, String>,
    ) -> Result<Uuid> {
        self.dispatch(
            account_id,
            workspace_id,
            secret_values,
            variable_values,
            JobKind::Generate { goal_prompt, base_url },
        )
    }

    /// Starts a Run session: a worker process replays `steps` in order
    /// (spec.md 3).
    pub fn start_run(
        &self,
        account_id: &str,
        workspace_id: &str,
        steps: Vec<Step>,
        secret_values: HashMap<String, String>,
        variable_values: HashMap<String, String>,
    ) -> Result<Uuid> {
        self.dispatch(account_id, workspace_id, secret_values, variable_values, JobKind::Run { steps })
    }

    /// Streams a session's events from its durable NDJSON mirror
    /// rather than an in-memory bus: the orchestrator driving this
    /// session runs in a separate worker process, so the only shared
    /// state between this call and that process is the event log file
    /// (spec.md 4.9).
    pub fn subscribe(&self, account_id: &str, workspace_id: &str, session_id: Uuid) -> tokio::sync::mpsc::Receiver<Event> {
        let workspace = self.workspace(account_id, workspace_id);
        let events_path = workspace.events_path(session_id);
        let tailer = Tailer::new(
            events_path,
            Duration::from_millis(self.config.event_log.tail_poll_interval_ms),
            Duration::from_millis(self.config.event_log.tail_appear_timeout_ms),
        );
        let (tx, rx) = tokio::sync::mpsc::channel(self.config.event_log.event_buffer_size.max(16));
        tokio::spawn(async move {
            if let Err(e) = tailer.run(tx).await {
                tracing::warn!(session_id = %session_id, error = %e, "event tailer stopped early");
            }
        });
        rx
    }

    /// Reconstructs a session snapshot by replaying its event log to
    /// completion or to whatever has been written so far. Used for a
    /// one-shot status check rather than a live stream.
    pub async fn status(&self, account_id: &str, workspace_id: &str, session_id: Uuid) -> Result<Session> {
        let workspace = self.workspace(account_id, workspace_id);
        let events_path = workspace.events_path(session_id);
        if !events_path.exists() {
            return Err(Error::NotFound(format!("session {session_id}")));
        }

        let tailer = Tailer::new(events_path, Duration::from_millis(10), Duration::from_millis(50));
        let (tx, mut rx) = tokio::sync::mpsc::channel(256);
        // A timed-out wait here just means "no new events arrived
        // within the short window", not a missing session; the file's
        // existence was already confirmed above. Run concurrently with
        // draining below so a log larger than the channel capacity
        // can't deadlock against an un-drained sender.
        let tailer_task = tokio::spawn(tailer.run(tx));

        let mut session = Session::new(session_id, SessionKind::Run);
        let mut saw_any = false;
        while let Some(event) = rx.recv().await {
            saw_any = true;
            match &event.kind {
                EventKind::SessionStarted => session.start(),
                EventKind::StepExecuted { index, .. } => session.current_step = Some(*index),
                EventKind::SessionCompleted => session.complete(SessionStatus::Completed, None),
                EventKind::SessionFailed { error } => session.complete(SessionStatus::Failed, Some(error.clone())),
                EventKind::SessionCancelled => session.complete(SessionStatus::Cancelled, None),
                _ => {}
            }
        }
        let _ = tailer_task.await;
        if !saw_any {
            return Err(Error::NotFound(format!("session {session_id}")));
        }
        Ok(session)
    }

    /// Forcibly terminates the worker process running this session.
    /// The worker is expected to have written its own terminal event
    /// before dying in the common case (cooperative cancellation); this
    /// is the backstop for a worker that is stuck or unresponsive.
    pub async fn cancel(&self, session_id: Uuid) -> Result<()> {
        self.supervisor.kill(session_id).await
    }
}
