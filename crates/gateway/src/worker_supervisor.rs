use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use tokio::process::{Child, Command};
use uuid::Uuid;

use gf_domain::error::{Error, Result};

/// One detached worker process bound to a session id.
struct WorkerHandle {
    child: Child,
}

/// Spawns and tracks the detached worker processes that actually run a
/// session's Orchestrator (spec.md 3, 4.6), keyed by the session id
/// they were preallocated for. Grounded on the teacher's
/// `ProcessManager`: an in-memory registry over child processes the
/// manager itself never drives, only tracks and can kill.
pub struct WorkerSupervisor {
    worker_binary: PathBuf,
    workers: RwLock<HashMap<Uuid, WorkerHandle>>,
}

impl WorkerSupervisor {
    /// `worker_binary` is the path to the `gf-worker` executable; the
    /// facade resolves it once at startup via [`std::env::current_exe`]
    /// when the facade and worker are the same compiled binary.
    pub fn new(worker_binary: PathBuf) -> Self {
        Self {
            worker_binary,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Launches a detached worker for `session_id`, pointing it at the
    /// job file the facade already wrote and the path its event log
    /// should be mirrored to. Fails if a worker is already tracked for
    /// this session.
    pub fn spawn(&self, session_id: Uuid, job_path: &std::path::Path, events_path: &std::path::Path) -> Result<()> {
        if self.workers.read().contains_key(&session_id) {
            return Err(Error::Other(format!("worker already running for session {session_id}")));
        }

        let mut cmd = Command::new(&self.worker_binary);
        cmd.arg("--session").arg(session_id.to_string());
        cmd.arg("--job").arg(job_path);
        cmd.arg("--events").arg(events_path);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| Error::Other(format!("failed to spawn worker for session {session_id}: {e}")))?;

        self.workers.write().insert(session_id, WorkerHandle { child });
        Ok(())
    }

    /// True if a worker is currently tracked for this session (it may
    /// already have exited; [`WorkerSupervisor::reap`] clears those).
    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.workers.read().contains_key(&session_id)
    }

    /// Sends a kill signal to the worker process. Cancellation still
    /// relies on the session's terminal event eventually landing in the
    /// event log — the worker is expected to react to the same kind of
    /// cooperative cancellation signal the in-process Orchestrator
    /// honors, and this is the forceful backstop.
    pub async fn kill(&self, session_id: Uuid) -> Result<()> {
        let mut workers = self.workers.write();
        if let Some(handle) = workers.get_mut(&session_id) {
            handle
                .child
                .start_kill()
                .map_err(|e| Error::Other(format!("failed to kill worker for session {session_id}: {e}")))?;
        }
        Ok(())
    }

    /// Removes worker entries whose process has already exited.
    /// Returns the session ids that were reaped.
    pub fn reap_finished(&self) -> Vec<Uuid> {
        let mut workers = self.workers.write();
        let mut finished = Vec::new();
        workers.retain(|session_id, handle| {
            let still_running = matches!(handle.child.try_wait(), Ok(None));
            if !still_running {
                finished.push(*session_id);
            }
            still_running
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_binary() -> PathBuf {
        PathBuf::from("sleep")
    }

    #[tokio::test]
    async fn spawn_tracks_a_running_worker() {
        let supervisor = WorkerSupervisor::new(sleep_binary());
        let id = Uuid::new_v4();
        let job = std::env::temp_dir().join(format!("{id}.json"));
        // `sleep`'s args don't matter here; the point is exercising the
        // tracking/kill lifecycle, not the real worker protocol.
        let events = std::env::temp_dir().join(format!("{id}.ndjson"));
        supervisor.spawn(id, &job, &events).unwrap();
        assert!(supervisor.is_running(id));
    }

    #[tokio::test]
    async fn spawn_twice_for_the_same_session_fails() {
        let supervisor = WorkerSupervisor::new(sleep_binary());
        let id = Uuid::new_v4();
        let job = std::env::temp_dir().join(format!("{id}.json"));
        let events = std::env::temp_dir().join(format!("{id}.ndjson"));
        supervisor.spawn(id, &job, &events).unwrap();
        assert!(supervisor.spawn(id, &job, &events).is_err());
    }

    #[tokio::test]
    async fn kill_then_reap_clears_the_session() {
        let supervisor = WorkerSupervisor::new(sleep_binary());
        let id = Uuid::new_v4();
        let job = std::env::temp_dir().join(format!("{id}.json"));
        let events = std::env::temp_dir().join(format!("{id}.ndjson"));
        supervisor.spawn(id, &job, &events).unwrap();
        supervisor.kill(id).await.unwrap();
        // Give the OS a moment to reap the killed child.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        supervisor.reap_finished();
        assert!(!supervisor.is_running(id));
    }
}
