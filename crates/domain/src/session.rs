use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Run,
    Prompt,
}

/// Session lifecycle status. Monotone non-terminal → terminal
/// (spec.md 3, 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// A session snapshot, as returned by `status()` (spec.md 4.1: "no
/// event data").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
    pub error: Option<String>,
    pub script_id: Option<Uuid>,
}

impl Session {
    pub fn new(id: Uuid, kind: SessionKind) -> Self {
        Self {
            id,
            kind,
            status: SessionStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            current_step: None,
            total_steps: None,
            error: None,
            script_id: None,
        }
    }

    pub fn start(&mut self) {
        if self.status == SessionStatus::Created {
            self.status = SessionStatus::Started;
            self.started_at = Some(Utc::now());
        }
    }

    /// Terminal transition from any non-terminal state. A no-op if
    /// already terminal (spec.md 4.1: "any attempt to re-enter a
    /// terminal state is a silent no-op").
    pub fn complete(&mut self, status: SessionStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
        if status == SessionStatus::Completed {
            self.progress = 100;
        }
    }

    /// Progress is monotone non-decreasing (spec.md 3).
    pub fn set_progress(&mut self, progress: u8) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }
}
