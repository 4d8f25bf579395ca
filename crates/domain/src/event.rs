use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::step::Step;

/// The event payload. Tagged variants, one per known event type
/// (spec.md 6). `step_completed`/`step_executed` are treated as
/// synonyms of the same logical event; only `StepExecuted` is emitted
/// (see DESIGN.md Open Question decisions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionCompleted,
    SessionFailed { error: String },
    SessionCancelled,

    StepPlanning,
    StepPlanned { step: Step, screenshot: Option<String> },
    StepRefinementStarted { attempt: u32 },
    StepExecuting,
    StepExecuted { index: u32, success: bool, duration_ms: u64 },
    StepFailed { index: u32, kind: String, message: String },
    ValidationPerformed { step_valid: bool, goal_complete: bool },

    ScreenshotCaptured { path: String },
    DomSnapshotCaptured { path: String },

    ScriptLoaded { script_id: Uuid },
    ConfigValidated,

    VideoRecordingStarted,
    VideoRecordingStopped { path: String },

    TtsStarted { label: String },
    TtsCompleted { label: String },

    MarkdownGenerated,
    ScriptSaving,
    ScriptSaved { path: String },

    ReportGenerated,
    Completed,
    GoalProgress { fraction: f32 },

    Error { message: String },
}

impl EventKind {
    /// True for the three terminal event kinds (spec.md 3: "exactly
    /// one of session_completed / session_failed / session_cancelled
    /// last").
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::SessionCompleted | EventKind::SessionFailed { .. } | EventKind::SessionCancelled
        )
    }

    pub fn wire_type(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::SessionCompleted => "session_completed",
            EventKind::SessionFailed { .. } => "session_failed",
            EventKind::SessionCancelled => "session_cancelled",
            EventKind::StepPlanning => "step_planning",
            EventKind::StepPlanned { .. } => "step_planned",
            EventKind::StepRefinementStarted { .. } => "step_refinement_started",
            EventKind::StepExecuting => "step_executing",
            EventKind::StepExecuted { .. } => "step_executed",
            EventKind::StepFailed { .. } => "step_failed",
            EventKind::ValidationPerformed { .. } => "validation_performed",
            EventKind::ScreenshotCaptured { .. } => "screenshot_captured",
            EventKind::DomSnapshotCaptured { .. } => "dom_snapshot_captured",
            EventKind::ScriptLoaded { .. } => "script_loaded",
            EventKind::ConfigValidated => "config_validated",
            EventKind::VideoRecordingStarted => "video_recording_started",
            EventKind::VideoRecordingStopped { .. } => "video_recording_stopped",
            EventKind::TtsStarted { .. } => "tts_started",
            EventKind::TtsCompleted { .. } => "tts_completed",
            EventKind::MarkdownGenerated => "markdown_generated",
            EventKind::ScriptSaving => "script_saving",
            EventKind::ScriptSaved { .. } => "script_saved",
            EventKind::ReportGenerated => "report_generated",
            EventKind::Completed => "completed",
            EventKind::GoalProgress { .. } => "goal_progress",
            EventKind::Error { .. } => "error",
        }
    }
}

/// The wire envelope: every event carries a session id, a monotonic
/// sequence number, and a millisecond timestamp (spec.md 3, 6), with
/// the actual payload flattened alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: Uuid,
    pub seq: u64,
    pub ts: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: Uuid, seq: u64, kind: EventKind) -> Self {
        Self {
            session_id,
            seq,
            ts: chrono::Utc::now().timestamp_millis(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
