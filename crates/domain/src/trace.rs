use serde::Serialize;

/// Structured trace events emitted across the GuideForge engine,
/// worth grepping out of logs even though the event log itself is not
/// persisted beyond session completion (spec.md 1 Non-goals).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        kind: String,
    },
    SessionTerminal {
        session_id: String,
        status: String,
    },
    PlanningCall {
        session_id: String,
        duration_ms: u64,
        confidence: f32,
    },
    PlaceholderResolved {
        url: String,
        label_count: usize,
        mapped_count: usize,
        dropped_count: usize,
    },
    StepDispatched {
        session_id: String,
        step_kind: String,
        success: bool,
        duration_ms: u64,
    },
    LoopDetected {
        session_id: String,
        window: usize,
    },
    WorkerSpawned {
        session_id: String,
        pid: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gf_event");
    }
}
