use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Inputs assembled fresh for each planning iteration (spec.md 3, 4.4).
/// Never persisted.
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub goal_prompt: String,
    pub current_url: String,
    pub cleaned_dom: String,
    pub screenshot: Option<Vec<u8>>,
    pub step_history: Vec<Step>,
    pub previous_reasoning: Option<String>,
    pub previous_state: Option<PreviousState>,
    pub goal_success_criteria: String,
}

#[derive(Debug, Clone)]
pub struct PreviousState {
    pub url: String,
    pub cleaned_dom: String,
    pub screenshot: Option<Vec<u8>>,
    pub navigation_occurred: bool,
}

/// Validation of the previous step, carried inside a `PlannerReply`
/// when a previous step exists (spec.md 4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepValidation {
    pub success: bool,
    pub reasoning: String,
}

/// Validation of overall goal completion (spec.md 4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalValidation {
    pub is_complete: bool,
    pub reasoning: String,
}

/// The single JSON object the LLM returns per planning call
/// (spec.md 4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerReply {
    pub step: Step,
    pub confidence: f32,
    pub matches_goal: bool,
    pub reasoning: String,
    #[serde(default)]
    pub step_validation: Option<StepValidation>,
    #[serde(default)]
    pub goal_validation: Option<GoalValidation>,
    /// Set only by [`PlannerReply::fallback`]; never sent by an LLM, so
    /// it unambiguously marks a planning error rather than a genuine
    /// low-confidence step (spec.md 7: "treated as a planning error by
    /// the orchestrator").
    #[serde(default, skip_serializing)]
    pub is_fallback: bool,
}

impl PlannerReply {
    /// A low-confidence fallback used when the LLM call fails, its
    /// output can't be recovered as JSON, or a required field is
    /// missing (spec.md 4.4, 7: "treated as a planning error by the
    /// orchestrator").
    pub fn fallback(reason: &str) -> Self {
        Self {
            step: Step::Keypress { key: "Escape".into() },
            confidence: 0.0,
            matches_goal: false,
            reasoning: format!("planner fallback: {reason}"),
            step_validation: None,
            goal_validation: None,
            is_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiChange {
    pub navigation_occurred: bool,
    pub elements_appeared: u32,
    pub elements_disappeared: u32,
}
