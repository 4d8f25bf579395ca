use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use gf_domain::step::Step;

/// Everything a worker process needs to run one session, handed across
/// the process boundary as a single JSON file (spec.md 3: a session is
/// either "generate" — an LLM-guided Prompt run — or "run" — a replay
/// of an already-authored script).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub account_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub secret_values: HashMap<String, String>,
    #[serde(default)]
    pub variable_values: HashMap<String, String>,
    pub kind: JobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Generate { goal_prompt: String, base_url: String },
    Run { steps: Vec<Step> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_job_round_trips_through_json() {
        let job = JobSpec {
            account_id: "acct-1".into(),
            workspace_id: "ws-1".into(),
            secret_values: HashMap::new(),
            variable_values: HashMap::from([("user".to_string(), "alice".to_string())]),
            kind: JobKind::Generate { goal_prompt: "log in".into(), base_url: "https://example.com".into() },
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: JobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.variable_values.get("user"), Some(&"alice".to_string()));
        assert!(matches!(back.kind, JobKind::Generate { .. }));
    }

    #[test]
    fn run_job_round_trips_through_json() {
        let job = JobSpec {
            account_id: "acct-1".into(),
            workspace_id: "ws-1".into(),
            secret_values: HashMap::new(),
            variable_values: HashMap::new(),
            kind: JobKind::Run { steps: vec![Step::Goto { url: "https://example.com".into() }] },
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: JobSpec = serde_json::from_str(&json).unwrap();
        match back.kind {
            JobKind::Run { steps } => assert_eq!(steps.len(), 1),
            other => panic!("expected Run, got {other:?}"),
        }
    }
}
