use std::sync::Arc;

use gf_domain::config::ImageConfig;
use gf_domain::error::Result;
use gf_domain::planning::{PlannerReply, PlanningContext};
use gf_llm::client::{ChatRequest, LlmClient};
use gf_llm::image::{prepare_screenshot, to_base64};
use gf_llm::json_recovery::recover_json_object;

/// Dropdown discipline (spec.md 4.4) is a prompt convention, not code:
/// a Type step is never proposed for a picker/combobox field.
const SYSTEM_PROMPT: &str = "You are driving a web browser one step at a time to accomplish a \
goal. Reply with exactly one JSON object describing the single next step, a confidence in \
[0,1], a matchesGoal flag, a reasoning string, and — when a previous step exists — a \
step_validation object {success, reasoning} and a goal_validation object {is_complete, \
reasoning}. Never propose a type step for a dropdown, picker, or combobox field: open it with \
a click, then click the option, or press Escape to close it without selecting.";

/// Used for the single retry after a planning error (spec.md 7: "one
/// immediate retry of the planner with a tightened system prompt").
const TIGHTENED_SYSTEM_PROMPT: &str = "Your previous reply could not be used: it either failed \
to arrive, was not valid JSON, or was missing a required field. Reply again with exactly one \
JSON object and nothing else — no prose, no markdown fences. The object must contain: step \
(an object with a \"type\" field and that step type's own fields), confidence (a number in \
[0,1]), matches_goal (a boolean), and reasoning (a string). When a previous step exists, also \
include step_validation {success, reasoning} and goal_validation {is_complete, reasoning}. \
Never propose a type step for a dropdown, picker, or combobox field: open it with a click, \
then click the option, or press Escape to close it without selecting.";

fn cleaned_dom_excerpt(dom: &str, max_chars: usize) -> String {
    if dom.chars().count() <= max_chars {
        dom.to_string()
    } else {
        dom.chars().take(max_chars).collect::<String>() + "…"
    }
}

fn build_user_prompt(ctx: &PlanningContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Goal: {}\n", ctx.goal_prompt));
    prompt.push_str(&format!("Success criteria: {}\n", ctx.goal_success_criteria));
    prompt.push_str(&format!("Current URL: {}\n", ctx.current_url));
    prompt.push_str(&format!("DOM (cleaned, bounded):\n{}\n", cleaned_dom_excerpt(&ctx.cleaned_dom, 8000)));

    if !ctx.step_history.is_empty() {
        prompt.push_str("Step history:\n");
        for (i, step) in ctx.step_history.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, step.stable_key()));
        }
    }

    if let Some(reasoning) = &ctx.previous_reasoning {
        prompt.push_str(&format!("Previous step reasoning: {reasoning}\n"));
    }
    if let Some(prev) = &ctx.previous_state {
        prompt.push_str(&format!(
            "Previous state: url={} navigation_occurred={}\n",
            prev.url, prev.navigation_occurred
        ));
    }
    prompt
}

/// Given a goal prompt, current page context, and history, asks the
/// LLM for the next single step plus validation of the previous step
/// and of the overall goal (spec.md 4.4).
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    image_cfg: ImageConfig,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, image_cfg: ImageConfig) -> Self {
        Self { llm, image_cfg }
    }

    /// Plans the next step. `tightened` selects the stricter retry
    /// prompt used after a first planning error (spec.md 7); callers
    /// should only ever pass `true` for that one immediate retry.
    pub async fn plan(&self, ctx: &PlanningContext, tightened: bool) -> Result<PlannerReply> {
        let image_b64 = match &ctx.screenshot {
            Some(raw) => match prepare_screenshot(raw, &self.image_cfg) {
                Ok(prepared) => Some(to_base64(&prepared)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to prepare screenshot; planning without image");
                    None
                }
            },
            None => None,
        };

        let system = if tightened { TIGHTENED_SYSTEM_PROMPT } else { SYSTEM_PROMPT };
        let request = ChatRequest {
            system: system.to_string(),
            user: build_user_prompt(ctx),
            image_b64,
            json_mode: true,
        };

        let response = match self.llm.complete(&request).await {
            Ok(r) => r,
            Err(e) => return Ok(PlannerReply::fallback(&e.to_string())),
        };

        let value = match recover_json_object(&response.text) {
            Ok(v) => v,
            Err(e) => return Ok(PlannerReply::fallback(&e.to_string())),
        };

        match serde_json::from_value::<PlannerReply>(value) {
            Ok(reply) => Ok(reply),
            Err(e) => Ok(PlannerReply::fallback(&format!("malformed planner reply: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_domain::planning::PlanningContext;
    use gf_llm::openai_compat::StaticLlmClient;

    fn base_ctx() -> PlanningContext {
        PlanningContext {
            goal_prompt: "log in".into(),
            current_url: "https://example.com/login".into(),
            cleaned_dom: "<form></form>".into(),
            screenshot: None,
            step_history: vec![],
            previous_reasoning: None,
            previous_state: None,
            goal_success_criteria: "reach the dashboard".into(),
        }
    }

    #[tokio::test]
    async fn parses_well_formed_reply() {
        let llm = Arc::new(StaticLlmClient::new(
            r#"{"step": {"type": "goto", "url": "https://example.com"}, "confidence": 0.8, "matches_goal": false, "reasoning": "start"}"#,
        ));
        let planner = LlmPlanner::new(llm, ImageConfig::default());
        let reply = planner.plan(&base_ctx(), false).await.unwrap();
        assert_eq!(reply.confidence, 0.8);
    }

    #[tokio::test]
    async fn falls_back_on_unparseable_reply() {
        let llm = Arc::new(StaticLlmClient::new("not json at all"));
        let planner = LlmPlanner::new(llm, ImageConfig::default());
        let reply = planner.plan(&base_ctx(), false).await.unwrap();
        assert_eq!(reply.confidence, 0.0);
    }

    #[tokio::test]
    async fn falls_back_when_required_field_missing() {
        let llm = Arc::new(StaticLlmClient::new(r#"{"confidence": 0.5}"#));
        let planner = LlmPlanner::new(llm, ImageConfig::default());
        let reply = planner.plan(&base_ctx(), false).await.unwrap();
        assert_eq!(reply.confidence, 0.0);
        assert!(reply.is_fallback);
    }

    #[tokio::test]
    async fn well_formed_reply_is_not_marked_fallback() {
        let llm = Arc::new(StaticLlmClient::new(
            r#"{"step": {"type": "goto", "url": "https://example.com"}, "confidence": 0.0, "matches_goal": false, "reasoning": "start"}"#,
        ));
        let planner = LlmPlanner::new(llm, ImageConfig::default());
        let reply = planner.plan(&base_ctx(), false).await.unwrap();
        assert!(!reply.is_fallback);
    }

    #[test]
    fn prompt_encodes_dropdown_discipline() {
        assert!(SYSTEM_PROMPT.contains("dropdown"));
        assert!(SYSTEM_PROMPT.contains("combobox"));
    }

    #[test]
    fn tightened_prompt_also_encodes_dropdown_discipline() {
        assert!(TIGHTENED_SYSTEM_PROMPT.contains("dropdown"));
        assert!(TIGHTENED_SYSTEM_PROMPT.contains("combobox"));
    }

    #[test]
    fn user_prompt_includes_history_and_previous_state() {
        let mut ctx = base_ctx();
        ctx.step_history.push(gf_domain::step::Step::Goto { url: "https://example.com".into() });
        ctx.previous_reasoning = Some("clicked login".into());
        ctx.previous_state = Some(gf_domain::planning::PreviousState {
            url: "https://example.com".into(),
            cleaned_dom: "<html></html>".into(),
            screenshot: None,
            navigation_occurred: true,
        });
        let prompt = build_user_prompt(&ctx);
        assert!(prompt.contains("Step history"));
        assert!(prompt.contains("clicked login"));
        assert!(prompt.contains("navigation_occurred=true"));
    }
}
