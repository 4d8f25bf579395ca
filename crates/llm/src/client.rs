use gf_domain::error::Result;
use serde::{Deserialize, Serialize};

/// One chat completion request. The planner and the placeholder
/// resolver are both single-shot JSON-object callers (spec.md 4.3,
/// 4.4) — neither needs token streaming, unlike the teacher's
/// tool-calling loop, so there is no `chat_stream` here.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Base64-encoded JPEG/PNG, already resized/recompressed by
    /// [`crate::image::prepare_screenshot`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_b64: Option<String>,
    /// Request strict JSON-object output when the provider supports it.
    pub json_mode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub text: String,
}

/// Injected LLM client dependency (spec.md 9: "module-level LLM
/// client → injected dependency"). Mirrors the teacher's
/// `LlmProvider` trait shape (`crates/providers/src/traits.rs`),
/// narrowed to the one call this engine needs.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
