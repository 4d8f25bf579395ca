use gf_domain::error::{Error, Result};
use serde::Deserialize;
use serde_json::json;

use crate::client::{ChatRequest, ChatResponse, LlmClient};

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// An OpenAI-compatible chat completions adapter, grounded on the
/// teacher's `OpenAiCompatProvider`
/// (`crates/providers/src/openai_compat.rs`): a plain `reqwest::Client`
/// with a bearer token, a bounded timeout, and JSON request/response
/// bodies.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            http,
        }
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut user_content: Vec<serde_json::Value> = vec![json!({
            "type": "text",
            "text": request.user,
        })];
        if let Some(b64) = &request.image_b64 {
            user_content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{b64}") },
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": user_content },
            ],
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(request);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!("{status}: {text}")));
        }

        let parsed: OpenAiChatResponse = resp.json().await.map_err(from_reqwest)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Planning("empty completion response".into()))?;

        Ok(ChatResponse { text })
    }
}

/// Test double that returns a fixed string, used by the planner and
/// resolver unit tests in `gf-engine`.
#[derive(Clone)]
pub struct StaticLlmClient {
    pub response: String,
}

impl StaticLlmClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

#[async_trait::async_trait]
impl LlmClient for StaticLlmClient {
    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse { text: self.response.clone() })
    }
}
