//! LLM client abstraction, OpenAI-compatible HTTP adapter, balanced-
//! brace JSON recovery, and screenshot resize/recompress for the LLM
//! Planner and Placeholder Resolver (spec.md 4.3, 4.4).

pub mod client;
pub mod image;
pub mod json_recovery;
pub mod openai_compat;

pub use client::{ChatRequest, ChatResponse, LlmClient};
pub use openai_compat::{OpenAiCompatClient, StaticLlmClient};
