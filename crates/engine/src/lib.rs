//! The Placeholder Resolver, LLM Planner, Step Executor, Orchestrator
//! Loop, and Markdown Emitter (spec.md 4.3-4.7).

pub mod emitter;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod resolver;

pub use emitter::MarkdownEmitter;
pub use executor::StepExecutor;
pub use orchestrator::Orchestrator;
pub use planner::LlmPlanner;
pub use resolver::PlaceholderResolver;
