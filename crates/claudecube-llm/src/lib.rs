//! LLM plumbing for ClaudeCube: the Anthropic client, the tool-call
//! evaluator, the reply classifier, the transcript summariser, and cost
//! accounting.
//!
//! The evaluator and the classifier share a model id but are separate
//! adapters so either can be mocked without the other; cost accounting
//! tells them apart by purpose tag.

pub mod classifier;
pub mod client;
pub mod cost;
pub mod evaluator;
pub mod prompts;
pub mod summarizer;

pub use client::{AnthropicClient, LlmClient, LlmRequest, LlmResponse, MockLlmClient};

/// Model used when the config does not override it.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
