//! Transcript summarisation for approval messages.

use std::sync::Arc;

use anyhow::Result;

use claudecube_core::transcript::{truncate_chars, TranscriptExcerpt};

use crate::client::{LlmClient, LlmRequest};
use crate::cost::CostLog;
use crate::prompts;

/// Per-message character cap fed into the prompt.
const PER_MESSAGE_CHARS: usize = 600;
/// Aggregate prompt cap.
const TOTAL_CHARS: usize = 8_000;
const MAX_TOKENS: u32 = 300;

/// Returned for an empty excerpt, without touching the API.
pub const EMPTY_SUMMARY: &str = "No transcript messages available.";

pub struct TranscriptSummarizer {
    client: Arc<dyn LlmClient>,
    model: String,
    costs: Option<Arc<CostLog>>,
}

impl TranscriptSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, model: String, costs: Option<Arc<CostLog>>) -> Self {
        Self {
            client,
            model,
            costs,
        }
    }

    /// Produce a 3-5 sentence summary. API errors propagate; callers
    /// degrade gracefully.
    pub async fn summarize(&self, excerpt: &TranscriptExcerpt) -> Result<String> {
        if excerpt.messages.is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }

        let mut body = String::new();
        for msg in &excerpt.messages {
            let who = if msg.role == "user" { "User" } else { "Agent" };
            let text = truncate_chars(msg.text.trim(), PER_MESSAGE_CHARS);
            let mut line = format!("{who}: {text}\n");
            for tool in &msg.tool_uses {
                line.push_str(&format!("  [{}] {}\n", tool.name, tool.input_summary));
            }
            if body.len() + line.len() > TOTAL_CHARS {
                break;
            }
            body.push_str(&line);
        }

        let request = LlmRequest {
            model: self.model.clone(),
            system_prompt: prompts::summary_system_prompt(),
            user_prompt: body,
            max_tokens: MAX_TOKENS,
        };
        let response = self.client.complete(&request).await?;

        if let Some(costs) = &self.costs {
            costs.record("summary", &response);
        }

        Ok(response.content.trim().to_string())
    }
}
