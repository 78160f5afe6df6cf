//! Reply classification: what did the human's free-text reply mean?

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

use crate::client::{LlmClient, LlmRequest};
use crate::cost::CostLog;
use crate::prompts::{self, extract_json_object};

const MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    Approve,
    Deny,
    Forward,
    AddPolicy,
    AddRule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyEvaluation {
    pub intent: ReplyIntent,
    #[serde(default, rename = "forwardText")]
    pub forward_text: Option<String>,
    #[serde(default, rename = "policyText")]
    pub policy_text: Option<String>,
    #[serde(default, rename = "ruleYaml")]
    pub rule_yaml: Option<String>,
}

impl ReplyEvaluation {
    pub fn approve() -> Self {
        Self {
            intent: ReplyIntent::Approve,
            forward_text: None,
            policy_text: None,
            rule_yaml: None,
        }
    }
}

pub struct ReplyClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
    costs: Option<Arc<CostLog>>,
}

impl ReplyClassifier {
    pub fn new(client: Arc<dyn LlmClient>, model: String, costs: Option<Arc<CostLog>>) -> Self {
        Self {
            client,
            model,
            costs,
        }
    }

    /// Classify one reply. Unparseable model output falls back to
    /// `approve`; an API error propagates so the coordinator can apply its
    /// own fallback.
    pub async fn classify(
        &self,
        reply_text: &str,
        tool_name: &str,
        label: &str,
    ) -> Result<ReplyEvaluation> {
        let request = LlmRequest {
            model: self.model.clone(),
            system_prompt: prompts::classifier_system_prompt(),
            user_prompt: prompts::classifier_user_prompt(reply_text, tool_name, label),
            max_tokens: MAX_TOKENS,
        };

        let response = self.client.complete(&request).await?;

        if let Some(costs) = &self.costs {
            costs.record("reply-eval", &response);
        }

        Ok(extract_json_object(&response.content)
            .and_then(|blob| serde_json::from_str::<ReplyEvaluation>(blob).ok())
            .unwrap_or_else(ReplyEvaluation::approve))
    }
}
