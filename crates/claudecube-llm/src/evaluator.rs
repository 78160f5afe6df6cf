//! Tool-call evaluation.
//!
//! The verdict is asymmetric by construction: only a confident allow lets
//! the call through without a human; everything else — confident deny,
//! unconfident anything, API errors, unparseable output — escalates. The
//! evaluator therefore never errors; failures collapse into an unconfident
//! deny.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::client::{LlmClient, LlmRequest};
use crate::cost::CostLog;
use crate::prompts::{self, extract_json_object};

const MAX_TOKENS: u32 = 256;

/// The model's verdict on one tool call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalVerdict {
    pub allowed: bool,
    pub confident: bool,
    #[serde(default)]
    pub reason: String,
}

impl EvalVerdict {
    fn escalating(reason: String) -> Self {
        Self {
            allowed: false,
            confident: false,
            reason,
        }
    }
}

pub struct ToolCallEvaluator {
    client: Arc<dyn LlmClient>,
    model: String,
    costs: Option<Arc<CostLog>>,
}

impl ToolCallEvaluator {
    pub fn new(client: Arc<dyn LlmClient>, model: String, costs: Option<Arc<CostLog>>) -> Self {
        Self {
            client,
            model,
            costs,
        }
    }

    pub async fn evaluate(
        &self,
        tool_name: &str,
        tool_input: &Value,
        rules_context: &str,
        escalation_reason: &str,
        policies: Option<&str>,
    ) -> EvalVerdict {
        let request = LlmRequest {
            model: self.model.clone(),
            system_prompt: prompts::evaluator_system_prompt(),
            user_prompt: prompts::evaluator_user_prompt(
                tool_name,
                tool_input,
                rules_context,
                escalation_reason,
                policies,
            ),
            max_tokens: MAX_TOKENS,
        };

        let response = match self.client.complete(&request).await {
            Ok(r) => r,
            Err(e) => return EvalVerdict::escalating(format!("LLM evaluation error: {e}")),
        };

        if let Some(costs) = &self.costs {
            costs.record("tool-eval", &response);
        }

        extract_json_object(&response.content)
            .and_then(|blob| serde_json::from_str::<EvalVerdict>(blob).ok())
            .unwrap_or_else(|| EvalVerdict::escalating("LLM response unparseable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLlmClient;
    use serde_json::json;

    fn evaluator(mock: &Arc<MockLlmClient>) -> ToolCallEvaluator {
        ToolCallEvaluator::new(mock.clone(), crate::DEFAULT_MODEL.to_string(), None)
    }

    #[tokio::test]
    async fn parses_confident_allow() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text(r#"{"allowed": true, "confident": true, "reason": "benign git status"}"#);
        let verdict = evaluator(&mock)
            .evaluate("Bash", &json!({"command": "git status"}), "No rule matched", "default", None)
            .await;
        assert!(verdict.allowed);
        assert!(verdict.confident);
        assert_eq!(verdict.reason, "benign git status");
    }

    #[tokio::test]
    async fn parses_verdict_with_surrounding_prose() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("Sure. {\"allowed\": false, \"confident\": true, \"reason\": \"drops DB\"} Done.");
        let verdict = evaluator(&mock)
            .evaluate("Bash", &json!({}), "ctx", "reason", None)
            .await;
        assert!(!verdict.allowed);
        assert!(verdict.confident);
    }

    #[tokio::test]
    async fn unparseable_output_becomes_unconfident_deny() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text("I think this is probably fine to run.");
        let verdict = evaluator(&mock)
            .evaluate("Bash", &json!({}), "ctx", "reason", None)
            .await;
        assert!(!verdict.allowed);
        assert!(!verdict.confident);
        assert_eq!(verdict.reason, "LLM response unparseable");
    }

    #[tokio::test]
    async fn api_error_becomes_unconfident_deny() {
        let mock = Arc::new(MockLlmClient::new());
        mock.fail_next();
        let verdict = evaluator(&mock)
            .evaluate("Bash", &json!({}), "ctx", "reason", None)
            .await;
        assert!(!verdict.allowed);
        assert!(!verdict.confident);
        assert!(verdict.reason.starts_with("LLM evaluation error:"));
    }

    #[tokio::test]
    async fn request_carries_policies_and_context() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_text(r#"{"allowed": true, "confident": true, "reason": "ok"}"#);
        evaluator(&mock)
            .evaluate(
                "Bash",
                &json!({"command": "npm install"}),
                "Matched rule: Escalate installs (escalate)",
                "Escalated by rule: Escalate installs",
                Some("Human-defined policies:\n- [pol_0] always allow npm install (applies to: Bash)"),
            )
            .await;
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].max_tokens, 256);
        assert!(calls[0].user_prompt.contains("pol_0"));
        assert!(calls[0].user_prompt.contains("Matched rule: Escalate installs"));
        assert!(calls[0].system_prompt.contains("Human-defined policies take precedence"));
    }
}
