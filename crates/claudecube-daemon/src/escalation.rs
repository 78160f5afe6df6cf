//! Escalation: what happens after a rule says `escalate`.
//!
//! The LLM's verdict is asymmetric. A confident allow short-circuits;
//! every other outcome — confident deny included — goes to the human. The
//! LLM can therefore never deny on its own: a denial is always signed by a
//! person or by a timeout.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use claudecube_core::audit::DecidedBy;
use claudecube_core::policy::PolicyStore;
use claudecube_core::rules::RuleAction;
use claudecube_llm::evaluator::ToolCallEvaluator;

use crate::approval::ApprovalManager;

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationDecision {
    pub allowed: bool,
    pub reason: String,
    pub decided_by: DecidedBy,
}

pub struct EscalationHandler {
    evaluator: ToolCallEvaluator,
    approvals: Option<Arc<ApprovalManager>>,
    policies: Arc<PolicyStore>,
}

impl EscalationHandler {
    pub fn new(
        evaluator: ToolCallEvaluator,
        approvals: Option<Arc<ApprovalManager>>,
        policies: Arc<PolicyStore>,
    ) -> Self {
        Self {
            evaluator,
            approvals,
            policies,
        }
    }

    pub async fn escalate(
        &self,
        session_id: &str,
        tool_name: &str,
        tool_input: &Value,
        matched_rule: Option<(&str, RuleAction)>,
        escalation_reason: &str,
    ) -> EscalationDecision {
        let rules_context = match matched_rule {
            Some((name, action)) => format!("Matched rule: {name} ({action})"),
            None => "No rule matched".to_string(),
        };
        let policies = self.policies.format_for_tool(tool_name);

        let verdict = self
            .evaluator
            .evaluate(
                tool_name,
                tool_input,
                &rules_context,
                escalation_reason,
                policies.as_deref(),
            )
            .await;

        if verdict.confident && verdict.allowed {
            return EscalationDecision {
                allowed: true,
                reason: format!("LLM: {}", verdict.reason),
                decided_by: DecidedBy::Llm,
            };
        }

        let Some(approvals) = &self.approvals else {
            return EscalationDecision {
                allowed: false,
                reason: "LLM uncertain and no Telegram available".to_string(),
                decided_by: DecidedBy::Timeout,
            };
        };

        let outcome = approvals
            .request_approval(session_id, tool_name, tool_input, &verdict.reason)
            .await;

        if let Some(policy_text) = &outcome.policy_text {
            if let Err(e) = self.policies.add(policy_text, Some(tool_name)) {
                warn!(error = %e, "failed to persist policy from reply");
            }
        }

        let decided_by = if outcome.reason.contains("timed out") {
            DecidedBy::Timeout
        } else {
            DecidedBy::Telegram
        };
        EscalationDecision {
            allowed: outcome.approved,
            reason: outcome.reason,
            decided_by,
        }
    }
}
