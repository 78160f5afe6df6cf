//! PreToolUse pipeline: rules first, then escalation.

use std::sync::Arc;

use chrono::Utc;

use claudecube_core::audit::{AuditEntry, AuditLog, DecidedBy, Decision};
use claudecube_core::rules::{RuleAction, RulesHandle};
use claudecube_core::session::{SessionRegistry, SessionState};

use crate::escalation::EscalationHandler;
use crate::hooks::{PreToolUseEvent, PreToolUseResponse};

pub struct PreToolPipeline {
    rules: RulesHandle,
    registry: Arc<SessionRegistry>,
    escalation: EscalationHandler,
    audit: Arc<AuditLog>,
}

impl PreToolPipeline {
    pub fn new(
        rules: RulesHandle,
        registry: Arc<SessionRegistry>,
        escalation: EscalationHandler,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            rules,
            registry,
            escalation,
            audit,
        }
    }

    pub async fn handle(&self, event: PreToolUseEvent) -> PreToolUseResponse {
        self.registry.ensure_registered(
            &event.session_id,
            &event.cwd,
            event.transcript_path.as_deref(),
        );
        self.registry
            .update_tool_use(&event.session_id, &event.tool_name);
        self.registry
            .update_state(&event.session_id, SessionState::PermissionPending);

        // One pointer load per request; hot-reloads land between requests.
        let engine = self.rules.current();
        let result = engine.evaluate(&event.tool_name, &event.tool_input);

        let response = match result.action {
            RuleAction::Allow => {
                self.record(
                    &event,
                    Decision::Allow,
                    &result.reason,
                    DecidedBy::Rule,
                    result.rule_name.clone(),
                );
                PreToolUseResponse::rule_allow(result.reason)
            }
            RuleAction::Deny => {
                self.record(
                    &event,
                    Decision::Deny,
                    &result.reason,
                    DecidedBy::Rule,
                    result.rule_name.clone(),
                );
                self.registry.record_denial(&event.session_id);
                PreToolUseResponse::deny(result.reason)
            }
            RuleAction::Escalate => {
                let matched = result
                    .rule_name
                    .as_deref()
                    .map(|name| (name, RuleAction::Escalate));
                let decision = self
                    .escalation
                    .escalate(
                        &event.session_id,
                        &event.tool_name,
                        &event.tool_input,
                        matched,
                        &result.reason,
                    )
                    .await;
                self.record(
                    &event,
                    if decision.allowed {
                        Decision::Allow
                    } else {
                        Decision::Deny
                    },
                    &decision.reason,
                    decision.decided_by,
                    result.rule_name.clone(),
                );
                if !decision.allowed {
                    self.registry.record_denial(&event.session_id);
                }
                PreToolUseResponse::escalated(decision.allowed, decision.reason)
            }
        };

        self.registry
            .update_state(&event.session_id, SessionState::Active);
        response
    }

    fn record(
        &self,
        event: &PreToolUseEvent,
        decision: Decision,
        reason: &str,
        decided_by: DecidedBy,
        rule_name: Option<String>,
    ) {
        self.audit.record(&AuditEntry {
            timestamp: Utc::now(),
            session_id: event.session_id.clone(),
            tool_name: event.tool_name.clone(),
            tool_input: event.tool_input.clone(),
            decision,
            reason: reason.to_string(),
            decided_by,
            rule_name,
        });
    }
}
