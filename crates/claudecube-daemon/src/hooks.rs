//! Hook event payloads and responses.
//!
//! These mirror the JSON the agent CLI sends through the hook bridge and
//! the reply shapes it understands. Field names are snake_case inbound and
//! camelCase inside `hookSpecificOutput`, matching the agent's format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct PreToolUseEvent {
    #[serde(default)]
    pub hook_event_name: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopEvent {
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
}

/// SessionStart / SessionEnd / Notification all share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleEvent {
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Reply to a PreToolUse hook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreToolUseResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub permission_decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
}

impl PreToolUseResponse {
    fn with(decision: Option<&str>, permission: &str, reason: String) -> Self {
        Self {
            decision: decision.map(str::to_string),
            reason: decision.map(|_| reason.clone()),
            hook_specific_output: HookSpecificOutput {
                hook_event_name: "PreToolUse".to_string(),
                permission_decision: permission.to_string(),
                permission_decision_reason: Some(reason),
            },
        }
    }

    /// A rule said allow: no top-level decision, just the permission.
    pub fn rule_allow(reason: String) -> Self {
        Self::with(None, "allow", reason)
    }

    /// A rule said deny.
    pub fn deny(reason: String) -> Self {
        Self::with(Some("block"), "deny", reason)
    }

    /// Outcome of an escalation (LLM or human).
    pub fn escalated(approved: bool, reason: String) -> Self {
        if approved {
            Self::with(Some("approve"), "allow", reason)
        } else {
            Self::with(Some("block"), "deny", reason)
        }
    }
}

/// Reply to a Stop hook: `{}` lets the agent stop, `block` keeps it going
/// with guidance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StopResponse {
    pub fn let_stop() -> Self {
        Self::default()
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some("block".to_string()),
            reason: Some(reason.into()),
        }
    }
}
