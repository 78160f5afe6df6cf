//! Approval coordinator.
//!
//! One pending entry per outstanding question to the human. Each entry is
//! resolved exactly once — by a button press, a classified text reply, a
//! timeout, or a send failure — and every resolution path cleans both the
//! pending map and the message-context map. Late callbacks for an already
//! resolved id are answered with "expired".

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use claudecube_core::session::{Multiplexer, SessionRegistry};
use claudecube_core::transcript::{self, truncate_chars};
use claudecube_llm::classifier::{ReplyClassifier, ReplyIntent};
use claudecube_llm::summarizer::TranscriptSummarizer;

use crate::telegram::{ChatTransport, InlineKeyboard};

/// Characters of pretty-printed tool input shown in a chat message.
const INPUT_DISPLAY_MAX: usize = 500;
/// Characters of the agent's last message shown in a stop message.
const LAST_MESSAGE_DISPLAY_MAX: usize = 400;
/// Transcript tail read for the Details button.
const DETAILS_MESSAGE_COUNT: usize = 15;

/// What a request resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub approved: bool,
    pub reason: String,
    /// Free text the human supplied: a policy for tool approvals, the
    /// guidance string for stop decisions.
    pub policy_text: Option<String>,
}

impl ApprovalOutcome {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            policy_text: None,
        }
    }

    fn approved(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            policy_text: None,
        }
    }
}

struct PendingApproval {
    resolver: oneshot::Sender<ApprovalOutcome>,
    message_id: Option<i64>,
    tool_name: String,
    session_id: String,
    text: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// Routes an inbound chat reply back to the request that sent the message.
#[derive(Debug, Clone)]
struct MessageContext {
    approval_id: u64,
    #[allow(dead_code)]
    session_id: String,
    pane_id: Option<String>,
    label: String,
    is_stop: bool,
}

pub struct ApprovalManager {
    chat: Arc<dyn ChatTransport>,
    registry: Arc<SessionRegistry>,
    tmux: Option<Arc<dyn Multiplexer>>,
    classifier: ReplyClassifier,
    summarizer: TranscriptSummarizer,
    rules_path: PathBuf,
    timeout: Duration,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingApproval>>,
    contexts: Mutex<HashMap<i64, MessageContext>>,
}

impl ApprovalManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        registry: Arc<SessionRegistry>,
        tmux: Option<Arc<dyn Multiplexer>>,
        classifier: ReplyClassifier,
        summarizer: TranscriptSummarizer,
        rules_path: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            chat,
            registry,
            tmux,
            classifier,
            summarizer,
            rules_path,
            timeout,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Ask the human whether a tool call may proceed.
    pub async fn request_approval(
        &self,
        session_id: &str,
        tool_name: &str,
        tool_input: &Value,
        llm_reason: &str,
    ) -> ApprovalOutcome {
        let label = self.label_for(session_id);
        let input_pretty = truncate_chars(
            &serde_json::to_string_pretty(tool_input).unwrap_or_else(|_| "{}".to_string()),
            INPUT_DISPLAY_MAX,
        );
        let text = format!(
            "🔐 Permission request — {label}\n\nTool: {tool_name}\nInput:\n{input_pretty}\n\nLLM: {llm_reason}"
        );
        self.run_request(session_id, tool_name, text, false).await
    }

    /// Ask the human whether a session that wants to stop should continue.
    pub async fn request_stop_decision(
        &self,
        session_id: &str,
        last_message: &str,
        summary: Option<&str>,
        recent_tools: Option<&str>,
    ) -> ApprovalOutcome {
        let label = self.label_for(session_id);
        let mut text = format!(
            "🛑 {label} finished its turn\n\nLast message:\n{}",
            truncate_chars(last_message, LAST_MESSAGE_DISPLAY_MAX)
        );
        if let Some(summary) = summary {
            text.push_str(&format!("\n\nSummary:\n{summary}"));
        }
        if let Some(tools) = recent_tools {
            text.push_str(&format!("\n\nRecent tools:\n{tools}"));
        }
        text.push_str("\n\nReply to this message to answer the agent.");
        self.run_request(session_id, "Stop", text, true).await
    }

    async fn run_request(
        &self,
        session_id: &str,
        tool_name: &str,
        text: String,
        is_stop: bool,
    ) -> ApprovalOutcome {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (resolver, receiver) = oneshot::channel();
        self.pending_lock().insert(
            id,
            PendingApproval {
                resolver,
                message_id: None,
                tool_name: tool_name.to_string(),
                session_id: session_id.to_string(),
                text: text.clone(),
                created_at: Utc::now(),
            },
        );

        let keyboard = if is_stop {
            InlineKeyboard::stop(id)
        } else {
            InlineKeyboard::approval(id)
        };
        let message_id = match self.chat.send_message(&text, Some(keyboard)).await {
            Ok(mid) => mid,
            Err(e) => {
                self.pending_lock().remove(&id);
                return ApprovalOutcome::denied(format!("Telegram send failed: {e}"));
            }
        };

        {
            // Lock order pending -> contexts, the only place both are held.
            let mut pending = self.pending_lock();
            if let Some(entry) = pending.get_mut(&id) {
                entry.message_id = Some(message_id);
                self.contexts_lock().insert(
                    message_id,
                    MessageContext {
                        approval_id: id,
                        session_id: session_id.to_string(),
                        pane_id: self.registry.get_pane_id(session_id),
                        label: self.label_for(session_id),
                        is_stop,
                    },
                );
            }
        }

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => ApprovalOutcome::denied("approval channel closed"),
            Err(_) => self.expire(id, message_id).await,
        }
    }

    async fn expire(&self, id: u64, message_id: i64) -> ApprovalOutcome {
        let existed = self.pending_lock().remove(&id).is_some();
        self.contexts_lock().remove(&message_id);
        if existed {
            debug!(approval = id, "approval timed out");
            let _ = self.chat.send_reply(message_id, "⏰ Timed out (denied)").await;
        }
        ApprovalOutcome::denied("Telegram approval timed out")
    }

    // -- inbound ------------------------------------------------------------

    /// Dispatch a button press. Callback data is `<verb>:<approval id>`.
    pub async fn handle_callback(&self, callback_id: &str, data: &str) {
        let Some((verb, id)) = data.split_once(':') else {
            let _ = self.chat.answer_callback(callback_id, "Unrecognised button").await;
            return;
        };
        let Ok(id) = id.parse::<u64>() else {
            let _ = self.chat.answer_callback(callback_id, "Unrecognised button").await;
            return;
        };
        match verb {
            "approve" | "continue" => self.resolve_button(callback_id, id, true).await,
            "deny" | "let-stop" => self.resolve_button(callback_id, id, false).await,
            "details" => self.send_details(callback_id, id).await,
            _ => {
                let _ = self.chat.answer_callback(callback_id, "Unrecognised button").await;
            }
        }
    }

    async fn resolve_button(&self, callback_id: &str, id: u64, approved: bool) {
        let Some(entry) = self.pending_lock().remove(&id) else {
            let _ = self
                .chat
                .answer_callback(callback_id, "Expired or already handled")
                .await;
            return;
        };
        if let Some(mid) = entry.message_id {
            self.contexts_lock().remove(&mid);
        }

        let reason = if approved {
            "Approved via Telegram"
        } else {
            "Denied via Telegram"
        };
        let _ = entry.resolver.send(if approved {
            ApprovalOutcome::approved(reason)
        } else {
            ApprovalOutcome::denied(reason)
        });

        let _ = self
            .chat
            .answer_callback(callback_id, if approved { "Approved" } else { "Denied" })
            .await;
        if let Some(mid) = entry.message_id {
            let stamp = Local::now().format("%H:%M:%S");
            let mark = if approved { "✅ Approved" } else { "❌ Denied" };
            let _ = self
                .chat
                .edit_message(mid, &format!("{}\n\n{mark} at {stamp}", entry.text))
                .await;
        }
    }

    /// The Details button: reply with a transcript summary under the
    /// original message. Non-resolving — the approval stays pending.
    async fn send_details(&self, callback_id: &str, id: u64) {
        let looked_up = {
            let pending = self.pending_lock();
            pending
                .get(&id)
                .map(|e| (e.message_id, e.session_id.clone()))
        };
        let Some((message_id, session_id)) = looked_up else {
            let _ = self
                .chat
                .answer_callback(callback_id, "Expired or already handled")
                .await;
            return;
        };
        let _ = self.chat.answer_callback(callback_id, "Fetching details…").await;

        let excerpt = self
            .registry
            .get_transcript_path(&session_id)
            .map(|p| transcript::read_transcript(Path::new(&p), Some(DETAILS_MESSAGE_COUNT)))
            .unwrap_or_default();
        let summary = match self.summarizer.summarize(&excerpt).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "summary failed for details view");
                "Summary unavailable.".to_string()
            }
        };
        let activity = transcript::format_recent_activity(&excerpt, 5);
        let text = format!("📋 Session details\n\n{summary}\n\nRecent activity:\n{activity}");
        if let Some(mid) = message_id {
            let _ = self.chat.send_reply(mid, &text).await;
        }
    }

    /// Handle a text message threaded under one of our approval messages.
    pub async fn handle_reply(&self, reply_to: i64, text: &str) {
        let Some(ctx) = self.contexts_lock().get(&reply_to).cloned() else {
            return;
        };

        if ctx.is_stop {
            // Stop replies skip the classifier: the text IS the answer the
            // agent should receive.
            let resolved = self.resolve_by_id(
                ctx.approval_id,
                ApprovalOutcome {
                    approved: true,
                    reason: "User replied to agent question".to_string(),
                    policy_text: Some(text.to_string()),
                },
            );
            if resolved {
                let ack = match self.inject_text(ctx.pane_id.as_deref(), text) {
                    Ok(()) => "✅ Sent to the agent".to_string(),
                    Err(e) => format!("✅ Recorded, but sending to the terminal failed: {e}"),
                };
                let _ = self.chat.send_reply(reply_to, &ack).await;
            } else {
                let _ = self.chat.send_reply(reply_to, "Expired or already handled").await;
            }
            return;
        }

        let tool_name = self
            .pending_lock()
            .get(&ctx.approval_id)
            .map(|e| e.tool_name.clone());
        let Some(tool_name) = tool_name else {
            let _ = self.chat.send_reply(reply_to, "Expired or already handled").await;
            return;
        };

        let evaluation = match self.classifier.classify(text, &tool_name, &ctx.label).await {
            Ok(eval) => eval,
            Err(e) => {
                warn!(error = %e, "reply classifier failed, treating reply as approval");
                let resolved = self.resolve_by_id(
                    ctx.approval_id,
                    ApprovalOutcome {
                        approved: true,
                        reason: "Approved via Telegram".to_string(),
                        policy_text: Some(text.to_string()),
                    },
                );
                if resolved {
                    let _ = self.chat.send_reply(reply_to, "✅ Approved").await;
                }
                return;
            }
        };

        let ack = match evaluation.intent {
            ReplyIntent::Approve => {
                self.resolve_by_id(ctx.approval_id, ApprovalOutcome::approved("Approved via Telegram"));
                "✅ Approved".to_string()
            }
            ReplyIntent::Deny => {
                self.resolve_by_id(
                    ctx.approval_id,
                    ApprovalOutcome::denied(format!("Denied via Telegram: {text}")),
                );
                "❌ Denied".to_string()
            }
            ReplyIntent::Forward => {
                self.resolve_by_id(
                    ctx.approval_id,
                    ApprovalOutcome::approved("Approved + forwarded text to agent"),
                );
                let forward = evaluation.forward_text.as_deref().unwrap_or(text);
                match self.inject_text(ctx.pane_id.as_deref(), forward) {
                    Ok(()) => "✅ Approved — forwarded to the agent".to_string(),
                    Err(e) => format!("✅ Approved, but forwarding to the terminal failed: {e}"),
                }
            }
            ReplyIntent::AddPolicy => {
                let policy_text = evaluation
                    .policy_text
                    .clone()
                    .unwrap_or_else(|| text.to_string());
                self.resolve_by_id(
                    ctx.approval_id,
                    ApprovalOutcome {
                        approved: true,
                        reason: "Approved with new policy".to_string(),
                        policy_text: Some(policy_text),
                    },
                );
                "✅ Approved — policy saved".to_string()
            }
            ReplyIntent::AddRule => {
                let write_result = evaluation
                    .rule_yaml
                    .as_deref()
                    .map(|yaml| self.append_rule(yaml))
                    .unwrap_or(Ok(()));
                self.resolve_by_id(ctx.approval_id, ApprovalOutcome::approved("Approved via Telegram"));
                match write_result {
                    Ok(()) => "✅ Approved — rule added".to_string(),
                    Err(e) => format!("✅ Approved, but writing the rule failed: {e}"),
                }
            }
        };
        let _ = self.chat.send_reply(reply_to, &ack).await;
    }

    /// Resolve and clean both maps; false when the id was already handled.
    fn resolve_by_id(&self, id: u64, outcome: ApprovalOutcome) -> bool {
        let Some(entry) = self.pending_lock().remove(&id) else {
            return false;
        };
        if let Some(mid) = entry.message_id {
            self.contexts_lock().remove(&mid);
        }
        let _ = entry.resolver.send(outcome);
        true
    }

    fn inject_text(&self, pane_id: Option<&str>, text: &str) -> Result<()> {
        let (Some(tmux), Some(pane_id)) = (self.tmux.as_ref(), pane_id) else {
            return Ok(());
        };
        tmux.send_keys(pane_id, text)
    }

    /// Append a classifier-authored rule snippet; the file watcher picks up
    /// the change.
    fn append_rule(&self, snippet: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.rules_path)
            .with_context(|| format!("opening rules file {}", self.rules_path.display()))?;
        writeln!(file, "{}", snippet.trim_end())?;
        Ok(())
    }

    fn label_for(&self, session_id: &str) -> String {
        self.registry
            .get_label(session_id)
            .unwrap_or_else(|| session_id.chars().take(12).collect())
    }

    // -- test support -------------------------------------------------------

    pub fn pending_count(&self) -> usize {
        self.pending_lock().len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts_lock().len()
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<u64, PendingApproval>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn contexts_lock(&self) -> MutexGuard<'_, HashMap<i64, MessageContext>> {
        self.contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
