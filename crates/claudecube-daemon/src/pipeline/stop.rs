//! Stop pipeline.
//!
//! State machine over a Stop event: precheck (loop guard), error retry,
//! transcript analysis + human escalation, done. A `block` response keeps
//! the agent working; `{}` lets it stop.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use claudecube_core::config::StopSettings;
use claudecube_core::session::SessionRegistry;
use claudecube_core::transcript::{self, extract_recent_tools};
use claudecube_llm::summarizer::TranscriptSummarizer;

use crate::approval::ApprovalManager;
use crate::hooks::{StopEvent, StopResponse};

/// Markers that make the agent's last message look like a failure.
const ERROR_MARKERS: &[&str] = &["error", "failed", "cannot", "unable", "exception", "traceback"];
/// Markers that override the error heuristic.
const SUCCESS_MARKERS: &[&str] = &["successfully", "completed", "fixed", "resolved"];

/// Transcript tail analysed before escalating.
const ANALYSIS_MESSAGE_COUNT: usize = 15;
const ANALYSIS_TOOL_COUNT: usize = 6;

const RETRY_GUIDANCE: &str =
    "The previous approach hit an error. Try a different approach to accomplish the task.";

pub struct StopPipeline {
    registry: Arc<SessionRegistry>,
    approvals: Option<Arc<ApprovalManager>>,
    summarizer: TranscriptSummarizer,
    settings: StopSettings,
    /// Keyed by session id. Sessions that die without a final Stop leave
    /// their entry behind; accepted for now.
    retries: Mutex<HashMap<String, u32>>,
}

impl StopPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        approvals: Option<Arc<ApprovalManager>>,
        summarizer: TranscriptSummarizer,
        settings: StopSettings,
    ) -> Self {
        Self {
            registry,
            approvals,
            summarizer,
            settings,
            retries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, event: StopEvent) -> StopResponse {
        self.registry.ensure_registered(
            &event.session_id,
            &event.cwd,
            event.transcript_path.as_deref(),
        );

        // Authoritative loop guard: a blocked stop re-enters this handler
        // with stop_hook_active set.
        if event.stop_hook_active {
            return StopResponse::let_stop();
        }
        let Some(last_message) = event.last_assistant_message.as_deref() else {
            return StopResponse::let_stop();
        };

        if self.settings.retry_on_error
            && contains_any(last_message, ERROR_MARKERS)
            && !contains_any(last_message, SUCCESS_MARKERS)
        {
            let retries_so_far = self
                .retries_lock()
                .get(&event.session_id)
                .copied()
                .unwrap_or(0);
            if retries_so_far < self.settings.max_retries {
                self.retries_lock()
                    .insert(event.session_id.clone(), retries_so_far + 1);
                return StopResponse::block(RETRY_GUIDANCE);
            }
            self.retries_lock().remove(&event.session_id);
        }

        if self.settings.escalate_to_telegram {
            if let Some(approvals) = &self.approvals {
                let (summary, recent_tools) = self.analyze(&event).await;
                let outcome = approvals
                    .request_stop_decision(
                        &event.session_id,
                        last_message,
                        summary.as_deref(),
                        recent_tools.as_deref(),
                    )
                    .await;
                if outcome.approved {
                    return match outcome.policy_text {
                        Some(answer) => StopResponse::block(format!(
                            "The user answered your question: {answer}"
                        )),
                        None => StopResponse::block(
                            "The user wants you to continue with the task.",
                        ),
                    };
                }
                return StopResponse::let_stop();
            }
        }

        self.retries_lock().remove(&event.session_id);
        StopResponse::let_stop()
    }

    /// Transcript analysis with per-step graceful degradation: a missing
    /// transcript or a failed summary just means a sparser chat message.
    async fn analyze(&self, event: &StopEvent) -> (Option<String>, Option<String>) {
        let transcript_path = event
            .transcript_path
            .clone()
            .or_else(|| self.registry.get_transcript_path(&event.session_id));
        let Some(path) = transcript_path else {
            return (None, None);
        };
        let excerpt = transcript::read_transcript(Path::new(&path), Some(ANALYSIS_MESSAGE_COUNT));
        if excerpt.messages.is_empty() {
            return (None, None);
        }
        let recent_tools = extract_recent_tools(&excerpt, ANALYSIS_TOOL_COUNT);
        let summary = match self.summarizer.summarize(&excerpt).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "transcript summary failed, escalating without it");
                None
            }
        };
        (summary, Some(recent_tools))
    }

    /// Current retry count for a session (test support).
    pub fn retry_count(&self, session_id: &str) -> u32 {
        self.retries_lock().get(session_id).copied().unwrap_or(0)
    }

    fn retries_lock(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.retries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    markers.iter().any(|m| lowered.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_markers_match_case_insensitively() {
        assert!(contains_any("Error: disk full", ERROR_MARKERS));
        assert!(contains_any("the build FAILED", ERROR_MARKERS));
        assert!(contains_any("Traceback (most recent call last)", ERROR_MARKERS));
        assert!(!contains_any("all tests green", ERROR_MARKERS));
    }

    #[test]
    fn success_markers_override() {
        let text = "Fixed the error successfully";
        assert!(contains_any(text, ERROR_MARKERS));
        assert!(contains_any(text, SUCCESS_MARKERS));
    }
}
