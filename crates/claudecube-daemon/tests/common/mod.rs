//! Shared harness for daemon integration tests: real pipelines wired to
//! mock LLM, mock chat, and a recording tmux.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use claudecube_core::audit::AuditLog;
use claudecube_core::config::{StopSettings, TelegramSettings};
use claudecube_core::policy::PolicyStore;
use claudecube_core::rules::RulesHandle;
use claudecube_core::session::{Multiplexer, PaneInfo, SessionRegistry};
use claudecube_daemon::approval::ApprovalManager;
use claudecube_daemon::escalation::EscalationHandler;
use claudecube_daemon::hooks::{LifecycleEvent, PreToolUseEvent, StopEvent};
use claudecube_daemon::notify::Notifier;
use claudecube_daemon::pipeline::{LifecyclePipeline, PreToolPipeline, StopPipeline};
use claudecube_daemon::server::AppState;
use claudecube_daemon::telegram::{ChatTransport, MockChat};
use claudecube_llm::classifier::ReplyClassifier;
use claudecube_llm::evaluator::ToolCallEvaluator;
use claudecube_llm::summarizer::TranscriptSummarizer;
use claudecube_llm::{LlmClient, MockLlmClient, DEFAULT_MODEL};

/// Records `send_keys` calls and resolves every cwd to one pane.
pub struct RecordingTmux {
    pub sent_keys: Mutex<Vec<(String, String)>>,
    pub fail_send_keys: AtomicBool,
}

impl RecordingTmux {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent_keys: Mutex::new(Vec::new()),
            fail_send_keys: AtomicBool::new(false),
        })
    }
}

impl Multiplexer for RecordingTmux {
    fn list_panes(&self) -> Vec<PaneInfo> {
        vec![PaneInfo {
            session_name: "main".to_string(),
            window_index: 0,
            window_name: "testproj".to_string(),
            pane_index: 0,
            pane_id: "%9".to_string(),
            pane_cwd: "/proj".to_string(),
            command: "claude".to_string(),
        }]
    }

    fn find_pane_for_cwd(&self, cwd: &str) -> Option<String> {
        (cwd == "/proj").then(|| "%9".to_string())
    }

    fn send_keys(&self, pane_id: &str, text: &str) -> anyhow::Result<()> {
        if self.fail_send_keys.load(Ordering::SeqCst) {
            anyhow::bail!("pane gone");
        }
        self.sent_keys
            .lock()
            .unwrap()
            .push((pane_id.to_string(), text.to_string()));
        Ok(())
    }

    fn resolve_label(&self, cwd: &str) -> Option<String> {
        (cwd == "/proj").then(|| "testproj".to_string())
    }
}

pub struct Harness {
    pub llm: Arc<MockLlmClient>,
    pub chat: Arc<MockChat>,
    pub tmux: Arc<RecordingTmux>,
    pub registry: Arc<SessionRegistry>,
    pub approvals: Option<Arc<ApprovalManager>>,
    pub policies: Arc<PolicyStore>,
    pub audit: Arc<AuditLog>,
    pub state: AppState,
    pub rules_path: PathBuf,
    dir: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub with_chat: bool,
    pub approval_timeout: Duration,
    pub stop: StopSettings,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            with_chat: true,
            approval_timeout: Duration::from_secs(10),
            stop: StopSettings {
                retry_on_error: true,
                max_retries: 2,
                escalate_to_telegram: true,
            },
        }
    }
}

pub fn build_harness(options: HarnessOptions) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.yaml");

    let llm = Arc::new(MockLlmClient::new());
    let llm_dyn: Arc<dyn LlmClient> = llm.clone();
    let chat = Arc::new(MockChat::new());
    let tmux = RecordingTmux::new();
    let tmux_dyn: Arc<dyn Multiplexer> = tmux.clone();

    let registry = Arc::new(SessionRegistry::new(Some(tmux_dyn.clone())));
    let policies = Arc::new(PolicyStore::load(dir.path().join("policies.yaml")).unwrap());
    let audit = Arc::new(AuditLog::new(dir.path().join("audit")));

    let approvals = options.with_chat.then(|| {
        Arc::new(ApprovalManager::new(
            chat.clone() as Arc<dyn ChatTransport>,
            registry.clone(),
            Some(tmux_dyn.clone()),
            ReplyClassifier::new(llm_dyn.clone(), DEFAULT_MODEL.to_string(), None),
            TranscriptSummarizer::new(llm_dyn.clone(), DEFAULT_MODEL.to_string(), None),
            rules_path.clone(),
            options.approval_timeout,
        ))
    });

    // Rules file absent: the shipped defaults apply.
    let rules = RulesHandle::load(&rules_path).unwrap();
    let escalation = EscalationHandler::new(
        ToolCallEvaluator::new(llm_dyn.clone(), DEFAULT_MODEL.to_string(), None),
        approvals.clone(),
        policies.clone(),
    );

    let state = AppState {
        pre_tool: Arc::new(PreToolPipeline::new(
            rules,
            registry.clone(),
            escalation,
            audit.clone(),
        )),
        stop: Arc::new(StopPipeline::new(
            registry.clone(),
            approvals.clone(),
            TranscriptSummarizer::new(llm_dyn, DEFAULT_MODEL.to_string(), None),
            options.stop,
        )),
        lifecycle: Arc::new(LifecyclePipeline::new(
            registry.clone(),
            Notifier::new(
                options
                    .with_chat
                    .then(|| chat.clone() as Arc<dyn ChatTransport>),
                TelegramSettings::default(),
            ),
        )),
        registry: registry.clone(),
    };

    Harness {
        llm,
        chat,
        tmux,
        registry,
        approvals,
        policies,
        audit,
        state,
        rules_path,
        dir,
    }
}

pub fn pre_tool_event(tool_name: &str, tool_input: serde_json::Value) -> PreToolUseEvent {
    serde_json::from_value(json!({
        "hook_event_name": "PreToolUse",
        "tool_name": tool_name,
        "tool_input": tool_input,
        "session_id": "s1",
        "cwd": "/proj",
        "transcript_path": "/tmp/transcript.jsonl",
    }))
    .unwrap()
}

pub fn stop_event(last_message: Option<&str>, stop_hook_active: bool) -> StopEvent {
    serde_json::from_value(json!({
        "session_id": "s1",
        "cwd": "/proj",
        "stop_hook_active": stop_hook_active,
        "last_assistant_message": last_message,
    }))
    .unwrap()
}

pub fn lifecycle_event(session_id: &str) -> LifecycleEvent {
    serde_json::from_value(json!({
        "session_id": session_id,
        "cwd": "/proj",
    }))
    .unwrap()
}

/// Poll until `condition` holds; panics after ~2 seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
