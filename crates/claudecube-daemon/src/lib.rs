//! ClaudeCube daemon: bootstrap wiring and runtime entry.
//!
//! Assembles the substrate (rules, sessions, policies, audit), the LLM
//! adapters, the optional Telegram channel, and the three hook pipelines,
//! then serves the loopback HTTP ingress.

pub mod approval;
pub mod escalation;
pub mod hooks;
pub mod installer;
pub mod notify;
pub mod pipeline;
pub mod server;
pub mod telegram;
pub mod tmux;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use claudecube_core::audit::AuditLog;
use claudecube_core::config::{self, CubeConfig};
use claudecube_core::policy::PolicyStore;
use claudecube_core::rules::{spawn_rules_watcher, RulesHandle};
use claudecube_core::session::{Multiplexer, SessionRegistry};
use claudecube_llm::classifier::ReplyClassifier;
use claudecube_llm::cost::CostLog;
use claudecube_llm::evaluator::ToolCallEvaluator;
use claudecube_llm::summarizer::TranscriptSummarizer;
use claudecube_llm::{AnthropicClient, LlmClient};

use approval::ApprovalManager;
use escalation::EscalationHandler;
use notify::Notifier;
use pipeline::{LifecyclePipeline, PreToolPipeline, StopPipeline};
use server::AppState;
use telegram::{ChatTransport, TelegramClient};
use tmux::TmuxControl;

/// Filesystem locations the daemon works with.
pub struct DaemonPaths {
    pub rules: PathBuf,
    pub policies: PathBuf,
    pub audit_dir: PathBuf,
}

impl DaemonPaths {
    pub fn from_home() -> Self {
        Self {
            rules: config::default_rules_path(),
            policies: config::policies_path(),
            audit_dir: config::home_base_dir().join("audit"),
        }
    }
}

/// Wire everything together and serve until the process exits.
pub async fn run(config: CubeConfig, paths: DaemonPaths) -> Result<()> {
    let tmux: Option<Arc<dyn Multiplexer>> = TmuxControl::detect()
        .map(|t| Arc::new(t) as Arc<dyn Multiplexer>);
    if tmux.is_none() {
        info!("tmux not available; labels fall back to session ids");
    }

    let registry = Arc::new(SessionRegistry::new(tmux.clone()));
    registry.register_from_tmux();

    let rules = RulesHandle::load(&paths.rules)?;
    spawn_rules_watcher(paths.rules.clone(), rules.clone());

    let policies = Arc::new(PolicyStore::load(paths.policies)?);
    let audit = Arc::new(AuditLog::new(paths.audit_dir.clone()));
    let costs = Arc::new(CostLog::new(paths.audit_dir));

    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_env());
    let model = config.escalation.evaluator_model.clone();

    let telegram_client = if config.telegram.enabled {
        let client = TelegramClient::from_env().map(Arc::new);
        if client.is_none() {
            warn!("Telegram disabled: TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set");
        }
        client
    } else {
        None
    };
    let chat: Option<Arc<dyn ChatTransport>> = telegram_client
        .clone()
        .map(|c| c as Arc<dyn ChatTransport>);

    let approvals = chat.clone().map(|chat| {
        Arc::new(ApprovalManager::new(
            chat,
            registry.clone(),
            tmux.clone(),
            ReplyClassifier::new(llm.clone(), model.clone(), Some(costs.clone())),
            TranscriptSummarizer::new(llm.clone(), model.clone(), Some(costs.clone())),
            paths.rules.clone(),
            Duration::from_secs(config.escalation.telegram_timeout_seconds),
        ))
    });

    if let (Some(client), Some(approvals)) = (telegram_client, approvals.clone()) {
        tokio::spawn(client.run_update_loop(approvals));
    }

    let escalation = EscalationHandler::new(
        ToolCallEvaluator::new(llm.clone(), model.clone(), Some(costs.clone())),
        approvals.clone(),
        policies,
    );

    let state = AppState {
        pre_tool: Arc::new(PreToolPipeline::new(
            rules,
            registry.clone(),
            escalation,
            audit,
        )),
        stop: Arc::new(StopPipeline::new(
            registry.clone(),
            approvals,
            TranscriptSummarizer::new(llm, model, Some(costs)),
            config.stop.clone(),
        )),
        lifecycle: Arc::new(LifecyclePipeline::new(
            registry.clone(),
            Notifier::new(chat, config.telegram.clone()),
        )),
        registry,
    };

    server::serve(state, config.server.port).await
}
