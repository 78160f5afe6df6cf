//! Optional Telegram notifications for session lifecycle.

use std::sync::Arc;

use tracing::debug;

use claudecube_core::config::TelegramSettings;

use crate::telegram::ChatTransport;

pub struct Notifier {
    chat: Option<Arc<dyn ChatTransport>>,
    settings: TelegramSettings,
}

impl Notifier {
    pub fn new(chat: Option<Arc<dyn ChatTransport>>, settings: TelegramSettings) -> Self {
        Self { chat, settings }
    }

    pub async fn session_started(&self, label: &str, cwd: &str) {
        if !self.settings.enabled || !self.settings.notify_on_start {
            return;
        }
        let Some(chat) = &self.chat else { return };
        if let Err(e) = chat
            .send_message(&format!("▶️ Session started: {label} ({cwd})"), None)
            .await
        {
            debug!(error = %e, "session-start notification failed");
        }
    }

    pub async fn session_ended(&self, label: &str) {
        if !self.settings.enabled || !self.settings.notify_on_complete {
            return;
        }
        let Some(chat) = &self.chat else { return };
        if let Err(e) = chat
            .send_message(&format!("⏹ Session ended: {label}"), None)
            .await
        {
            debug!(error = %e, "session-end notification failed");
        }
    }

    /// Alert text once a session crosses the denial threshold, `None`
    /// below it. No pipeline calls this yet.
    pub fn denial_alert(&self, label: &str, denial_count: u32) -> Option<String> {
        if denial_count >= self.settings.denial_alert_threshold {
            Some(format!(
                "⚠️ {label} has been denied {denial_count} times this session"
            ))
        } else {
            None
        }
    }
}
