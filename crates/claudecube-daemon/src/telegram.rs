//! Telegram chat adapter.
//!
//! [`ChatTransport`] is the seam the approval coordinator talks through;
//! [`TelegramClient`] implements it over the Bot API and runs the long-poll
//! update loop. Updates from any chat other than the configured one are
//! rejected. [`MockChat`] backs the tests.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::approval::ApprovalManager;

/// Inline keyboard rows of `(text, callback_data)` buttons.
#[derive(Debug, Clone)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<(String, String)>>,
}

impl InlineKeyboard {
    /// Approve / Deny / Details for a permission request.
    pub fn approval(id: u64) -> Self {
        Self {
            rows: vec![vec![
                ("✅ Approve".to_string(), format!("approve:{id}")),
                ("❌ Deny".to_string(), format!("deny:{id}")),
                ("📋 Details".to_string(), format!("details:{id}")),
            ]],
        }
    }

    /// Continue / Let stop for a stop decision.
    pub fn stop(id: u64) -> Self {
        Self {
            rows: vec![vec![
                ("▶️ Continue".to_string(), format!("continue:{id}")),
                ("⏹ Let stop".to_string(), format!("let-stop:{id}")),
            ]],
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let rows: Vec<Vec<serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(text, data)| json!({"text": text, "callback_data": data}))
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    /// All callback datas, row-major (test support).
    pub fn callback_data(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|(_, data)| data.clone()))
            .collect()
    }
}

/// The operations the approval coordinator needs from a chat channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message, returning its message id.
    async fn send_message(&self, text: &str, keyboard: Option<InlineKeyboard>) -> Result<i64>;

    /// Send a message threaded under `reply_to`.
    async fn send_reply(&self, reply_to: i64, text: &str) -> Result<i64>;

    async fn edit_message(&self, message_id: i64, text: &str) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Bot API client
// ---------------------------------------------------------------------------

pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    chat_id: i64,
}

impl TelegramClient {
    /// Build from `TELEGRAM_BOT_TOKEN` + `TELEGRAM_CHAT_ID`; either missing
    /// disables the human channel.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()?;
        Some(Self::new(token, chat_id))
    }

    pub fn new(token: String, chat_id: i64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            token,
            chat_id,
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("https://api.telegram.org/bot{}/{method}", self.token);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;
        let value: serde_json::Value = resp.json().await?;
        if !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let description = value
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            bail!("Telegram {method} failed: {description}");
        }
        Ok(value.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Long-poll `getUpdates`, routing callback queries and threaded
    /// replies into the approval manager. Runs until the process exits.
    pub async fn run_update_loop(self: Arc<Self>, manager: Arc<ApprovalManager>) {
        let mut offset: i64 = 0;
        loop {
            let body = json!({
                "timeout": 30,
                "offset": offset,
                "allowed_updates": ["message", "callback_query"],
            });
            let updates = match self.call("getUpdates", body).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };
            let Some(items) = updates.as_array() else {
                continue;
            };
            for update in items {
                if let Some(id) = update.get("update_id").and_then(|v| v.as_i64()) {
                    offset = offset.max(id + 1);
                }
                self.dispatch_update(update, &manager).await;
            }
        }
    }

    async fn dispatch_update(&self, update: &serde_json::Value, manager: &ApprovalManager) {
        if let Some(callback) = update.get("callback_query") {
            let Some(callback_id) = callback.get("id").and_then(|v| v.as_str()) else {
                return;
            };
            let from_chat = callback
                .pointer("/message/chat/id")
                .and_then(|v| v.as_i64());
            if from_chat != Some(self.chat_id) {
                debug!(?from_chat, "dropping callback from foreign chat");
                let _ = self.answer_callback(callback_id, "Unauthorized").await;
                return;
            }
            let data = callback.get("data").and_then(|v| v.as_str()).unwrap_or("");
            manager.handle_callback(callback_id, data).await;
        } else if let Some(message) = update.get("message") {
            if message.pointer("/chat/id").and_then(|v| v.as_i64()) != Some(self.chat_id) {
                debug!("dropping message from foreign chat");
                return;
            }
            let Some(reply_to) = message
                .pointer("/reply_to_message/message_id")
                .and_then(|v| v.as_i64())
            else {
                return;
            };
            let Some(text) = message.get("text").and_then(|v| v.as_str()) else {
                return;
            };
            manager.handle_reply(reply_to, text).await;
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, text: &str, keyboard: Option<InlineKeyboard>) -> Result<i64> {
        let mut body = json!({"chat_id": self.chat_id, "text": text});
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard.to_json();
        }
        let result = self.call("sendMessage", body).await?;
        result
            .get("message_id")
            .and_then(|v| v.as_i64())
            .context("sendMessage result missing message_id")
    }

    async fn send_reply(&self, reply_to: i64, text: &str) -> Result<i64> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "reply_to_message_id": reply_to,
        });
        let result = self.call("sendMessage", body).await?;
        result
            .get("message_id")
            .and_then(|v| v.as_i64())
            .context("sendMessage result missing message_id")
    }

    async fn edit_message(&self, message_id: i64, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "message_id": message_id,
            "text": text,
        });
        self.call("editMessageText", body).await.map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        let body = json!({"callback_query_id": callback_id, "text": text});
        self.call("answerCallbackQuery", body).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Mock transport (for tests)
// ---------------------------------------------------------------------------

/// Records every call; message ids count up from 100.
pub struct MockChat {
    pub sent: Mutex<Vec<(i64, String, Option<InlineKeyboard>)>>,
    pub replies: Mutex<Vec<(i64, String)>>,
    pub edits: Mutex<Vec<(i64, String)>>,
    pub answers: Mutex<Vec<(String, String)>>,
    next_message_id: AtomicI64,
    fail_sends: AtomicBool,
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(100),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Make every subsequent send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// The last sent message `(message_id, text, keyboard)`.
    pub fn last_sent(&self) -> Option<(i64, String, Option<InlineKeyboard>)> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockChat {
    async fn send_message(&self, text: &str, keyboard: Option<InlineKeyboard>) -> Result<i64> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("chat unreachable");
        }
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((id, text.to_string(), keyboard));
        Ok(id)
    }

    async fn send_reply(&self, reply_to: i64, text: &str) -> Result<i64> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("chat unreachable");
        }
        self.replies.lock().unwrap().push((reply_to, text.to_string()));
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn edit_message(&self, message_id: i64, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((message_id, text.to_string()));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }
}
