//! Anthropic LLM client, plus a mock for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

/// One request to the model.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// One response from the model.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
    pub latency_ms: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

// ---------------------------------------------------------------------------
// Anthropic HTTP client
// ---------------------------------------------------------------------------

pub struct AnthropicClient {
    http: reqwest::Client,
    /// Resolved at call time so a missing key is a per-call error the
    /// evaluator can degrade on, not a startup failure.
    api_key: Option<String>,
}

impl AnthropicClient {
    /// Build a client from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("ANTHROPIC_API_KEY").ok())
    }

    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self { http, api_key }
    }

    async fn call_once(&self, request: &LlmRequest, api_key: &str) -> Result<LlmResponse> {
        let start = Instant::now();

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": [
                { "role": "user", "content": request.user_prompt }
            ]
        });

        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("anthropic-version", "2023-06-01")
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            bail!("Anthropic API returned {status}");
        }

        let resp_body: AnthropicResponse = resp.error_for_status()?.json().await?;

        let content = resp_body
            .content
            .iter()
            .find_map(|c| c.text.as_deref())
            .unwrap_or_default()
            .to_string();

        Ok(LlmResponse {
            content,
            input_tokens: resp_body.usage.input_tokens,
            output_tokens: resp_body.usage.output_tokens,
            model: resp_body.model,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Execute with one retry on transient errors (429, 5xx).
    async fn call_with_retry(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("ANTHROPIC_API_KEY is not set");
        };

        match self.call_once(request, api_key).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                let err_str = format!("{e}");
                let is_retryable = err_str.contains("429")
                    || err_str.contains("500")
                    || err_str.contains("502")
                    || err_str.contains("503");
                if is_retryable {
                    warn!("LLM request failed with retryable error, retrying in 2s");
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    self.call_once(request, api_key).await
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.call_with_retry(request).await
    }
}

// ---------------------------------------------------------------------------
// Mock client (for tests)
// ---------------------------------------------------------------------------

/// Queue-based mock: each `complete` call pops the next canned response.
/// An empty queue returns an empty-object body so JSON-expecting callers
/// exercise their parse paths.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<LlmResponse>>,
    calls: Mutex<Vec<LlmRequest>>,
    fail_next: AtomicBool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Queue a canned response with the given text content.
    pub fn push_text(&self, content: &str) {
        self.responses.lock().unwrap().push_back(LlmResponse {
            content: content.to_string(),
            input_tokens: 100,
            output_tokens: 20,
            model: crate::DEFAULT_MODEL.to_string(),
            latency_ms: 5,
        });
    }

    /// Make the next `complete` call return an error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every request made so far.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("mock LLM failure");
        }
        let canned = self.responses.lock().unwrap().pop_front();
        Ok(canned.unwrap_or(LlmResponse {
            content: "{}".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            model: request.model.clone(),
            latency_ms: 0,
        }))
    }
}

// ---------------------------------------------------------------------------
// API response types (serde)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            model: crate::DEFAULT_MODEL.to_string(),
            system_prompt: "sys".to_string(),
            user_prompt: "user".to_string(),
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn mock_returns_queued_responses_in_order() {
        let mock = MockLlmClient::new();
        mock.push_text("first");
        mock.push_text("second");

        assert_eq!(mock.complete(&request()).await.unwrap().content, "first");
        assert_eq!(mock.complete(&request()).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn mock_empty_queue_returns_empty_object() {
        let mock = MockLlmClient::new();
        let resp = mock.complete(&request()).await.unwrap();
        assert_eq!(resp.content, "{}");
    }

    #[tokio::test]
    async fn mock_fail_next_errors_once() {
        let mock = MockLlmClient::new();
        mock.push_text("after failure");
        mock.fail_next();

        assert!(mock.complete(&request()).await.is_err());
        assert_eq!(
            mock.complete(&request()).await.unwrap().content,
            "after failure"
        );
    }

    #[tokio::test]
    async fn mock_records_calls() {
        let mock = MockLlmClient::new();
        mock.complete(&request()).await.unwrap();
        mock.complete(&request()).await.unwrap();
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls()[0].max_tokens, 256);
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error() {
        let client = AnthropicClient::new(None);
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
