//! [`HttpLmClient`] – OpenAI-compatible [`LmClient`] implementation.
//!
//! Talks to a locally-running model server that exposes an OpenAI-compatible
//! `/v1/chat/completions` endpoint, such as [Ollama](https://ollama.com)
//! (`http://localhost:11434`).
//!
//! # Cost control
//!
//! [`HttpLmClient`] carries the same built-in spend safeguards regardless of
//! which model server it talks to:
//!
//! * **Token counter** – every call estimates the tokens consumed (prompt +
//!   reply) via a word-count heuristic and accumulates the total, exposed via
//!   [`HttpLmClient::total_tokens`].
//! * **Rate limiter** – a [`governor`]-backed token-bucket limiter enforces at
//!   most [`HttpLmClient::DEFAULT_RPM`] requests per minute. When the bucket
//!   is empty, [`generate`][LmClient::generate] returns
//!   [`LmError::RateLimitExceeded`] immediately rather than blocking.
//! * **Budget circuit breaker** – once the cumulative token count exceeds
//!   [`HttpLmClient::DEFAULT_TOKEN_BUDGET`] (or the value supplied to
//!   [`HttpLmClient::with_budget`]) every subsequent call returns
//!   [`LmError::BudgetExceeded`] until the owner calls
//!   [`HttpLmClient::reset_token_counter`].
//! * **TLS enforcement** – `http://` endpoints are rejected unless they
//!   target a loopback host; all other traffic must use `https://`.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cortex_middleware::{ChatMessage, LmClient, LmError, Role};
use cortex_types::Decision;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Anti-loop rules appended to every outgoing system prompt, so the model is
/// always reminded to vary its strategy instead of repeating a failing
/// dispatch.
pub const STABILITY_GUIDELINES: &str = "\
## Stability Guidelines (anti-loop rules)
- Do not repeat the same skill dispatch more than 3 times in a row.
- If a skill fails, try a different approach rather than retrying immediately.
- Vary your strategy when previous actions have not produced progress.
- When stuck, respond with ASK_HUMAN to request human guidance before continuing.";

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// An async [`LmClient`] backed by an OpenAI-compatible chat-completions
/// endpoint. Construct once and reuse across sessions.
pub struct HttpLmClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    total_tokens: Arc<AtomicU64>,
    token_budget: u64,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl HttpLmClient {
    pub const DEFAULT_RPM: u32 = 20;
    pub const DEFAULT_TOKEN_BUDGET: u64 = 100_000;

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_limits(base_url, model, Self::DEFAULT_RPM, Self::DEFAULT_TOKEN_BUDGET)
    }

    pub fn with_budget(base_url: impl Into<String>, model: impl Into<String>, token_budget: u64) -> Self {
        Self::with_limits(base_url, model, Self::DEFAULT_RPM, token_budget)
    }

    pub fn with_rpm(base_url: impl Into<String>, model: impl Into<String>, rpm: u32) -> Self {
        Self::with_limits(base_url, model, rpm, Self::DEFAULT_TOKEN_BUDGET)
    }

    pub fn with_limits(base_url: impl Into<String>, model: impl Into<String>, rpm: u32, token_budget: u64) -> Self {
        let rpm = rpm.max(1);
        let quota = Quota::per_minute(NonZeroU32::new(rpm).expect("rpm is >= 1 after max(1) clamp above"));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let client = reqwest::ClientBuilder::new()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .expect("failed to build reqwest client with TLS 1.2 minimum");
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client,
            total_tokens: Arc::new(AtomicU64::new(0)),
            token_budget,
            rate_limiter,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn reset_token_counter(&self) {
        self.total_tokens.store(0, Ordering::Relaxed);
    }

    pub fn token_budget(&self) -> u64 {
        self.token_budget
    }

    /// `true` when `url` is safe to contact without further TLS enforcement:
    /// `https://`, or `http://` to a loopback host (`localhost`, `127.0.0.1`,
    /// `::1`).
    pub(crate) fn is_secure_url(url: &str) -> bool {
        if url.starts_with("https://") {
            return true;
        }
        if let Some(without_scheme) = url.strip_prefix("http://") {
            let host_port = without_scheme.split('/').next().unwrap_or("");
            let host = if host_port.starts_with('[') {
                match host_port.find(']') {
                    Some(close) => &host_port[1..close],
                    None => return false,
                }
            } else if let Some(idx) = host_port.rfind(':') {
                &host_port[..idx]
            } else {
                host_port
            };
            return matches!(host, "localhost" | "127.0.0.1" | "::1");
        }
        false
    }

    fn estimate_tokens(text: &str) -> u64 {
        let words = text.split_whitespace().count() as u64;
        (words * 13).div_ceil(10)
    }

    async fn request(&self, messages: &[ChatMessage], system_prompt: &str) -> Result<String, LmError> {
        if !Self::is_secure_url(&self.base_url) {
            return Err(LmError::InsecureEndpoint(self.base_url.clone()));
        }

        let used = self.total_tokens.load(Ordering::Relaxed);
        if used >= self.token_budget {
            return Err(LmError::BudgetExceeded);
        }

        if self.rate_limiter.check().is_err() {
            return Err(LmError::RateLimitExceeded);
        }

        let augmented_system = format!("{system_prompt}\n\n{STABILITY_GUIDELINES}");
        let mut wire_messages = vec![WireMessage { role: "system", content: &augmented_system }];
        wire_messages.extend(messages.iter().map(|m| WireMessage { role: role_str(m.role), content: &m.content }));

        let schema = serde_json::to_value(schema_for!(Decision)).unwrap_or(serde_json::Value::Null);
        let body = ChatRequest {
            model: &self.model,
            messages: wire_messages,
            stream: false,
            response_format: ResponseFormat { kind: "json_schema", json_schema: schema },
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let inference_start = Instant::now();
        let response: ChatResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LmError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| LmError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LmError::Transport(e.to_string()))?;
        let inference_latency_ms = inference_start.elapsed().as_millis() as u64;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LmError::Transport("empty choices array".into()))?;

        let prompt_tokens: u64 = augmented_system.split_whitespace().count() as u64 * 13 / 10
            + messages.iter().map(|m| Self::estimate_tokens(&m.content)).sum::<u64>();
        let reply_tokens = Self::estimate_tokens(&reply);
        let new_total = self.total_tokens.fetch_add(prompt_tokens + reply_tokens, Ordering::Relaxed)
            + prompt_tokens
            + reply_tokens;

        debug!(
            model = %self.model,
            prompt_tokens,
            reply_tokens,
            tokens_used_after = new_total,
            inference_latency_ms,
            "LM inference complete"
        );
        if new_total >= self.token_budget {
            warn!(tokens_used = new_total, budget = self.token_budget, "token budget reached or exceeded");
        }

        Ok(reply)
    }
}

#[async_trait]
impl LmClient for HttpLmClient {
    #[instrument(name = "lm_client.generate", skip(self, messages), fields(model = %self.model))]
    async fn generate(&self, messages: &[ChatMessage], system_prompt: &str) -> Result<String, LmError> {
        self.request(messages, system_prompt).await
    }

    async fn generate_stream(&self, messages: &[ChatMessage], system_prompt: &str) -> Result<Vec<String>, LmError> {
        self.request(messages, system_prompt).await.map(|reply| vec![reply])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_counter_starts_at_zero() {
        let client = HttpLmClient::new("http://localhost:11434", "llama3");
        assert_eq!(client.total_tokens(), 0);
    }

    #[test]
    fn reset_token_counter_clears_accumulated_tokens() {
        let client = HttpLmClient::new("http://localhost:11434", "llama3");
        client.total_tokens.store(9_999, Ordering::Relaxed);
        client.reset_token_counter();
        assert_eq!(client.total_tokens(), 0);
    }

    #[test]
    fn token_budget_accessor_returns_configured_value() {
        let client = HttpLmClient::with_budget("http://localhost:11434", "llama3", 50_000);
        assert_eq!(client.token_budget(), 50_000);
    }

    #[tokio::test]
    async fn budget_circuit_breaker_trips_when_budget_exhausted() {
        let client = HttpLmClient::with_budget("http://localhost:11434", "llama3", 1);
        client.total_tokens.store(1, Ordering::Relaxed);
        let messages = [ChatMessage { role: Role::User, content: "what next?".into() }];
        let result = client.generate(&messages, "system prompt").await;
        assert!(matches!(result, Err(LmError::BudgetExceeded)));
    }

    #[tokio::test]
    async fn rate_limiter_trips_when_quota_exhausted() {
        let client = HttpLmClient::with_rpm("http://localhost:11434", "llama3", 1);
        let _ = client.rate_limiter.check();
        let messages = [ChatMessage { role: Role::User, content: "what next?".into() }];
        let result = client.generate(&messages, "system prompt").await;
        assert!(matches!(result, Err(LmError::RateLimitExceeded)));
    }

    #[tokio::test]
    async fn generate_returns_insecure_endpoint_for_external_http() {
        let client = HttpLmClient::new("http://external-server:11434", "llama3");
        let messages = [ChatMessage { role: Role::User, content: "hello".into() }];
        let result = client.generate(&messages, "system prompt").await;
        assert!(matches!(result, Err(LmError::InsecureEndpoint(_))));
    }

    #[test]
    fn is_secure_url_accepts_https() {
        assert!(HttpLmClient::is_secure_url("https://api.openai.com"));
    }

    #[test]
    fn is_secure_url_accepts_localhost_http() {
        assert!(HttpLmClient::is_secure_url("http://localhost:11434"));
        assert!(HttpLmClient::is_secure_url("http://127.0.0.1:11434"));
        assert!(HttpLmClient::is_secure_url("http://[::1]:11434"));
    }

    #[test]
    fn is_secure_url_rejects_external_http() {
        assert!(!HttpLmClient::is_secure_url("http://api.openai.com"));
        assert!(!HttpLmClient::is_secure_url("http://192.168.1.1:11434"));
    }

    #[test]
    fn is_secure_url_rejects_malformed_ipv6() {
        assert!(!HttpLmClient::is_secure_url("http://[::1:11434"));
    }

    #[test]
    fn with_limits_clamps_zero_rpm_to_one() {
        let client = HttpLmClient::with_limits("http://localhost:11434", "llama3", 0, 100_000);
        assert!(client.rate_limiter.check().is_ok());
    }

    #[test]
    fn estimate_tokens_empty_string_returns_zero() {
        assert_eq!(HttpLmClient::estimate_tokens(""), 0);
    }

    #[test]
    fn decision_schema_is_injectable() {
        let schema = serde_json::to_value(schema_for!(Decision)).unwrap();
        let schema_str = schema.to_string();
        assert!(schema_str.contains("reason"));
        assert!(schema_str.contains("ops"));
    }
}
