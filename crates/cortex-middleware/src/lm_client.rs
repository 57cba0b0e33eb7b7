//! The language-model client capability consumed by R2 Decide (§6).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum LmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("token budget exceeded")]
    BudgetExceeded,
    #[error("refusing to contact insecure endpoint: {0}")]
    InsecureEndpoint(String),
}

/// Two operations, per §6: a single bounded reply, and a streamed one.
/// R2 only ever uses `generate` — `generate_stream` exists for the CLI/HTTP
/// surfaces that want incremental output.
#[async_trait]
pub trait LmClient: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], system_prompt: &str) -> Result<String, LmError>;

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<Vec<String>, LmError>;
}
