//! The skill-executor capability, as consumed by R6 Dispatch / R7 Observe
//! Result (§6). Every operation is side-effecting; the core tolerates
//! at-least-once dispatch and is responsible for idempotency via the
//! effect-id ledger (R6/§9), not this trait.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use cortex_types::SkillResult;

#[derive(Debug, Error)]
pub enum SkillExecutorError {
    #[error("skill backend rejected goal: {0}")]
    Rejected(String),
    #[error("unknown goal id: {0}")]
    UnknownGoal(String),
}

#[async_trait]
pub trait SkillExecutor: Send + Sync {
    /// Dispatch a skill invocation, returning a fresh goal-id.
    async fn dispatch(&self, skill_name: &str, params: &Value) -> Result<String, SkillExecutorError>;

    /// Best-effort cancel. Returns `false` if the goal is unknown or the
    /// backend does not support cancellation.
    async fn cancel(&self, goal_id: &str) -> bool;

    /// Non-terminal progress data, if any.
    async fn feedback(&self, goal_id: &str) -> Option<Value>;

    /// The terminal result, if the goal has completed.
    async fn result(&self, goal_id: &str) -> Option<SkillResult>;

    async fn is_done(&self, goal_id: &str) -> bool;
}
