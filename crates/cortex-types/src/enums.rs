//! Shared enum vocabulary for the brain snapshot and its substates.

use serde::{Deserialize, Serialize};

/// Rule-derived classification of the current user utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptClass {
    #[default]
    None,
    Pause,
    Stop,
    NewGoal,
}

/// Coarse operating regime selected by K4 Event Arbitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Safe,
    Charge,
    Exec,
    #[default]
    Idle,
}

/// Charge level bucket derived from `battery_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryState {
    Full,
    Charging,
    #[default]
    Discharging,
    Low,
    Critical,
}

/// Lifecycle of a single [`crate::models::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Transport kind a [`crate::models::SkillDef`] is invoked through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Action,
    Service,
    Internal,
}

/// The tagged outcome of R2 Decide, also produced (synthesized) by several
/// other stages on the error paths described in the error-handling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    Continue,
    Replan,
    Retry,
    SwitchTask,
    AskHuman,
    Finish,
    Abort,
}

/// Terminal status of a dispatched skill, as reported by R7 Observe Result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStatus {
    Succeeded,
    Failed,
    Timeout,
    Cancelled,
}
