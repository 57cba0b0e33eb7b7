//! Value types shared by the Kernel and ReAct pipelines: [`Task`], [`SkillDef`],
//! [`RunningSkill`], [`Decision`], and [`ProposedOps`] — see §3 of the design
//! document for the authoritative field list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::{DecisionType, InterfaceKind, SkillStatus, TaskStatus};

/// A unit of work in the Kernel's priority queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// e.g. `navigate_to:kitchen`.
    pub goal: String,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub required_resources: Vec<String>,
    pub preemptible: bool,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Free-form task parameters, e.g. `{"target": "kitchen"}` or explicit
    /// coordinates. R3 Compile Ops reads `target`/`target_x`/`target_y` here.
    pub metadata: Value,
}

impl Task {
    pub fn new(goal: impl Into<String>, priority: i32, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            priority,
            deadline: None,
            required_resources: vec!["base".to_string()],
            preemptible: true,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            metadata,
        }
    }
}

/// A registered skill's static definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub name: String,
    pub interface_kind: InterfaceKind,
    /// JSON Schema fragment; only `required` (array of field names) is
    /// consulted by R4's schema check.
    pub args_schema: Value,
    pub resources_required: Vec<String>,
    pub preemptible: bool,
    pub cancel_supported: bool,
    pub timeout_seconds: f64,
    pub error_map: HashMap<String, String>,
    pub description: String,
}

impl SkillDef {
    /// The `required` field names declared in `args_schema`, if any.
    pub fn required_args(&self) -> Vec<String> {
        self.args_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A skill goal that R6 Dispatch has issued and is tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSkill {
    pub goal_id: String,
    pub skill_name: String,
    pub start_time: DateTime<Utc>,
    pub timeout_seconds: f64,
    pub resources_occupied: Vec<String>,
    pub params: Value,
}

impl RunningSkill {
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Outcome of a completed or abandoned [`RunningSkill`], produced by R7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub skill_name: String,
    pub status: SkillStatus,
    pub error_code: Option<String>,
    pub error_msg: Option<String>,
    pub output: Option<Value>,
}

/// One operation the model asked for, in its own vocabulary — skill name plus
/// whatever params it supplied. R3 Compile Ops resolves this into a
/// [`CompiledDispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ModelOp {
    pub skill: String,
    #[serde(default)]
    pub params: Value,
}

/// The tagged result of R2 Decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Decision {
    #[serde(rename = "type")]
    pub decision_type: DecisionType,
    pub reason: String,
    #[serde(default)]
    pub plan_patch: Option<Value>,
    #[serde(default)]
    pub ops: Vec<ModelOp>,
    #[serde(default)]
    pub new_tasks: Option<Value>,
}

impl Decision {
    pub fn continue_with(reason: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::Continue,
            reason: reason.into(),
            plan_patch: None,
            ops: Vec::new(),
            new_tasks: None,
        }
    }
}

/// A dispatch op after R3 has resolved symbolic targets into concrete
/// coordinates and flagged approval requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledDispatch {
    pub skill: String,
    pub params: Value,
}

/// The concrete side-effect plan produced by R3 Compile Ops and consumed by
/// R5/R6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProposedOps {
    pub to_cancel: Vec<String>,
    pub to_dispatch: Vec<CompiledDispatch>,
    pub to_speak: Vec<String>,
    pub need_approval: bool,
    pub approval_payload: Option<Value>,
}
