//! [`BrainState`] — the aggregate, fully-serializable snapshot passed between
//! every Kernel and ReAct stage. See §3 of the design document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::enums::{BatteryState, InterruptClass, Mode};
use crate::error::CoreError;
use crate::models::{Decision, ProposedOps, RunningSkill, SkillDef, SkillResult, Task};

/// 3D position plus orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

impl Pose {
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0, qx: 0.0, qy: 0.0, qz: 0.0, qw: 1.0 }
    }

    pub fn distance_to(&self, other: &Pose) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(0.0, 0.0)
    }
}

/// Linear/angular velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Twist {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

/// An axis-aligned obstacle, with collision-risk annotated by K3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub collision_risk: bool,
}

/// Human-computer-interaction substate: the current utterance and its
/// rule-derived classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HciState {
    pub utterance: String,
    pub interrupt_class: InterruptClass,
    pub interrupt_payload: Value,
    pub approval_response: Option<Value>,
}

/// World-model substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldState {
    pub summary: String,
    pub zones: Vec<String>,
    pub obstacles: Vec<Obstacle>,
}

/// Robot telemetry substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub pose: Pose,
    pub home_pose: Pose,
    pub twist: Twist,
    pub battery_pct: f64,
    pub battery_state: BatteryState,
    pub resources: HashMap<String, bool>,
    pub distance_to_target: f64,
}

impl Default for RobotState {
    fn default() -> Self {
        let mut resources = HashMap::new();
        resources.insert("base".to_string(), false);
        resources.insert("arm".to_string(), false);
        resources.insert("gripper".to_string(), false);
        Self {
            pose: Pose::default(),
            home_pose: Pose::default(),
            twist: Twist::default(),
            battery_pct: 100.0,
            battery_state: BatteryState::Full,
            resources,
            distance_to_target: 0.0,
        }
    }
}

/// Task-queue substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TasksState {
    pub inbox: Vec<Value>,
    pub queue: Vec<Task>,
    pub active_task_id: Option<Uuid>,
    pub mode: Mode,
    pub preempt_flag: bool,
    pub preempt_reason: String,
}

/// Skill-registry and in-flight-skill substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SkillsState {
    pub registry: HashMap<String, SkillDef>,
    pub running: Vec<RunningSkill>,
    pub last_result: Option<SkillResult>,
}

/// ReAct-loop bookkeeping substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReactState {
    pub iter: u32,
    pub observation: Option<Value>,
    pub decision: Option<Decision>,
    pub proposed_ops: Option<ProposedOps>,
    pub stop_reason: Option<String>,
}

/// Append-only human-readable trace plus free-form metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TraceState {
    pub lines: Vec<String>,
    pub metrics: HashMap<String, Value>,
}

impl TraceState {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// One turn in the bounded message window supplied to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into(), msg_type: None }
    }
}

/// Bounded conversation-window substate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessagesState {
    pub messages: Vec<ChatMessage>,
}

/// The aggregate brain snapshot. Every stage function is `BrainState ->
/// BrainState` (K stages are pure; R6 Dispatch is the sole side-effecting
/// exception, per §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainState {
    pub session_id: Uuid,
    pub hci: HciState,
    pub world: WorldState,
    pub robot: RobotState,
    pub tasks: TasksState,
    pub skills: SkillsState,
    pub react: ReactState,
    pub trace: TraceState,
    pub messages: MessagesState,
}

impl BrainState {
    /// A fresh snapshot for a new session, robot parked at the origin with a
    /// full battery and an empty queue.
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            hci: HciState::default(),
            world: WorldState::default(),
            robot: RobotState::default(),
            tasks: TasksState::default(),
            skills: SkillsState::default(),
            react: ReactState::default(),
            trace: TraceState::default(),
            messages: MessagesState::default(),
        }
    }

    pub fn serialize(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn deserialize(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// An effect-id stable across replays of the same (session, iteration,
    /// op-index) triple — see glossary "Effect-id".
    pub fn effect_id(&self, op_index: usize) -> String {
        format!("{}:{}:{}", self.session_id, self.react.iter, op_index)
    }
}
