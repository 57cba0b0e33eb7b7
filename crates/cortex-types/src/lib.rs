//! `cortex-types` – the shared data model.
//!
//! Everything the Kernel and ReAct pipelines pass between stages lives here:
//! the aggregate [`BrainState`] snapshot and its eight substates, the
//! [`Task`]/[`SkillDef`]/[`RunningSkill`] value types, and the
//! [`Decision`]/[`ProposedOps`] pair that crosses from R2 into R3–R6.
//!
//! # Modules
//!
//! - [`enums`] – small closed vocabularies shared across substates.
//! - [`models`] – `Task`, `SkillDef`, `RunningSkill`, `Decision`, `ProposedOps`.
//! - [`state`] – `BrainState` and its eight substates.
//! - [`error`] – [`CoreError`], reserved for unrecoverable conditions.
//! - [`zones`] – the fixed symbolic zone table (§4.9).

pub mod enums;
pub mod error;
pub mod models;
pub mod state;
pub mod zones;

pub use enums::{BatteryState, DecisionType, InterfaceKind, InterruptClass, Mode, SkillStatus, TaskStatus};
pub use error::CoreError;
pub use models::{CompiledDispatch, Decision, ModelOp, ProposedOps, RunningSkill, SkillDef, SkillResult, Task};
pub use state::{
    BrainState, ChatMessage, HciState, MessagesState, Obstacle, Pose, ReactState, RobotState,
    SkillsState, TasksState, Twist, WorldState,
};
pub use zones::{navigate_goal_target, zone_center, ZONES};
