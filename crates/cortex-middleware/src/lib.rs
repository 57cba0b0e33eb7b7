//! `cortex-middleware` – the external-interface layer.
//!
//! Defines the capability traits the Kernel and ReAct stages are written
//! against (§6): telemetry/world sources for K2/K3, the skill executor for
//! R6/R7, and the language-model client for R2. Also owns the [`bus`]
//! snapshot broadcast used to expose post-stage state to external observers.
//!
//! None of these traits know anything about the Kernel/ReAct pipelines
//! themselves — they are pure capability boundaries, implemented by
//! `cortex-skills` (simulated backends) and `cortex-runtime` (HTTP LM
//! client) and consumed by `cortex-kernel`/`cortex-react`.

pub mod bus;
pub mod lm_client;
pub mod skill_executor;
pub mod sources;

pub use bus::{EventBus, SessionSubscriber, SnapshotEvent};
pub use lm_client::{ChatMessage, LmClient, LmError, Role};
pub use skill_executor::{SkillExecutor, SkillExecutorError};
pub use sources::{TelemetrySource, WorldSource};
