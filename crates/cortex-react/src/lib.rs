//! `cortex-react` – the inner ReAct Engine (R1-R8).
//!
//! Entered by `cortex-runtime` only when the Kernel has routed the snapshot
//! to [`cortex_kernel::RouteTarget::ReactLoop`]. Each stage is a pure
//! `BrainState -> BrainState` function except [`dispatch::run`], the sole
//! side-effecting stage, which issues and cancels skill goals through an
//! injected `SkillExecutor`.
//!
//! Stage order: [`build_observation`] → [`decide`] → [`compile_ops`] →
//! [`guardrails`] → [`human_approval`] → [`dispatch`] → [`observe_result`] →
//! [`stop_or_loop`], looping back to `build_observation` until
//! [`stop_or_loop::should_continue`] returns `false`.

pub mod build_observation;
pub mod compile_ops;
pub mod decide;
pub mod dispatch;
pub mod guardrails;
pub mod human_approval;
pub mod observe_result;
pub mod stop_or_loop;

pub use stop_or_loop::should_continue;
