//! `cortex-kernel` – the outer pipeline (K1–K6, §4.1–§4.6).
//!
//! Each stage is a pure `BrainState -> BrainState` function (K2/K3 take an
//! injected source and are `async` because the source call is) run by
//! `cortex-runtime` in fixed order: HCI ingress, telemetry sync, world
//! update, event arbitrate, task queue, kernel route. Only K5 mutates
//! `tasks.queue` structurally — the single-point-of-truth invariant from §9.
//!
//! # Modules
//!
//! - [`hci_ingress`] – K1: rule-based utterance classification.
//! - [`telemetry_sync`] – K2: pose/twist/battery/resource sync.
//! - [`world_update`] – K3: zone/obstacle refresh, collision-risk annotation.
//! - [`event_arbitrate`] – K4: deterministic mode arbitration.
//! - [`task_queue`] – K5: completion detection, NEW_GOAL folding, inbox drain.
//! - [`kernel_route`] – K6: mode to routing-target mapping.

pub mod event_arbitrate;
pub mod hci_ingress;
pub mod kernel_route;
pub mod task_queue;
pub mod telemetry_sync;
pub mod world_update;

pub use kernel_route::RouteTarget;
