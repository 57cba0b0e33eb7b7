//! [`Orchestrator`] – the top-level driver (§4.15, §5).
//!
//! Runs K1→K6, then — if routed to [`RouteTarget::ReactLoop`] — R1→R8
//! repeatedly until [`cortex_react::should_continue`] returns `false`,
//! checkpointing a `(session, stage, snapshot)` triple at every stage
//! boundary via the injected [`Checkpointer`] so a crashed session resumes
//! exactly where it left off and never replays an already-executed
//! dispatch (R6's effect-id ledger).
//!
//! A session is driven from a single task with single-writer discipline
//! (§5): [`Orchestrator::run_pass`] takes ownership of the snapshot and
//! hands back the next one: there is no shared, lockable `BrainState`
//! inside the orchestrator itself. [`run_simulation_loop`] is the ≈10 Hz
//! companion task that steps the simulated telemetry source and triggers a
//! pass on target completion or an active-task change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cortex_kernel::kernel_route::route_for;
use cortex_kernel::RouteTarget;
use cortex_memory::{Checkpointer, CheckpointerError};
use cortex_middleware::{EventBus, LmClient, SkillExecutor, SnapshotEvent, TelemetrySource, WorldSource};
use cortex_types::BrainState;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Distance (in world units) below which the active task's target counts
/// as reached, matching K5 Task Queue's completion threshold.
const TARGET_REACHED_EPSILON: f64 = 0.5;

/// Owns the capability handles (telemetry, world, skill executor, LM
/// client) and the durable store.
pub struct Orchestrator {
    telemetry: Arc<dyn TelemetrySource>,
    world: Arc<dyn WorldSource>,
    skill_executor: Arc<dyn SkillExecutor>,
    lm_client: Arc<dyn LmClient>,
    checkpointer: Checkpointer,
    bus: EventBus,
}

impl Orchestrator {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        world: Arc<dyn WorldSource>,
        skill_executor: Arc<dyn SkillExecutor>,
        lm_client: Arc<dyn LmClient>,
        checkpointer: Checkpointer,
        bus: EventBus,
    ) -> Self {
        Self { telemetry, world, skill_executor, lm_client, checkpointer, bus }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// The language-model client backing R2 Decide, exposed so other
    /// surfaces (e.g. a chit-chat fallback in the CLI) can reuse the same
    /// rate-limited, budget-enforced connection outside of a Kernel/ReAct
    /// pass.
    pub fn lm_client(&self) -> Arc<dyn LmClient> {
        Arc::clone(&self.lm_client)
    }

    /// A fresh snapshot, seeded with the default skill registry, persisted
    /// as its own first checkpoint.
    pub async fn new_session(&self) -> BrainState {
        let mut state = BrainState::new(Uuid::new_v4());
        state.skills.registry = cortex_skills::default_registry();
        self.checkpoint(&state, "new_session").await;
        state
    }

    /// The most recently checkpointed snapshot for `session_id`, if any.
    pub async fn resume_session(&self, session_id: Uuid) -> Result<Option<BrainState>, CheckpointerError> {
        let checkpoint = self.checkpointer.load(&session_id.to_string(), None).await?;
        Ok(checkpoint.and_then(|c| BrainState::deserialize(&c.snapshot_json).ok()))
    }

    async fn checkpoint(&self, state: &BrainState, stage: &str) {
        if let Ok(snapshot) = serde_json::to_value(state) {
            if let Err(e) = self.checkpointer.save(&state.session_id.to_string(), &snapshot, stage, None).await {
                tracing::warn!(error = %e, stage, "checkpoint save failed");
            }
        }
        self.bus.publish(SnapshotEvent::new(stage, state.clone()));
    }

    /// Runs K1→K6, then — if routed to the ReAct loop — R1→R8 repeatedly
    /// until the loop stops or suspends for human approval. `cancel` is
    /// polled at every stage boundary (§5's cancel-via-flag contract); when
    /// set, the pass returns the snapshot as of the last completed stage.
    pub async fn run_pass(&self, state: BrainState, cancel: &AtomicBool) -> BrainState {
        let state = self.run_kernel(state, cancel).await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }
        if route_for(state.tasks.mode) != RouteTarget::ReactLoop {
            return state;
        }
        self.run_react_loop(state, cancel).await
    }

    async fn run_kernel(&self, mut state: BrainState, cancel: &AtomicBool) -> BrainState {
        state = cortex_kernel::hci_ingress::run(state);
        self.checkpoint(&state, "K1").await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }

        state = cortex_kernel::telemetry_sync::run(state, self.telemetry.as_ref()).await;
        self.checkpoint(&state, "K2").await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }

        state = cortex_kernel::world_update::run(state, self.world.as_ref()).await;
        self.checkpoint(&state, "K3").await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }

        state = cortex_kernel::event_arbitrate::run(state);
        self.checkpoint(&state, "K4").await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }

        state = cortex_kernel::task_queue::run(state);
        self.checkpoint(&state, "K5").await;
        if cancel.load(Ordering::Relaxed) {
            return state;
        }

        state = cortex_kernel::kernel_route::run(state);
        self.checkpoint(&state, "K6").await;
        state
    }

    async fn run_react_loop(&self, mut state: BrainState, cancel: &AtomicBool) -> BrainState {
        loop {
            state = self.run_react_iteration(state).await;
            if cancel.load(Ordering::Relaxed) || !cortex_react::should_continue(&state) {
                return state;
            }
        }
    }

    async fn run_react_iteration(&self, mut state: BrainState) -> BrainState {
        state = cortex_react::build_observation::run(state);
        self.checkpoint(&state, "R1").await;

        state = cortex_react::decide::run(state, self.lm_client.as_ref()).await;
        self.checkpoint(&state, "R2").await;

        state = cortex_react::compile_ops::run(state);
        self.checkpoint(&state, "R3").await;

        state = cortex_react::guardrails::run(state);
        self.checkpoint(&state, "R4").await;

        state = cortex_react::human_approval::run(state);
        self.checkpoint(&state, "R5").await;
        if state.react.stop_reason.as_deref() == Some("waiting_for_approval") {
            return state;
        }

        state = self.dispatch_with_idempotency(state).await;
        self.checkpoint(&state, "R6").await;

        state = cortex_react::observe_result::run(state, self.skill_executor.as_ref()).await;
        self.checkpoint(&state, "R7").await;

        state = cortex_react::stop_or_loop::run(state);
        self.checkpoint(&state, "R8").await;
        state
    }

    /// Pre-fetches which of this iteration's proposed effect-ids have
    /// already been executed (resume replay case) before handing the
    /// closure to R6, since the checkpointer's lookup is async and R6's
    /// `already_executed` hook is not. Marks each newly-attempted effect as
    /// executed once R6 returns.
    async fn dispatch_with_idempotency(&self, state: BrainState) -> BrainState {
        let session_id = state.session_id.to_string();
        let to_dispatch_len = state.react.proposed_ops.as_ref().map(|o| o.to_dispatch.len()).unwrap_or(0);

        let mut already: std::collections::HashSet<String> = std::collections::HashSet::new();
        for index in 0..to_dispatch_len {
            let effect_id = state.effect_id(index);
            if self.checkpointer.effect_executed(&session_id, &effect_id).await.unwrap_or(false) {
                already.insert(effect_id);
            }
        }

        let already_fn = |effect_id: &str| already.contains(effect_id);
        let state = cortex_react::dispatch::run(state, self.skill_executor.as_ref(), &already_fn).await;

        for index in 0..to_dispatch_len {
            let effect_id = state.effect_id(index);
            if !already.contains(&effect_id) {
                let _ = self.checkpointer.mark_effect(&session_id, &effect_id).await;
            }
        }

        state
    }
}

/// The ≈10 Hz simulation companion task (§5's "Simulation/telemetry loop").
/// Steps `telemetry` every `interval`, then — on target completion or an
/// active-task change — drives one [`Orchestrator::run_pass`] over the
/// shared session state.
pub async fn run_simulation_loop(
    orchestrator: Arc<Orchestrator>,
    telemetry: Arc<cortex_skills::SimTelemetry>,
    session: Arc<Mutex<BrainState>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_active_task = None;
    loop {
        ticker.tick().await;
        telemetry.step().await;

        let mut guard = session.lock().await;
        let target_reached = guard.robot.distance_to_target < TARGET_REACHED_EPSILON;
        let active_task_changed = guard.tasks.active_task_id != last_active_task;
        last_active_task = guard.tasks.active_task_id;

        if target_reached || active_task_changed {
            let cancel = AtomicBool::new(false);
            let current = guard.clone();
            *guard = orchestrator.run_pass(current, &cancel).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_middleware::{ChatMessage, LmError, Role, SkillExecutorError};
    use cortex_types::{Pose, SkillResult, Twist};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct NoopTelemetry;
    #[async_trait]
    impl TelemetrySource for NoopTelemetry {
        async fn pose(&self) -> Option<Pose> {
            Some(Pose::default())
        }
        async fn twist(&self) -> Option<Twist> {
            Some(Twist::default())
        }
        async fn battery_pct(&self) -> Option<f64> {
            Some(100.0)
        }
        async fn resources(&self) -> Option<HashMap<String, bool>> {
            Some(HashMap::new())
        }
    }

    struct NoopWorld;
    #[async_trait]
    impl WorldSource for NoopWorld {
        async fn zones(&self) -> Vec<String> {
            Vec::new()
        }
        async fn obstacles(&self) -> Vec<(f64, f64, f64, f64)> {
            Vec::new()
        }
        async fn zone_accessible(&self, _zone: &str) -> bool {
            false
        }
    }

    struct NoopExecutor;
    #[async_trait]
    impl SkillExecutor for NoopExecutor {
        async fn dispatch(&self, _skill_name: &str, _params: &serde_json::Value) -> Result<String, SkillExecutorError> {
            Ok("goal-1".to_string())
        }
        async fn cancel(&self, _goal_id: &str) -> bool {
            false
        }
        async fn feedback(&self, _goal_id: &str) -> Option<serde_json::Value> {
            None
        }
        async fn result(&self, _goal_id: &str) -> Option<SkillResult> {
            None
        }
        async fn is_done(&self, _goal_id: &str) -> bool {
            false
        }
    }

    struct FixedClient(&'static str);
    #[async_trait]
    impl LmClient for FixedClient {
        async fn generate(&self, _messages: &[ChatMessage], _system_prompt: &str) -> Result<String, LmError> {
            Ok(self.0.to_string())
        }
        async fn generate_stream(&self, _messages: &[ChatMessage], _system_prompt: &str) -> Result<Vec<String>, LmError> {
            Ok(vec![self.0.to_string()])
        }
    }

    fn test_orchestrator(reply: &'static str) -> Orchestrator {
        Orchestrator::new(
            Arc::new(NoopTelemetry),
            Arc::new(NoopWorld),
            Arc::new(NoopExecutor),
            Arc::new(FixedClient(reply)),
            Checkpointer::open_in_memory().unwrap(),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn idle_session_routes_away_from_react_loop_without_decision() {
        let orchestrator = test_orchestrator(r#"{"type":"CONTINUE","reason":"ok"}"#);
        let state = orchestrator.new_session().await;
        let cancel = AtomicBool::new(false);
        let result = orchestrator.run_pass(state, &cancel).await;
        assert!(result.react.decision.is_none());
        assert_eq!(result.trace.metrics["route_target"], "idle_wait");
    }

    #[tokio::test]
    async fn exec_mode_runs_the_react_loop_until_finish() {
        let orchestrator = test_orchestrator(r#"{"type":"FINISH","reason":"done"}"#);
        let mut state = orchestrator.new_session().await;
        state.tasks.mode = cortex_types::Mode::Exec;
        let cancel = AtomicBool::new(false);
        let result = orchestrator.run_pass(state, &cancel).await;
        assert_eq!(result.react.stop_reason.as_deref(), Some("task_completed"));
        assert_eq!(result.react.iter, 1);
    }

    #[tokio::test]
    async fn resume_session_returns_none_before_any_checkpoint() {
        let orchestrator = test_orchestrator(r#"{"type":"CONTINUE","reason":"ok"}"#);
        let result = orchestrator.resume_session(Uuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn resume_session_returns_latest_checkpoint() {
        let orchestrator = test_orchestrator(r#"{"type":"CONTINUE","reason":"ok"}"#);
        let state = orchestrator.new_session().await;
        let session_id = state.session_id;
        let cancel = AtomicBool::new(false);
        orchestrator.run_pass(state, &cancel).await;
        let resumed = orchestrator.resume_session(session_id).await.unwrap();
        assert!(resumed.is_some());
        assert_eq!(resumed.unwrap().session_id, session_id);
    }

    #[tokio::test]
    async fn cancel_flag_stops_kernel_before_later_stages() {
        let orchestrator = test_orchestrator(r#"{"type":"CONTINUE","reason":"ok"}"#);
        let state = orchestrator.new_session().await;
        let cancel = AtomicBool::new(true);
        let result = orchestrator.run_pass(state, &cancel).await;
        // Only K1 (hci_ingress) should have traced before the cancel check fired.
        assert_eq!(result.trace.lines.len(), 1);
        assert!(result.trace.lines[0].contains("K1"));
    }

    #[tokio::test]
    async fn effect_is_not_replayed_on_a_second_pass_with_same_iteration() {
        let orchestrator = test_orchestrator(r#"{"type":"CONTINUE","reason":"ok","ops":[{"skill":"Speak","params":{"message":"hi"}}]}"#);
        let mut state = orchestrator.new_session().await;
        state.tasks.mode = cortex_types::Mode::Exec;
        state.react.iter = 5;
        let effect_id = state.effect_id(0);
        orchestrator.checkpointer.mark_effect(&state.session_id.to_string(), &effect_id).await.unwrap();

        let dispatched = StdMutex::new(0u32);
        struct CountingExecutor<'a>(&'a StdMutex<u32>);
        #[async_trait]
        impl SkillExecutor for CountingExecutor<'_> {
            async fn dispatch(&self, _skill_name: &str, _params: &serde_json::Value) -> Result<String, SkillExecutorError> {
                *self.0.lock().unwrap() += 1;
                Ok("goal-1".to_string())
            }
            async fn cancel(&self, _goal_id: &str) -> bool {
                false
            }
            async fn feedback(&self, _goal_id: &str) -> Option<serde_json::Value> {
                None
            }
            async fn result(&self, _goal_id: &str) -> Option<SkillResult> {
                None
            }
            async fn is_done(&self, _goal_id: &str) -> bool {
                false
            }
        }
        let orchestrator = Orchestrator::new(
            Arc::new(NoopTelemetry),
            Arc::new(NoopWorld),
            Arc::new(CountingExecutor(&dispatched)),
            Arc::new(FixedClient(r#"{"type":"CONTINUE","reason":"ok","ops":[{"skill":"Speak","params":{"message":"hi"}}]}"#)),
            orchestrator.checkpointer.clone(),
            EventBus::default(),
        );

        // Force iter to stay at 5 by pre-seeding react.iter one below, since
        // build_observation increments it by one on entry.
        state.react.iter = 4;
        let _ = orchestrator.run_react_iteration(state).await;
        assert_eq!(*dispatched.lock().unwrap(), 0, "effect already marked executed must not be redispatched");
    }
}
