//! R6 Dispatch — the only side-effect stage (§4.12). Cancels first
//! (best-effort), then dispatches; recomputes resource-busy flags from the
//! remaining running skills. Every dispatch carries a stable effect-id
//! `(session, iteration, op-index)` so the checkpointer's idempotency
//! ledger can suppress a re-issued effect on replay.

use cortex_middleware::SkillExecutor;
use cortex_types::{BrainState, RunningSkill};
use chrono::Utc;

const DEFAULT_TIMEOUT_SECONDS: f64 = 60.0;
const TRACKED_RESOURCES: &[&str] = &["base", "arm", "gripper"];

fn recompute_resource_flags(state: &mut BrainState) {
    let occupied: std::collections::HashSet<&str> =
        state.skills.running.iter().flat_map(|s| s.resources_occupied.iter().map(String::as_str)).collect();
    for resource in TRACKED_RESOURCES {
        state.robot.resources.insert(resource.to_string(), occupied.contains(resource));
    }
}

/// Effects already executed for this session are skipped. `executed` is
/// populated by the checkpointer's idempotency check (R6/§9); callers that
/// don't checkpoint can pass an empty set.
pub async fn run(
    mut state: BrainState,
    executor: &dyn SkillExecutor,
    already_executed: &dyn Fn(&str) -> bool,
) -> BrainState {
    let Some(ops) = state.react.proposed_ops.clone() else { return state };

    for goal_id in &ops.to_cancel {
        if executor.cancel(goal_id).await {
            state.skills.running.retain(|s| &s.goal_id != goal_id);
            state.trace.push(format!("[R6 Dispatch] cancelled {goal_id}"));
        }
    }

    for (index, dispatch) in ops.to_dispatch.iter().enumerate() {
        let effect_id = state.effect_id(index);
        if already_executed(&effect_id) {
            state.trace.push(format!("[R6 Dispatch] skipped already-executed effect {effect_id}"));
            continue;
        }

        let skill_def = state.skills.registry.get(&dispatch.skill);
        let timeout_seconds = skill_def.map(|d| d.timeout_seconds).unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let resources = skill_def.map(|d| d.resources_required.clone()).unwrap_or_default();

        match executor.dispatch(&dispatch.skill, &dispatch.params).await {
            Ok(goal_id) => {
                state.trace.push(format!("[R6 Dispatch] dispatched {} -> {goal_id} (effect={effect_id})", dispatch.skill));
                state.skills.running.push(RunningSkill {
                    goal_id,
                    skill_name: dispatch.skill.clone(),
                    start_time: Utc::now(),
                    timeout_seconds,
                    resources_occupied: resources,
                    params: dispatch.params.clone(),
                });
            }
            Err(e) => {
                state.trace.push(format!("[R6 Dispatch] dispatch rejected for {}: {e}", dispatch.skill));
            }
        }
    }

    recompute_resource_flags(&mut state);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_middleware::SkillExecutorError;
    use cortex_types::{CompiledDispatch, ProposedOps, SkillResult};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeExecutor {
        next_goal: Mutex<u32>,
        cancelled: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn new() -> Self {
            Self { next_goal: Mutex::new(0), cancelled: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SkillExecutor for FakeExecutor {
        async fn dispatch(&self, _skill_name: &str, _params: &Value) -> Result<String, SkillExecutorError> {
            let mut n = self.next_goal.lock().unwrap();
            *n += 1;
            Ok(format!("goal_{n}"))
        }
        async fn cancel(&self, goal_id: &str) -> bool {
            self.cancelled.lock().unwrap().push(goal_id.to_string());
            true
        }
        async fn feedback(&self, _goal_id: &str) -> Option<Value> {
            None
        }
        async fn result(&self, _goal_id: &str) -> Option<SkillResult> {
            None
        }
        async fn is_done(&self, _goal_id: &str) -> bool {
            false
        }
    }

    fn no_history(_effect_id: &str) -> bool {
        false
    }

    #[tokio::test]
    async fn dispatch_adds_running_skill_and_sets_resource_flag() {
        let mut state = BrainState::new(Uuid::new_v4());
        state.react.proposed_ops = Some(ProposedOps {
            to_dispatch: vec![CompiledDispatch { skill: "NavigateToPose".into(), params: json!({}) }],
            ..Default::default()
        });
        let executor = FakeExecutor::new();
        let state = run(state, &executor, &no_history).await;
        assert_eq!(state.skills.running.len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_from_running_and_clears_resource_flag() {
        let mut state = BrainState::new(Uuid::new_v4());
        state.skills.running.push(RunningSkill {
            goal_id: "g1".into(), skill_name: "NavigateToPose".into(), start_time: Utc::now(),
            timeout_seconds: 30.0, resources_occupied: vec!["base".into()], params: json!({}),
        });
        state.react.proposed_ops = Some(ProposedOps { to_cancel: vec!["g1".to_string()], ..Default::default() });
        let executor = FakeExecutor::new();
        let state = run(state, &executor, &no_history).await;
        assert!(state.skills.running.is_empty());
        assert_eq!(state.robot.resources.get("base"), Some(&false));
    }

    #[tokio::test]
    async fn already_executed_effect_is_skipped() {
        let mut state = BrainState::new(Uuid::new_v4());
        state.react.proposed_ops = Some(ProposedOps {
            to_dispatch: vec![CompiledDispatch { skill: "NavigateToPose".into(), params: json!({}) }],
            ..Default::default()
        });
        let executor = FakeExecutor::new();
        let state = run(state, &executor, &|_| true).await;
        assert!(state.skills.running.is_empty());
    }

    #[tokio::test]
    async fn resource_flags_reflect_only_remaining_running_skills() {
        let mut state = BrainState::new(Uuid::new_v4());
        state.react.proposed_ops = Some(ProposedOps::default());
        let executor = FakeExecutor::new();
        let state = run(state, &executor, &no_history).await;
        assert_eq!(state.robot.resources.get("base"), Some(&false));
        assert_eq!(state.robot.resources.get("arm"), Some(&false));
    }
}
