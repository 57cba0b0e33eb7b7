//! R3 Compile Ops — translates a [`Decision`] into a [`ProposedOps`] (§4.9).
//! Resolves symbolic navigation targets (zone names, `home`) into concrete
//! coordinates via the fixed zone table and flags high-risk dispatches for
//! approval.

use cortex_types::{zone_center, BrainState, CompiledDispatch, DecisionType, ProposedOps};
use serde_json::{json, Value};

const HIGH_RISK_SKILLS: &[&str] = &["navigate_to_unknown", "manipulate", "dock"];

fn requires_approval(skill: &str, params: &Value) -> bool {
    HIGH_RISK_SKILLS.contains(&skill) || params.get("high_risk").and_then(Value::as_bool).unwrap_or(false)
}

/// Resolves `params.target` (a zone name or `home`) into `target_x`/
/// `target_y`/`target_theta`, if present. Params that already carry
/// explicit coordinates, or that name no target at all, pass through
/// unchanged.
fn resolve_target(params: &Value, home_pose: (f64, f64)) -> Value {
    let Some(target) = params.get("target").and_then(Value::as_str) else {
        return params.clone();
    };
    let coords = if target == "home" { Some(home_pose) } else { zone_center(target) };
    let Some((x, y)) = coords else {
        return params.clone();
    };
    let mut resolved = params.clone();
    if let Value::Object(map) = &mut resolved {
        map.insert("target_x".to_string(), json!(x));
        map.insert("target_y".to_string(), json!(y));
        map.entry("target_theta").or_insert(json!(0.0));
    }
    resolved
}

pub fn run(mut state: BrainState) -> BrainState {
    let Some(decision) = state.react.decision.clone() else {
        state.react.proposed_ops = Some(ProposedOps::default());
        return state;
    };

    let running_ids: Vec<String> = state.skills.running.iter().map(|s| s.goal_id.clone()).collect();
    let home_pose = (state.robot.home_pose.x, state.robot.home_pose.y);
    let mut ops = ProposedOps::default();

    match decision.decision_type {
        DecisionType::Abort => {
            ops.to_cancel = running_ids;
            ops.to_speak = vec!["Task aborted".to_string()];
        }
        DecisionType::Finish => {
            ops.to_cancel = running_ids;
            ops.to_speak = vec!["Task completed".to_string()];
        }
        DecisionType::AskHuman => {
            ops.to_speak = vec![format!("Human intervention requested: {}", decision.reason)];
            ops.need_approval = true;
            ops.approval_payload = Some(json!({
                "reason": decision.reason,
                "context": state.react.observation,
            }));
        }
        DecisionType::Continue | DecisionType::Replan | DecisionType::Retry => {
            if state.tasks.preempt_flag {
                ops.to_cancel = running_ids;
            }
            for op in &decision.ops {
                if op.skill.is_empty() {
                    continue;
                }
                let params = resolve_target(&op.params, home_pose);
                if requires_approval(&op.skill, &params) {
                    ops.need_approval = true;
                    ops.approval_payload = Some(json!({
                        "skill": op.skill,
                        "params": params,
                        "reason": "High-risk operation requires approval",
                    }));
                }
                ops.to_dispatch.push(CompiledDispatch { skill: op.skill.clone(), params });
            }
        }
        DecisionType::SwitchTask => {
            ops.to_cancel = running_ids;
            ops.to_speak = vec!["Switching tasks".to_string()];
        }
    }

    state.trace.push(format!(
        "[R3 Compile Ops] cancel={} dispatch={} need_approval={}",
        ops.to_cancel.len(),
        ops.to_dispatch.len(),
        ops.need_approval
    ));
    state.react.proposed_ops = Some(ops);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::{Decision, ModelOp, RunningSkill};
    use uuid::Uuid;

    fn state_with_decision(decision: Decision) -> BrainState {
        let mut s = BrainState::new(Uuid::new_v4());
        s.react.decision = Some(decision);
        s
    }

    #[test]
    fn abort_cancels_all_running_skills() {
        let mut s = state_with_decision(Decision { decision_type: DecisionType::Abort, reason: "x".into(), plan_patch: None, ops: vec![], new_tasks: None });
        s.skills.running.push(RunningSkill {
            goal_id: "g1".into(), skill_name: "NavigateToPose".into(), start_time: chrono::Utc::now(),
            timeout_seconds: 30.0, resources_occupied: vec!["base".into()], params: json!({}),
        });
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert_eq!(ops.to_cancel, vec!["g1".to_string()]);
    }

    #[test]
    fn ask_human_sets_need_approval_with_context() {
        let s = state_with_decision(Decision { decision_type: DecisionType::AskHuman, reason: "unsure".into(), plan_patch: None, ops: vec![], new_tasks: None });
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert!(ops.need_approval);
        assert!(ops.approval_payload.is_some());
    }

    #[test]
    fn continue_resolves_zone_target_to_coordinates() {
        let s = state_with_decision(Decision {
            decision_type: DecisionType::Continue, reason: "go".into(), plan_patch: None,
            ops: vec![ModelOp { skill: "NavigateToPose".into(), params: json!({ "target": "kitchen" }) }],
            new_tasks: None,
        });
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch[0].params["target_x"], 2.0);
        assert_eq!(ops.to_dispatch[0].params["target_y"], 2.0);
    }

    #[test]
    fn home_target_resolves_to_home_pose() {
        let mut s = state_with_decision(Decision {
            decision_type: DecisionType::Continue, reason: "go".into(), plan_patch: None,
            ops: vec![ModelOp { skill: "NavigateToPose".into(), params: json!({ "target": "home" }) }],
            new_tasks: None,
        });
        s.robot.home_pose = cortex_types::Pose::at(5.0, 6.0);
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch[0].params["target_x"], 5.0);
        assert_eq!(ops.to_dispatch[0].params["target_y"], 6.0);
    }

    #[test]
    fn high_risk_skill_flags_need_approval() {
        let s = state_with_decision(Decision {
            decision_type: DecisionType::Continue, reason: "go".into(), plan_patch: None,
            ops: vec![ModelOp { skill: "dock".into(), params: json!({}) }],
            new_tasks: None,
        });
        let s = run(s);
        assert!(s.react.proposed_ops.unwrap().need_approval);
    }

    #[test]
    fn high_risk_param_flag_also_triggers_approval() {
        let s = state_with_decision(Decision {
            decision_type: DecisionType::Continue, reason: "go".into(), plan_patch: None,
            ops: vec![ModelOp { skill: "Speak".into(), params: json!({ "high_risk": true }) }],
            new_tasks: None,
        });
        let s = run(s);
        assert!(s.react.proposed_ops.unwrap().need_approval);
    }

    #[test]
    fn preempt_flag_cancels_running_before_dispatch() {
        let mut s = state_with_decision(Decision {
            decision_type: DecisionType::Continue, reason: "go".into(), plan_patch: None,
            ops: vec![], new_tasks: None,
        });
        s.tasks.preempt_flag = true;
        s.skills.running.push(RunningSkill {
            goal_id: "g1".into(), skill_name: "NavigateToPose".into(), start_time: chrono::Utc::now(),
            timeout_seconds: 30.0, resources_occupied: vec!["base".into()], params: json!({}),
        });
        let s = run(s);
        assert_eq!(s.react.proposed_ops.unwrap().to_cancel, vec!["g1".to_string()]);
    }

    #[test]
    fn no_decision_yields_default_ops() {
        let s = run(BrainState::new(Uuid::new_v4()));
        assert_eq!(s.react.proposed_ops.unwrap(), ProposedOps::default());
    }
}
