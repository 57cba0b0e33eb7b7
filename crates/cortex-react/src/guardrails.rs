//! R4 Guardrails — the only stage permitted to override the model's
//! decision (§4.10). Three ordered checks per dispatch: existence, schema,
//! resource conflict.

use cortex_types::{BrainState, CompiledDispatch, Decision, DecisionType, SkillResult, SkillStatus};
use std::collections::HashSet;

fn check_resource_conflict(state: &BrainState, required: &[String]) -> Option<String> {
    for resource in required {
        if state.robot.resources.get(resource).copied().unwrap_or(false) {
            return Some(format!("resource {resource} is busy"));
        }
    }
    let occupied: HashSet<&str> = state.skills.running.iter().flat_map(|s| s.resources_occupied.iter().map(String::as_str)).collect();
    for resource in required {
        if occupied.contains(resource.as_str()) {
            return Some(format!("resource {resource} is occupied by a running skill"));
        }
    }
    None
}

fn validate_one(state: &BrainState, dispatch: &CompiledDispatch) -> Result<(), String> {
    let Some(skill_def) = state.skills.registry.get(&dispatch.skill) else {
        return Err(format!("skill not found: {}", dispatch.skill));
    };
    for field in skill_def.required_args() {
        if dispatch.params.get(&field).is_none() {
            return Err(format!("missing required field for {}: {field}", dispatch.skill));
        }
    }
    if let Some(reason) = check_resource_conflict(state, &skill_def.resources_required) {
        return Err(format!("resource conflict for {}: {reason}", dispatch.skill));
    }
    Ok(())
}

pub fn run(mut state: BrainState) -> BrainState {
    let Some(mut ops) = state.react.proposed_ops.clone() else { return state };

    let mut errors = Vec::new();
    let mut valid = Vec::new();
    for dispatch in ops.to_dispatch.drain(..) {
        match validate_one(&state, &dispatch) {
            Ok(()) => valid.push(dispatch),
            Err(e) => errors.push(e),
        }
    }
    ops.to_dispatch = valid;

    if !errors.is_empty() {
        let joined = errors.join("; ");
        let decision_type = if errors.len() > 2 { DecisionType::AskHuman } else { DecisionType::Replan };
        state.react.decision = Some(Decision {
            decision_type,
            reason: format!("Guardrails check failed: {joined}"),
            plan_patch: None,
            ops: Vec::new(),
            new_tasks: None,
        });
        state.skills.last_result = Some(SkillResult {
            skill_name: String::new(),
            status: SkillStatus::Failed,
            error_code: Some("GUARDRAILS_FAILED".to_string()),
            error_msg: Some(joined.clone()),
            output: None,
        });
        state.trace.push(format!("[R4 Guardrails] failed: {joined}"));
    } else {
        state.trace.push("[R4 Guardrails] passed".to_string());
    }

    state.react.proposed_ops = Some(ops);
    state
}
