//! R7 Observe Result — polls every running skill (§4.13). Completed skills
//! are parsed into a [`SkillResult`] and reported back as a tool-result
//! message; skills past their timeout are synthesized as failed; the rest
//! are polled for feedback and retained.

use cortex_middleware::SkillExecutor;
use cortex_types::{BrainState, ChatMessage, SkillResult, SkillStatus};
use chrono::Utc;
use serde_json::json;

const TRACKED_RESOURCES: &[&str] = &["base", "arm", "gripper"];

fn recompute_resource_flags(state: &mut BrainState) {
    let occupied: std::collections::HashSet<&str> =
        state.skills.running.iter().flat_map(|s| s.resources_occupied.iter().map(String::as_str)).collect();
    for resource in TRACKED_RESOURCES {
        state.robot.resources.insert(resource.to_string(), occupied.contains(resource));
    }
}

fn result_message(result: &SkillResult) -> ChatMessage {
    let payload = json!({
        "status": result.status,
        "error_code": result.error_code,
        "error_msg": result.error_msg,
        "output": result.output,
    });
    ChatMessage::new("tool", format!("{}: {}", result.skill_name, payload))
}

pub async fn run(mut state: BrainState, executor: &dyn SkillExecutor) -> BrainState {
    let now = Utc::now();
    let mut still_running = Vec::new();
    let mut completed = Vec::new();

    for skill in state.skills.running.drain(..) {
        if executor.is_done(&skill.goal_id).await {
            let result = executor.result(&skill.goal_id).await.unwrap_or(SkillResult {
                skill_name: skill.skill_name.clone(),
                status: SkillStatus::Succeeded,
                error_code: None,
                error_msg: None,
                output: None,
            });
            completed.push(result);
        } else if skill.elapsed_seconds(now) > skill.timeout_seconds {
            completed.push(SkillResult {
                skill_name: skill.skill_name.clone(),
                status: SkillStatus::Failed,
                error_code: Some("TIMEOUT".to_string()),
                error_msg: Some(format!("{} exceeded timeout of {}s", skill.skill_name, skill.timeout_seconds)),
                output: None,
            });
        } else {
            let _feedback = executor.feedback(&skill.goal_id).await;
            still_running.push(skill);
        }
    }

    state.skills.running = still_running;

    for result in &completed {
        state.trace.push(format!("[R7 Observe Result] {} -> {:?}", result.skill_name, result.status));
        state.messages.messages.push(result_message(result));
    }
    if let Some(last) = completed.into_iter().last() {
        state.skills.last_result = Some(last);
    }

    recompute_resource_flags(&mut state);
    state
}
