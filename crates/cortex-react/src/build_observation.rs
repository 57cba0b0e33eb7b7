//! R1 Build Observation — compresses world/robot/task/skill state into a
//! structured, model-readable view (§4.7). Also appends a formatted
//! observation message to the message window.

use cortex_types::{BrainState, ChatMessage};
use serde_json::json;

fn queue_preview(state: &BrainState) -> Vec<serde_json::Value> {
    state
        .tasks
        .queue
        .iter()
        .map(|t| {
            json!({
                "task_id": t.id,
                "goal": t.goal,
                "status": t.status,
                "sequence": t.metadata.get("sequence"),
            })
        })
        .collect()
}

fn build_observation(state: &BrainState, iter: u32) -> serde_json::Value {
    let active_task = state
        .tasks
        .active_task_id
        .and_then(|id| state.tasks.queue.iter().find(|t| t.id == id));

    let risk_count = state.world.obstacles.iter().filter(|o| o.collision_risk).count();

    json!({
        "iteration": iter,
        "world": {
            "summary": state.world.summary,
            "zones": state.world.zones,
            "obstacle_count": state.world.obstacles.len(),
            "obstacles_risk_count": risk_count,
        },
        "robot": {
            "position": { "x": round2(state.robot.pose.x), "y": round2(state.robot.pose.y) },
            "home_pose": { "x": round2(state.robot.home_pose.x), "y": round2(state.robot.home_pose.y) },
            "battery_pct": (state.robot.battery_pct * 10.0).round() / 10.0,
            "battery_state": state.robot.battery_state,
            "distance_to_target": round2(state.robot.distance_to_target),
            "resources": state.robot.resources,
        },
        "task": {
            "active_task_id": state.tasks.active_task_id,
            "goal": active_task.map(|t| t.goal.clone()),
            "queue_length": state.tasks.queue.len(),
            "queue_preview": queue_preview(state),
            "mode": state.tasks.mode,
        },
        "skills": {
            "running_count": state.skills.running.len(),
            "running": state.skills.running.iter().map(|s| json!({
                "skill_name": s.skill_name,
                "goal_id": s.goal_id,
            })).collect::<Vec<_>>(),
            "last_result": state.skills.last_result.as_ref().map(|r| json!({
                "status": r.status,
                "error_code": r.error_code,
                "error_msg": r.error_msg,
            })),
        },
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn format_message(observation: &serde_json::Value) -> String {
    let mut lines = vec![format!("[Observation - Iteration {}]", observation["iteration"])];
    lines.push(format!("World: {}", observation["world"]["summary"].as_str().unwrap_or("")));

    let robot = &observation["robot"];
    lines.push(format!(
        "Robot: pos=({}, {}), battery={}%, distance_to_target={}m",
        robot["position"]["x"], robot["position"]["y"], robot["battery_pct"], robot["distance_to_target"]
    ));

    let task = &observation["task"];
    if task["active_task_id"].is_null() {
        lines.push(format!("Task: None (mode={})", task["mode"]));
    } else {
        lines.push(format!("Task: {} (mode={})", task["goal"], task["mode"]));
    }

    let skills = &observation["skills"];
    if let Some(running) = skills["running"].as_array() {
        if !running.is_empty() {
            let names: Vec<&str> = running.iter().filter_map(|s| s["skill_name"].as_str()).collect();
            lines.push(format!("Running skills: {}", names.join(", ")));
        }
    }
    if let Some(result) = skills["last_result"].as_object() {
        lines.push(format!("Last result: {}", result["status"]));
        if let Some(code) = result.get("error_code").and_then(|v| v.as_str()) {
            lines.push(format!("  Error: {} - {}", code, result.get("error_msg").and_then(|v| v.as_str()).unwrap_or("")));
        }
    }

    lines.join("\n")
}

pub fn run(mut state: BrainState) -> BrainState {
    let iter = state.react.iter + 1;
    let observation = build_observation(&state, iter);
    let message = format_message(&observation);

    state.react.iter = iter;
    state.react.observation = Some(observation);
    state.messages.messages.push(ChatMessage::new("system", message));
    state.trace.push(format!("[R1 Build Observation] iter={iter}"));
    state
}
