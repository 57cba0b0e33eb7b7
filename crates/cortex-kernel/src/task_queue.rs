//! K5 Task Queue — the sole structural writer of `tasks.queue` (§4.5, §9).
//! Three sub-responsibilities, strictly ordered: completion detection,
//! NEW_GOAL folding, inbox drain.

use cortex_types::{BrainState, InterruptClass, Mode, Task, TaskStatus};
use serde_json::Value;

const HIGH_PRIORITY: i32 = 80;
const PRIORITY_STEP: i32 = 5;
const DEFAULT_INBOX_PRIORITY: i32 = 50;

fn detect_completion(state: &mut BrainState) {
    let Some(active_id) = state.tasks.active_task_id else { return };
    if state.robot.distance_to_target >= 0.5 {
        return;
    }
    if let Some(task) = state.tasks.queue.iter_mut().find(|t| t.id == active_id && t.status == TaskStatus::Running) {
        task.status = TaskStatus::Completed;
        state.tasks.active_task_id = None;
    }
}

fn tasks_from_new_goal(state: &BrainState) -> Option<Vec<Task>> {
    let payload = &state.hci.interrupt_payload;

    if let Some(list) = payload.get("tasks").and_then(Value::as_array) {
        let mut tasks = Vec::new();
        for (i, entry) in list.iter().enumerate() {
            if entry.get("type").and_then(Value::as_str) != Some("navigate") {
                continue;
            }
            let Some(target) = entry.get("target").and_then(Value::as_str) else { continue };
            let priority = HIGH_PRIORITY - (i as i32) * PRIORITY_STEP;
            let metadata = serde_json::json!({
                "source": "user_interrupt",
                "original_utterance": payload.get("original").cloned().unwrap_or(Value::Null),
                "target": target,
                "sequence": i,
            });
            tasks.push(Task::new(format!("navigate_to:{target}"), priority, metadata));
        }
        if !tasks.is_empty() {
            return Some(tasks);
        }
    }

    let target = payload.get("target").and_then(Value::as_str)?;
    let metadata = serde_json::json!({
        "source": "user_interrupt",
        "original_utterance": payload.get("original").cloned().unwrap_or(Value::Null),
        "target": target,
    });
    Some(vec![Task::new(format!("navigate_to:{target}"), HIGH_PRIORITY, metadata)])
}

fn fold_new_goal(state: &mut BrainState) {
    if state.hci.interrupt_class != InterruptClass::NewGoal {
        return;
    }
    if let Some(tasks) = tasks_from_new_goal(state) {
        state.tasks.queue = tasks;
        state.tasks.inbox.clear();
        state.tasks.active_task_id = None;
    }
}

fn task_from_inbox_entry(entry: &Value) -> Option<Task> {
    let goal = entry.get("goal").and_then(Value::as_str)?.to_string();
    let priority = entry.get("priority").and_then(Value::as_i64).map(|p| p as i32).unwrap_or(DEFAULT_INBOX_PRIORITY);
    let metadata = entry.get("metadata").cloned().unwrap_or(serde_json::json!({}));
    let mut task = Task::new(goal, priority, metadata);
    task.required_resources = entry
        .get("resources_required")
        .and_then(Value::as_array)
        .map(|resources| resources.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    if let Some(preemptible) = entry.get("preemptible").and_then(Value::as_bool) {
        task.preemptible = preemptible;
    }
    Some(task)
}

fn drain_inbox(state: &mut BrainState) {
    let inbox = std::mem::take(&mut state.tasks.inbox);
    for entry in &inbox {
        if let Some(task) = task_from_inbox_entry(entry) {
            state.tasks.queue.push(task);
        }
    }
}

fn select_active_task(state: &mut BrainState) {
    state.tasks.queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    if state.tasks.active_task_id.is_none() {
        if let Some(task) = state.tasks.queue.iter_mut().find(|t| t.status == TaskStatus::Pending) {
            task.status = TaskStatus::Running;
            state.tasks.active_task_id = Some(task.id);
        }
    }
}

pub fn run(mut state: BrainState) -> BrainState {
    detect_completion(&mut state);
    fold_new_goal(&mut state);
    drain_inbox(&mut state);
    select_active_task(&mut state);

    if state.tasks.active_task_id.is_some() && state.tasks.mode == Mode::Idle {
        state.tasks.mode = Mode::Exec;
    }

    state.trace.push(format!(
        "[K5 Task Queue] queue_len={} active={:?}",
        state.tasks.queue.len(),
        state.tasks.active_task_id
    ));
    state
}
