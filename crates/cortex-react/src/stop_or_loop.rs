//! R8 Stop-or-Loop — the inner loop's exit gate (§4.14). Six ordered
//! conditions decide whether to exit the ReAct loop and why, or continue
//! iterating.

use cortex_types::{BrainState, DecisionType, Mode};

const MAX_ITERATIONS: u32 = 20;
const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Scans the trace backward over R7 Observe Result entries, counting
/// consecutive failures until a success (or cancellation) marker is hit.
fn consecutive_failure_count(state: &BrainState) -> usize {
    let mut count = 0;
    for line in state.trace.lines.iter().rev() {
        if !line.starts_with("[R7 Observe Result]") {
            continue;
        }
        if line.contains("Failed") || line.contains("Timeout") {
            count += 1;
        } else {
            break;
        }
    }
    count
}

fn decision_exit_reason(state: &BrainState) -> Option<&'static str> {
    match state.react.decision.as_ref().map(|d| d.decision_type) {
        Some(DecisionType::Finish) => Some("task_completed"),
        Some(DecisionType::Abort) => Some("task_aborted"),
        Some(DecisionType::AskHuman) => Some("need_human_intervention"),
        _ => None,
    }
}

pub fn run(mut state: BrainState) -> BrainState {
    let reason = decision_exit_reason(&state)
        .map(str::to_string)
        .or_else(|| match state.react.stop_reason.as_deref() {
            Some("waiting_for_approval") => Some("waiting_for_approval".to_string()),
            Some("user_rejected") => Some("user_rejected".to_string()),
            _ => None,
        })
        .or_else(|| {
            if state.react.iter >= MAX_ITERATIONS {
                Some(format!("max_iterations_reached_{MAX_ITERATIONS}"))
            } else {
                None
            }
        })
        .or_else(|| {
            let failures = consecutive_failure_count(&state);
            if failures >= MAX_CONSECUTIVE_FAILURES {
                Some(format!("consecutive_failures_{failures}"))
            } else {
                None
            }
        })
        .or_else(|| match state.tasks.mode {
            Mode::Safe | Mode::Charge => Some(format!("mode_changed_to_{:?}", state.tasks.mode)),
            _ => None,
        });

    match &reason {
        Some(r) => {
            state.react.stop_reason = Some(r.clone());
            state.trace.metrics.insert("loop_decision".to_string(), serde_json::json!("STOP"));
            state.trace.push(format!("[R8 Stop-or-Loop] stop: {r}"));
        }
        None => {
            state.react.stop_reason = None;
            state.trace.metrics.insert("loop_decision".to_string(), serde_json::json!("CONTINUE"));
            state.trace.push("[R8 Stop-or-Loop] continue".to_string());
        }
    }

    state
}

pub fn should_continue(state: &BrainState) -> bool {
    state.react.stop_reason.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::Decision;
    use uuid::Uuid;

    fn state_with_decision(decision_type: DecisionType) -> BrainState {
        let mut s = BrainState::new(Uuid::new_v4());
        s.react.decision = Some(Decision { decision_type, reason: "x".into(), plan_patch: None, ops: vec![], new_tasks: None });
        s
    }

    #[test]
    fn finish_decision_stops_with_task_completed() {
        let s = run(state_with_decision(DecisionType::Finish));
        assert_eq!(s.react.stop_reason.as_deref(), Some("task_completed"));
        assert!(!should_continue(&s));
    }

    #[test]
    fn abort_decision_stops_with_task_aborted() {
        let s = run(state_with_decision(DecisionType::Abort));
        assert_eq!(s.react.stop_reason.as_deref(), Some("task_aborted"));
    }

    #[test]
    fn ask_human_stops_with_need_human_intervention() {
        let s = run(state_with_decision(DecisionType::AskHuman));
        assert_eq!(s.react.stop_reason.as_deref(), Some("need_human_intervention"));
    }

    #[test]
    fn existing_waiting_for_approval_is_preserved() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.react.stop_reason = Some("waiting_for_approval".to_string());
        let s = run(s);
        assert_eq!(s.react.stop_reason.as_deref(), Some("waiting_for_approval"));
    }

    #[test]
    fn max_iterations_reached_stops() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.react.iter = 20;
        let s = run(s);
        assert_eq!(s.react.stop_reason.as_deref(), Some("max_iterations_reached_20"));
    }

    #[test]
    fn three_consecutive_failures_stop_the_loop() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Failed".to_string());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Failed".to_string());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Failed".to_string());
        let s = run(s);
        assert_eq!(s.react.stop_reason.as_deref(), Some("consecutive_failures_3"));
    }

    #[test]
    fn success_marker_resets_failure_count() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Failed".to_string());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Failed".to_string());
        s.trace.push("[R7 Observe Result] NavigateToPose -> Succeeded".to_string());
        let s = run(s);
        assert!(should_continue(&s));
    }

    #[test]
    fn safe_mode_stops_the_loop() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.tasks.mode = Mode::Safe;
        let s = run(s);
        assert_eq!(s.react.stop_reason.as_deref(), Some("mode_changed_to_Safe"));
    }

    #[test]
    fn otherwise_continues() {
        let s = run(BrainState::new(Uuid::new_v4()));
        assert!(should_continue(&s));
        assert_eq!(s.trace.metrics["loop_decision"], serde_json::json!("CONTINUE"));
    }
}
