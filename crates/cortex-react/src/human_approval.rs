//! R5 Human Approval — a two-call state machine (§4.11). On entry with
//! `need_approval=true` and no response, suspends the orchestrator by
//! stamping `stop_reason=waiting_for_approval`. Once revived with a
//! response present, applies APPROVE/EDIT/REJECT and consumes the response.

use cortex_types::{BrainState, ProposedOps};
use serde_json::{json, Value};

fn merge_params(base: &Value, edits: &Value) -> Value {
    let mut merged = base.clone();
    if let (Value::Object(m), Value::Object(e)) = (&mut merged, edits) {
        for (k, v) in e {
            m.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn apply_edits(mut ops: ProposedOps, response: &Value) -> ProposedOps {
    if let Some(edited_params) = response.get("edited_params").and_then(|v| v.get("params")) {
        for dispatch in &mut ops.to_dispatch {
            dispatch.params = merge_params(&dispatch.params, edited_params);
        }
    }
    ops.need_approval = false;
    ops.approval_payload = None;
    ops
}

fn handle_response(mut state: BrainState, response: Value) -> BrainState {
    let action = response.get("action").and_then(Value::as_str).unwrap_or("REJECT").to_string();
    let ops = state.react.proposed_ops.clone().unwrap_or_default();

    let (new_ops, stop_reason) = match action.as_str() {
        "APPROVE" => (ops, String::new()),
        "EDIT" => (apply_edits(ops, &response), String::new()),
        _ => (
            ProposedOps {
                to_cancel: ops.to_cancel,
                to_dispatch: Vec::new(),
                to_speak: vec!["Operation rejected by user".to_string()],
                need_approval: false,
                approval_payload: None,
            },
            "user_rejected".to_string(),
        ),
    };

    state.trace.push(format!("[R5 Human Approval] action={action}"));
    state.react.proposed_ops = Some(new_ops);
    state.react.stop_reason = if stop_reason.is_empty() { None } else { Some(stop_reason) };
    state.hci.interrupt_payload = json!({});
    state.hci.approval_response = None;
    state
}

fn trigger_interrupt(mut state: BrainState) -> BrainState {
    let payload = state.react.proposed_ops.as_ref().and_then(|o| o.approval_payload.clone());
    state.hci.interrupt_payload = json!({ "type": "approval_required", "payload": payload });
    state.react.stop_reason = Some("waiting_for_approval".to_string());
    state.trace.push("[R5 Human Approval] suspended, waiting for approval".to_string());
    state
}

pub fn run(state: BrainState) -> BrainState {
    let Some(ops) = state.react.proposed_ops.clone() else { return state };
    if !ops.need_approval {
        return state;
    }
    match state.hci.approval_response.clone() {
        Some(response) => handle_response(state, response),
        None => trigger_interrupt(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::CompiledDispatch;
    use uuid::Uuid;

    fn state_needing_approval() -> BrainState {
        let mut s = BrainState::new(Uuid::new_v4());
        s.react.proposed_ops = Some(ProposedOps {
            to_dispatch: vec![CompiledDispatch { skill: "dock".into(), params: json!({ "speed": 1.0 }) }],
            need_approval: true,
            approval_payload: Some(json!({ "reason": "risky" })),
            ..Default::default()
        });
        s
    }

    #[test]
    fn no_approval_needed_passes_through() {
        let s = BrainState::new(Uuid::new_v4());
        let result = run(s);
        assert!(result.react.stop_reason.is_none());
    }

    #[test]
    fn first_entry_suspends_and_stamps_stop_reason() {
        let s = run(state_needing_approval());
        assert_eq!(s.react.stop_reason.as_deref(), Some("waiting_for_approval"));
        assert_eq!(s.hci.interrupt_payload["type"], "approval_required");
    }

    #[test]
    fn approve_clears_stop_reason_and_keeps_dispatch() {
        let mut s = state_needing_approval();
        s.hci.approval_response = Some(json!({ "action": "APPROVE" }));
        let s = run(s);
        assert!(s.react.stop_reason.is_none());
        assert_eq!(s.react.proposed_ops.unwrap().to_dispatch.len(), 1);
        assert!(s.hci.approval_response.is_none());
    }

    #[test]
    fn edit_merges_params_and_clears_need_approval() {
        let mut s = state_needing_approval();
        s.hci.approval_response = Some(json!({ "action": "EDIT", "edited_params": { "params": { "speed": 0.2 } } }));
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert_eq!(ops.to_dispatch[0].params["speed"], 0.2);
        assert!(!ops.need_approval);
    }

    #[test]
    fn reject_empties_dispatches_and_sets_stop_reason() {
        let mut s = state_needing_approval();
        s.hci.approval_response = Some(json!({ "action": "REJECT" }));
        let s = run(s);
        let ops = s.react.proposed_ops.unwrap();
        assert!(ops.to_dispatch.is_empty());
        assert_eq!(s.react.stop_reason.as_deref(), Some("user_rejected"));
    }
}
