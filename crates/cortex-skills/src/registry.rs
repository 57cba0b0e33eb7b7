//! The default skill registry (§10.6) — the three built-in skills the
//! bundled simulated executor backs.

use cortex_types::{InterfaceKind, SkillDef};
use serde_json::json;
use std::collections::HashMap;

/// `NavigateToPose`, `StopBase`, `Speak`, pre-registered the way the
/// original brain's registry seeds itself on construction.
pub fn default_registry() -> HashMap<String, SkillDef> {
    let mut registry = HashMap::new();
    for skill in [navigate_to_pose(), stop_base(), speak()] {
        registry.insert(skill.name.clone(), skill);
    }
    registry
}

fn navigate_to_pose() -> SkillDef {
    SkillDef {
        name: "NavigateToPose".to_string(),
        interface_kind: InterfaceKind::Action,
        args_schema: json!({
            "required": ["target_x", "target_y"],
            "properties": {
                "target_x": { "type": "number" },
                "target_y": { "type": "number" },
                "target_theta": { "type": "number", "default": 0 },
            }
        }),
        resources_required: vec!["base".to_string()],
        preemptible: true,
        cancel_supported: true,
        timeout_seconds: 300.0,
        error_map: HashMap::from([
            ("GOAL_REJECTED".to_string(), "REPLAN".to_string()),
            ("TIMEOUT".to_string(), "RETRY".to_string()),
            ("BLOCKED".to_string(), "REPLAN".to_string()),
            ("UNKNOWN".to_string(), "ASK_HUMAN".to_string()),
        ]),
        description: "Navigate the base to a target pose".to_string(),
    }
}

fn stop_base() -> SkillDef {
    SkillDef {
        name: "StopBase".to_string(),
        interface_kind: InterfaceKind::Service,
        args_schema: json!({}),
        resources_required: vec!["base".to_string()],
        preemptible: false,
        cancel_supported: false,
        timeout_seconds: 5.0,
        error_map: HashMap::new(),
        description: "Emergency-stop the chassis".to_string(),
    }
}

fn speak() -> SkillDef {
    SkillDef {
        name: "Speak".to_string(),
        interface_kind: InterfaceKind::Internal,
        args_schema: json!({ "required": ["message"], "properties": { "message": { "type": "string" } } }),
        resources_required: vec![],
        preemptible: true,
        cancel_supported: true,
        timeout_seconds: 30.0,
        error_map: HashMap::new(),
        description: "Speak a notification to the user".to_string(),
    }
}
