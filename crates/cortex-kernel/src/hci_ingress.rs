//! K1 HCI Ingress — fast, rule-based classification of the current utterance.
//!
//! Deliberately dumb: anything not matching a fixed keyword set or the
//! simple go-to pattern is handed to the model as NEW_GOAL with only
//! `original` set, per §4.1.

use serde_json::json;

use cortex_types::{BrainState, InterruptClass};

const STOP_KEYWORDS: &[&str] = &["stop", "halt", "emergency", "cancel"];
const PAUSE_KEYWORDS: &[&str] = &["pause", "wait", "hold"];
const NAV_VERBS: &[&str] = &[
    "go", "navigate", "drive", "head", "return", "move", "去", "到", "回", "导航", "前往",
];

/// `^go to (\w+)$` / `^navigate to (\w+)$`, case-insensitive, whole-string,
/// plus the CJK single-word forms `^去(\w+)$` / `^到(\w+)$`.
fn match_simple_goal(text: &str) -> Option<String> {
    for prefix in ["go to ", "navigate to "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            let rest = rest.trim();
            if !rest.is_empty() && rest.split_whitespace().count() == 1 {
                return Some(rest.to_string());
            }
        }
    }
    for prefix in ['去', '到'] {
        if let Some(rest) = text.strip_prefix(prefix) {
            if !rest.is_empty() && !rest.chars().any(char::is_whitespace) {
                return Some(rest.to_string());
            }
        }
    }
    None
}

fn parse_intent(utterance: &str) -> (InterruptClass, serde_json::Value) {
    let trimmed = utterance.trim();
    if trimmed.is_empty() {
        return (InterruptClass::None, json!({}));
    }
    let text = trimmed.to_lowercase();

    if STOP_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return (InterruptClass::Stop, json!({ "original": utterance }));
    }
    if PAUSE_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return (InterruptClass::Pause, json!({ "original": utterance }));
    }
    if let Some(target) = match_simple_goal(&text) {
        return (
            InterruptClass::NewGoal,
            json!({ "original": utterance, "target": target }),
        );
    }
    if NAV_VERBS.iter().any(|verb| text.contains(verb)) {
        return (InterruptClass::NewGoal, json!({ "original": utterance }));
    }
    (InterruptClass::None, json!({ "original": utterance }))
}

pub fn run(mut state: BrainState) -> BrainState {
    let (class, payload) = parse_intent(&state.hci.utterance);
    state.hci.interrupt_class = class;
    state.hci.interrupt_payload = payload;
    state
        .trace
        .push(format!("[K1 HCI Ingress] class={class:?}"));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state_with(utterance: &str) -> BrainState {
        let mut s = BrainState::new(Uuid::new_v4());
        s.hci.utterance = utterance.to_string();
        s
    }

    #[test]
    fn empty_utterance_is_none() {
        let s = run(state_with(""));
        assert_eq!(s.hci.interrupt_class, InterruptClass::None);
    }

    #[test]
    fn whitespace_only_is_none() {
        let s = run(state_with("   "));
        assert_eq!(s.hci.interrupt_class, InterruptClass::None);
    }

    #[test]
    fn stop_keyword_is_detected_case_insensitively() {
        let s = run(state_with("please STOP now"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::Stop);
    }

    #[test]
    fn pause_keyword_is_detected() {
        let s = run(state_with("pause for a sec"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::Pause);
    }

    #[test]
    fn stop_takes_priority_over_pause_when_both_present() {
        let s = run(state_with("pause then stop"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::Stop);
    }

    #[test]
    fn simple_go_to_pattern_extracts_target() {
        let s = run(state_with("go to kitchen"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert_eq!(s.hci.interrupt_payload["target"], "kitchen");
    }

    #[test]
    fn simple_navigate_to_pattern_extracts_target() {
        let s = run(state_with("navigate to bedroom"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert_eq!(s.hci.interrupt_payload["target"], "bedroom");
    }

    #[test]
    fn multi_word_target_does_not_match_simple_pattern() {
        let s = run(state_with("go to the kitchen then the bedroom"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert!(s.hci.interrupt_payload.get("target").is_none());
    }

    #[test]
    fn other_nav_verb_text_is_new_goal_without_target() {
        let s = run(state_with("head back home please"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert!(s.hci.interrupt_payload.get("target").is_none());
    }

    #[test]
    fn cjk_simple_goal_pattern_extracts_target() {
        let s = run(state_with("去厨房"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert_eq!(s.hci.interrupt_payload["target"], "厨房");

        let s = run(state_with("到卧室"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert_eq!(s.hci.interrupt_payload["target"], "卧室");
    }

    #[test]
    fn cjk_nav_verb_without_simple_pattern_is_new_goal() {
        let s = run(state_with("请导航回充电站"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::NewGoal);
        assert!(s.hci.interrupt_payload.get("target").is_none());
    }

    #[test]
    fn chitchat_without_nav_verbs_is_none() {
        let s = run(state_with("how are you today"));
        assert_eq!(s.hci.interrupt_class, InterruptClass::None);
        assert_eq!(s.hci.interrupt_payload["original"], "how are you today");
    }

    #[test]
    fn logs_the_classification() {
        let s = run(state_with("stop"));
        assert!(s.trace.lines.iter().any(|l| l.contains("K1")));
    }
}
