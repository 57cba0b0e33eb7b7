//! R2 Decide — sends the observation, bounded message window, and skill
//! registry summary to an injected language-model client, parses the
//! response into a [`Decision`], and applies replan gating (§4.8).

use cortex_middleware::{ChatMessage as LmChatMessage, LmClient, Role};
use cortex_types::{BrainState, ChatMessage, Decision, DecisionType, Mode};
use serde_json::Value;

const MESSAGE_WINDOW: usize = 10;

pub const SYSTEM_PROMPT: &str = "\
You are a household service robot's task scheduler. Given the current \
observation, decide what to do next.

Decision types:
- CONTINUE: keep executing the current plan
- REPLAN: the current plan is no longer viable, restructure the task queue
- RETRY: retry the current operation after a transient failure
- SWITCH_TASK: move to a different queued task
- ASK_HUMAN: request human intervention
- FINISH: the active task is complete
- ABORT: abandon the active task

Respond with JSON only:
{\"type\": \"CONTINUE|REPLAN|RETRY|SWITCH_TASK|ASK_HUMAN|FINISH|ABORT\", \
\"reason\": \"...\", \"plan_patch\": null, \"ops\": [{\"skill\": \"...\", \"params\": {}}], \
\"new_tasks\": null}";

fn format_skill_registry(state: &BrainState) -> String {
    if state.skills.registry.is_empty() {
        return "Available skills: None".to_string();
    }
    let mut lines = vec!["Available skills:".to_string()];
    for (name, skill) in &state.skills.registry {
        let desc = if skill.description.is_empty() { "No description" } else { &skill.description };
        lines.push(format!("- {name}: {desc}"));
    }
    lines.join("\n")
}

fn window(state: &BrainState) -> Vec<LmChatMessage> {
    let start = state.messages.messages.len().saturating_sub(MESSAGE_WINDOW);
    state.messages.messages[start..]
        .iter()
        .map(|m| LmChatMessage { role: role_for(&m.role), content: m.content.clone() })
        .collect()
}

fn role_for(role: &str) -> Role {
    match role {
        "assistant" => Role::Assistant,
        "user" => Role::User,
        _ => Role::System,
    }
}

/// Tolerates code-fence wrappers (```json ... ```) and a bare `{...}` object
/// embedded within surrounding prose.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Some(v);
    }
    let stripped = text.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```");
    if let Ok(v) = serde_json::from_str::<Value>(stripped.trim()) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end]).ok()
}

fn parse_decision(response: &str) -> Decision {
    let Some(value) = extract_json(response) else {
        return Decision::continue_with(format!("failed to parse model response: {}", truncate(response)));
    };
    match serde_json::from_value::<Decision>(value) {
        Ok(decision) => decision,
        Err(e) => Decision::continue_with(format!("failed to parse model response: {e}")),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(100).collect()
}

fn replan_allowed(state: &BrainState) -> bool {
    !state.hci.utterance.trim().is_empty()
        || state.hci.interrupt_class != cortex_types::InterruptClass::None
        || matches!(state.tasks.mode, Mode::Safe | Mode::Charge)
        || state.world.obstacles.iter().any(|o| o.collision_risk)
}

fn apply_replan_gate(mut decision: Decision, state: &BrainState) -> Decision {
    let is_structural = matches!(decision.decision_type, DecisionType::Replan | DecisionType::Retry | DecisionType::SwitchTask);
    if is_structural && decision.new_tasks.is_some() && !replan_allowed(state) {
        decision.decision_type = DecisionType::Continue;
        decision.new_tasks = None;
    }
    decision
}

pub async fn run(mut state: BrainState, client: &dyn LmClient) -> BrainState {
    let messages = window(&state);
    let system_prompt = format!("{}\n\n{}", SYSTEM_PROMPT, format_skill_registry(&state));

    let response = match client.generate(&messages, &system_prompt).await {
        Ok(r) => r,
        Err(e) => serde_json::json!({ "type": "CONTINUE", "reason": format!("lm error: {e}") }).to_string(),
    };

    let decision = apply_replan_gate(parse_decision(&response), &state);
    state.hci.utterance.clear();

    state.messages.messages.push(ChatMessage::new("assistant", response));
    state
        .trace
        .push(format!("[R2 Decide] decision={:?} reason={}", decision.decision_type, decision.reason));
    state.react.decision = Some(decision);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_middleware::LmError;
    use uuid::Uuid;

    struct FixedClient(String);

    #[async_trait]
    impl LmClient for FixedClient {
        async fn generate(&self, _messages: &[LmChatMessage], _system_prompt: &str) -> Result<String, LmError> {
            Ok(self.0.clone())
        }
        async fn generate_stream(&self, _messages: &[LmChatMessage], _system_prompt: &str) -> Result<Vec<String>, LmError> {
            Ok(vec![self.0.clone()])
        }
    }

    #[tokio::test]
    async fn parses_plain_json_response() {
        let client = FixedClient(r#"{"type":"CONTINUE","reason":"ok","ops":[]}"#.to_string());
        let state = run(BrainState::new(Uuid::new_v4()), &client).await;
        assert_eq!(state.react.decision.unwrap().decision_type, DecisionType::Continue);
    }

    #[tokio::test]
    async fn parses_code_fenced_json() {
        let client = FixedClient("```json\n{\"type\":\"FINISH\",\"reason\":\"done\"}\n```".to_string());
        let state = run(BrainState::new(Uuid::new_v4()), &client).await;
        assert_eq!(state.react.decision.unwrap().decision_type, DecisionType::Finish);
    }

    #[tokio::test]
    async fn parses_json_embedded_in_prose() {
        let client = FixedClient("Sure, here's my decision: {\"type\":\"ABORT\",\"reason\":\"bad\"} hope that helps".to_string());
        let state = run(BrainState::new(Uuid::new_v4()), &client).await;
        assert_eq!(state.react.decision.unwrap().decision_type, DecisionType::Abort);
    }

    #[tokio::test]
    async fn unparseable_response_becomes_continue() {
        let client = FixedClient("not json at all".to_string());
        let state = run(BrainState::new(Uuid::new_v4()), &client).await;
        let decision = state.react.decision.unwrap();
        assert_eq!(decision.decision_type, DecisionType::Continue);
        assert!(decision.reason.contains("failed to parse"));
    }

    #[tokio::test]
    async fn replan_with_new_tasks_demoted_to_continue_when_ungated() {
        let client = FixedClient(r#"{"type":"REPLAN","reason":"better plan","new_tasks":{"tasks":[]}}"#.to_string());
        let state = run(BrainState::new(Uuid::new_v4()), &client).await;
        let decision = state.react.decision.unwrap();
        assert_eq!(decision.decision_type, DecisionType::Continue);
        assert!(decision.new_tasks.is_none());
    }

    #[tokio::test]
    async fn replan_honored_when_utterance_present() {
        let client = FixedClient(r#"{"type":"REPLAN","reason":"better plan","new_tasks":{"tasks":[]}}"#.to_string());
        let mut state = BrainState::new(Uuid::new_v4());
        state.hci.utterance = "go somewhere else".to_string();
        let state = run(state, &client).await;
        let decision = state.react.decision.unwrap();
        assert_eq!(decision.decision_type, DecisionType::Replan);
        assert!(decision.new_tasks.is_some());
    }

    #[tokio::test]
    async fn utterance_is_blanked_after_use() {
        let client = FixedClient(r#"{"type":"CONTINUE","reason":"ok"}"#.to_string());
        let mut state = BrainState::new(Uuid::new_v4());
        state.hci.utterance = "go to kitchen".to_string();
        let state = run(state, &client).await;
        assert!(state.hci.utterance.is_empty());
    }

    #[tokio::test]
    async fn replan_honored_in_safe_mode() {
        let client = FixedClient(r#"{"type":"RETRY","reason":"obstacle","new_tasks":{"tasks":[]}}"#.to_string());
        let mut state = BrainState::new(Uuid::new_v4());
        state.tasks.mode = Mode::Safe;
        let state = run(state, &client).await;
        assert_eq!(state.react.decision.unwrap().decision_type, DecisionType::Retry);
    }
}
