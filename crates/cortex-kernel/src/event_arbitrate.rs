//! K4 Event Arbitrate — deterministic mode selection by fixed priority
//! (§4.4). This ordering is a hard contract: safety strictly dominates
//! battery which strictly dominates user-interrupt.

use cortex_types::{BrainState, InterruptClass, Mode};

const BATTERY_CRITICAL: f64 = 10.0;
const BATTERY_LOW: f64 = 20.0;

fn arbitrate(state: &BrainState) -> (Mode, bool, String) {
    if state.world.obstacles.iter().any(|o| o.collision_risk) {
        return (Mode::Safe, true, "SAFETY: collision_risk".to_string());
    }
    if state.robot.battery_pct < BATTERY_CRITICAL {
        return (
            Mode::Safe,
            true,
            format!("SAFETY: battery_critical_{:.1}", state.robot.battery_pct),
        );
    }
    if state.robot.battery_pct < BATTERY_LOW {
        return (
            Mode::Charge,
            true,
            format!("BATTERY: low_battery_{:.1}", state.robot.battery_pct),
        );
    }

    let has_running = !state.skills.running.is_empty();
    match state.hci.interrupt_class {
        InterruptClass::Stop => return (Mode::Idle, true, "USER: stop command".to_string()),
        InterruptClass::Pause => return (Mode::Idle, false, "USER: pause command".to_string()),
        InterruptClass::NewGoal => {
            return (Mode::Exec, has_running, "USER: new goal".to_string());
        }
        InterruptClass::None => {}
    }

    if !state.hci.utterance.trim().is_empty() {
        return (Mode::Exec, has_running, "USER: utterance present (llm_handle)".to_string());
    }

    if state.tasks.active_task_id.is_some() || !state.tasks.queue.is_empty() {
        return (Mode::Exec, false, "TASK: active task exists".to_string());
    }

    (Mode::Idle, false, "IDLE: no active task".to_string())
}

pub fn run(mut state: BrainState) -> BrainState {
    let (mode, preempt, reason) = arbitrate(&state);
    state.tasks.mode = mode;
    state.tasks.preempt_flag = preempt;
    state.tasks.preempt_reason = reason.clone();
    state
        .trace
        .push(format!("[K4 Event Arbitrate] mode={mode:?} preempt={preempt} reason={reason}"));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_types::{Obstacle, RunningSkill};
    use uuid::Uuid;

    fn base_state() -> BrainState {
        BrainState::new(Uuid::new_v4())
    }

    #[test]
    fn collision_risk_dominates_everything() {
        let mut s = base_state();
        s.world.obstacles.push(Obstacle { x: 0.0, y: 0.0, w: 1.0, h: 1.0, collision_risk: true });
        s.robot.battery_pct = 5.0;
        s.hci.interrupt_class = InterruptClass::Stop;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Safe);
        assert!(s.tasks.preempt_flag);
    }

    #[test]
    fn critical_battery_without_obstacle_is_safe() {
        let mut s = base_state();
        s.robot.battery_pct = 9.0;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Safe);
    }

    #[test]
    fn low_battery_dominates_stop_interrupt() {
        let mut s = base_state();
        s.robot.battery_pct = 15.0;
        s.hci.interrupt_class = InterruptClass::Stop;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Charge);
        assert!(s.tasks.preempt_flag);
    }

    #[test]
    fn stop_interrupt_goes_idle_with_preempt() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        s.hci.interrupt_class = InterruptClass::Stop;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Idle);
        assert!(s.tasks.preempt_flag);
    }

    #[test]
    fn pause_interrupt_goes_idle_without_preempt() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        s.hci.interrupt_class = InterruptClass::Pause;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Idle);
        assert!(!s.tasks.preempt_flag);
    }

    #[test]
    fn new_goal_preempts_only_when_skill_running() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        s.hci.interrupt_class = InterruptClass::NewGoal;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Exec);
        assert!(!s.tasks.preempt_flag);

        let mut s2 = base_state();
        s2.robot.battery_pct = 100.0;
        s2.hci.interrupt_class = InterruptClass::NewGoal;
        s2.skills.running.push(RunningSkill {
            goal_id: "g1".into(),
            skill_name: "NavigateToPose".into(),
            start_time: chrono::Utc::now(),
            timeout_seconds: 30.0,
            resources_occupied: vec!["base".into()],
            params: serde_json::json!({}),
        });
        let s2 = run(s2);
        assert!(s2.tasks.preempt_flag);
    }

    #[test]
    fn bare_utterance_hands_to_model_as_exec() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        s.hci.utterance = "what's the weather".into();
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Exec);
    }

    #[test]
    fn active_task_without_interrupt_keeps_exec_no_preempt() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        s.tasks.active_task_id = Some(Uuid::new_v4());
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Exec);
        assert!(!s.tasks.preempt_flag);
    }

    #[test]
    fn nothing_going_on_is_idle() {
        let mut s = base_state();
        s.robot.battery_pct = 100.0;
        let s = run(s);
        assert_eq!(s.tasks.mode, Mode::Idle);
        assert!(!s.tasks.preempt_flag);
    }
}
