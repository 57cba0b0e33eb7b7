//! K6 Kernel Route — pure mapping mode → routing target (§4.6). Writes the
//! target into `trace.metrics["route_target"]` for the orchestrator.

use cortex_types::{BrainState, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    SafeHandler,
    ChargeHandler,
    ReactLoop,
    IdleWait,
}

impl RouteTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTarget::SafeHandler => "safe_handler",
            RouteTarget::ChargeHandler => "charge_handler",
            RouteTarget::ReactLoop => "react_loop",
            RouteTarget::IdleWait => "idle_wait",
        }
    }
}

pub fn route_for(mode: Mode) -> RouteTarget {
    match mode {
        Mode::Safe => RouteTarget::SafeHandler,
        Mode::Charge => RouteTarget::ChargeHandler,
        Mode::Exec => RouteTarget::ReactLoop,
        Mode::Idle => RouteTarget::IdleWait,
    }
}

pub fn run(mut state: BrainState) -> BrainState {
    let target = route_for(state.tasks.mode);
    state
        .trace
        .metrics
        .insert("route_target".to_string(), serde_json::Value::String(target.as_str().to_string()));
    state
        .trace
        .push(format!("[K6 Kernel Route] mode={:?} -> {}", state.tasks.mode, target.as_str()));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn exec_routes_to_react_loop() {
        let mut s = BrainState::new(Uuid::new_v4());
        s.tasks.mode = Mode::Exec;
        let s = run(s);
        assert_eq!(s.trace.metrics["route_target"], "react_loop");
    }

    #[test]
    fn safe_routes_to_safe_handler() {
        assert_eq!(route_for(Mode::Safe), RouteTarget::SafeHandler);
    }

    #[test]
    fn charge_routes_to_charge_handler() {
        assert_eq!(route_for(Mode::Charge), RouteTarget::ChargeHandler);
    }

    #[test]
    fn idle_routes_to_idle_wait() {
        assert_eq!(route_for(Mode::Idle), RouteTarget::IdleWait);
    }
}
