//! K2 Telemetry Sync — pulls pose/twist/battery/resources from an injected
//! telemetry source. Values missing from the source preserve prior state
//! (§4.2). Pure with respect to `BrainState`: the only side effect is the
//! (already-isolated) read from `source`.

use cortex_middleware::TelemetrySource;
use cortex_types::{BatteryState, BrainState};

pub async fn run(mut state: BrainState, source: &dyn TelemetrySource) -> BrainState {
    if let Some(pose) = source.pose().await {
        state.robot.pose = pose;
    }
    if let Some(twist) = source.twist().await {
        state.robot.twist = twist;
    }
    if let Some(pct) = source.battery_pct().await {
        state.robot.battery_pct = pct;
        state.robot.battery_state = battery_state_for(pct, state.robot.battery_state);
    }
    if let Some(resources) = source.resources().await {
        for (k, v) in resources {
            state.robot.resources.insert(k, v);
        }
    }

    state.robot.distance_to_target = distance_to_active_target(&state).unwrap_or(state.robot.distance_to_target);

    state.trace.push(format!(
        "[K2 Telemetry Sync] pose=({:.2},{:.2}) battery={:.1}% dist={:.2}",
        state.robot.pose.x, state.robot.pose.y, state.robot.battery_pct, state.robot.distance_to_target
    ));
    state
}

fn battery_state_for(pct: f64, charging_hint: BatteryState) -> BatteryState {
    if charging_hint == BatteryState::Charging {
        return BatteryState::Charging;
    }
    if pct < 10.0 {
        BatteryState::Critical
    } else if pct < 20.0 {
        BatteryState::Low
    } else if pct >= 99.0 {
        BatteryState::Full
    } else {
        BatteryState::Discharging
    }
}

fn distance_to_active_target(state: &BrainState) -> Option<f64> {
    let active_id = state.tasks.active_task_id?;
    let task = state.tasks.queue.iter().find(|t| t.id == active_id)?;
    let target = task.metadata.get("target_pose")?;
    let x = target.get("x")?.as_f64()?;
    let y = target.get("y")?.as_f64()?;
    Some(state.robot.pose.distance_to(&cortex_types::Pose::at(x, y)))
}
