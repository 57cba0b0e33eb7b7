//! Simulated [`TelemetrySource`] (§6, §10.6) — a simple kinematic model
//! that steps the robot's pose toward whatever target the background
//! simulation loop last set, so the workspace runs end to end without
//! physical hardware.

use async_trait::async_trait;
use cortex_middleware::TelemetrySource;
use cortex_types::{Pose, Twist};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const STEP_SPEED_UNITS_PER_SECOND: f64 = 1.0;

struct SimTelemetryState {
    pose: Pose,
    twist: Twist,
    battery_pct: f64,
    resources: HashMap<String, bool>,
    target: Option<(f64, f64)>,
    last_step: std::time::Instant,
}

impl Default for SimTelemetryState {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            twist: Twist::default(),
            battery_pct: 100.0,
            resources: HashMap::new(),
            target: None,
            last_step: std::time::Instant::now(),
        }
    }
}

/// Shared with the background simulation loop (`cortex-runtime`), which
/// calls [`SimTelemetry::step`] at ~10 Hz and [`SimTelemetry::set_target`]
/// when a new active task is selected.
pub struct SimTelemetry {
    state: Arc<RwLock<SimTelemetryState>>,
    pose_mirror: Arc<RwLock<Pose>>,
}

impl SimTelemetry {
    /// `pose_mirror` is shared with [`crate::executor::SimSkillExecutor`] so
    /// travel-time estimates use the same simulated pose.
    pub fn new(pose_mirror: Arc<RwLock<Pose>>) -> Self {
        Self { state: Arc::new(RwLock::new(SimTelemetryState::default())), pose_mirror }
    }

    pub fn set_target(&self, target: Option<(f64, f64)>) {
        if let Ok(mut state) = self.state.try_write() {
            state.target = target;
        }
    }

    /// Advances the simulated pose toward `target`, draining battery as it
    /// moves. Called by the ~10 Hz background loop, not by the Kernel
    /// directly.
    pub async fn step(&self) {
        let mut state = self.state.write().await;
        let now = std::time::Instant::now();
        let dt = (now - state.last_step).as_secs_f64();
        state.last_step = now;

        if let Some((tx, ty)) = state.target {
            let dx = tx - state.pose.x;
            let dy = ty - state.pose.y;
            let distance = (dx * dx + dy * dy).sqrt();
            let step = STEP_SPEED_UNITS_PER_SECOND * dt;
            if distance > step {
                state.pose.x += dx / distance * step;
                state.pose.y += dy / distance * step;
                state.twist = Twist { linear_x: STEP_SPEED_UNITS_PER_SECOND, linear_y: 0.0, angular_z: 0.0 };
            } else {
                state.pose.x = tx;
                state.pose.y = ty;
                state.twist = Twist::default();
            }
        }
        state.battery_pct = (state.battery_pct - dt * 0.01).max(0.0);
        *self.pose_mirror.write().await = state.pose;
    }

    pub fn set_resource(&self, resource: &str, busy: bool) {
        if let Ok(mut state) = self.state.try_write() {
            state.resources.insert(resource.to_string(), busy);
        }
    }
}

#[async_trait]
impl TelemetrySource for SimTelemetry {
    async fn pose(&self) -> Option<Pose> {
        Some(self.state.read().await.pose)
    }

    async fn twist(&self) -> Option<Twist> {
        Some(self.state.read().await.twist)
    }

    async fn battery_pct(&self) -> Option<f64> {
        Some(self.state.read().await.battery_pct)
    }

    async fn resources(&self) -> Option<HashMap<String, bool>> {
        Some(self.state.read().await.resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn step_moves_pose_toward_target() {
        let telemetry = SimTelemetry::new(Arc::new(RwLock::new(Pose::default())));
        telemetry.set_target(Some((10.0, 0.0)));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        telemetry.step().await;
        let pose = telemetry.pose().await.unwrap();
        assert!(pose.x > 0.0);
    }

    #[tokio::test]
    async fn reaching_target_clears_twist() {
        let telemetry = SimTelemetry::new(Arc::new(RwLock::new(Pose::default())));
        telemetry.set_target(Some((0.0001, 0.0)));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        telemetry.step().await;
        let twist = telemetry.twist().await.unwrap();
        assert_eq!(twist, Twist::default());
    }

    #[tokio::test]
    async fn battery_drains_over_time() {
        let telemetry = SimTelemetry::new(Arc::new(RwLock::new(Pose::default())));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        telemetry.step().await;
        assert!(telemetry.battery_pct().await.unwrap() < 100.0);
    }

    #[tokio::test]
    async fn resources_default_empty() {
        let telemetry = SimTelemetry::new(Arc::new(RwLock::new(Pose::default())));
        assert!(telemetry.resources().await.unwrap().is_empty());
    }
}
