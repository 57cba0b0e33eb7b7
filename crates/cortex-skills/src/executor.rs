//! In-memory simulated [`SkillExecutor`] (§10.6), backing the three
//! built-in skills without any physical hardware. `NavigateToPose`
//! completes after a simulated travel time derived from straight-line
//! distance from the robot's current pose; `StopBase` and `Speak`
//! complete immediately.

use async_trait::async_trait;
use chrono::Utc;
use cortex_middleware::{SkillExecutor, SkillExecutorError};
use cortex_types::{Pose, SkillResult, SkillStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const TRAVEL_SPEED_UNITS_PER_SECOND: f64 = 1.0;

struct SimGoal {
    skill_name: String,
    dispatched_at: chrono::DateTime<Utc>,
    travel_seconds: f64,
    cancelled: bool,
}

/// Shared between clones so the orchestrator and any HTTP handler can poll
/// the same in-flight goal set.
pub struct SimSkillExecutor {
    current_pose: Arc<RwLock<Pose>>,
    goals: RwLock<HashMap<String, SimGoal>>,
}

impl SimSkillExecutor {
    pub fn new(current_pose: Arc<RwLock<Pose>>) -> Self {
        Self { current_pose, goals: RwLock::new(HashMap::new()) }
    }

    async fn travel_seconds_for(&self, params: &Value) -> f64 {
        let target_x = params.get("target_x").and_then(Value::as_f64).unwrap_or(0.0);
        let target_y = params.get("target_y").and_then(Value::as_f64).unwrap_or(0.0);
        let pose = *self.current_pose.read().await;
        let distance = ((target_x - pose.x).powi(2) + (target_y - pose.y).powi(2)).sqrt();
        distance / TRAVEL_SPEED_UNITS_PER_SECOND
    }
}

#[async_trait]
impl SkillExecutor for SimSkillExecutor {
    async fn dispatch(&self, skill_name: &str, params: &Value) -> Result<String, SkillExecutorError> {
        let goal_id = format!("goal_{}", Uuid::new_v4().simple());
        let travel_seconds = match skill_name {
            "NavigateToPose" => self.travel_seconds_for(params).await,
            "StopBase" | "Speak" => 0.0,
            other => return Err(SkillExecutorError::Rejected(format!("unknown simulated skill: {other}"))),
        };
        debug!(skill_name, %goal_id, travel_seconds, "dispatching simulated goal");
        self.goals.write().await.insert(
            goal_id.clone(),
            SimGoal { skill_name: skill_name.to_string(), dispatched_at: Utc::now(), travel_seconds, cancelled: false },
        );
        Ok(goal_id)
    }

    async fn cancel(&self, goal_id: &str) -> bool {
        let mut goals = self.goals.write().await;
        match goals.get_mut(goal_id) {
            Some(goal) => {
                goal.cancelled = true;
                true
            }
            None => false,
        }
    }

    async fn feedback(&self, goal_id: &str) -> Option<Value> {
        let goals = self.goals.read().await;
        let goal = goals.get(goal_id)?;
        let elapsed = (Utc::now() - goal.dispatched_at).num_milliseconds() as f64 / 1000.0;
        let remaining = (goal.travel_seconds - elapsed).max(0.0);
        Some(serde_json::json!({ "elapsed_seconds": elapsed, "remaining_seconds": remaining }))
    }

    async fn result(&self, goal_id: &str) -> Option<SkillResult> {
        let mut goals = self.goals.write().await;
        let goal = goals.get(goal_id)?;
        if goal.cancelled {
            let skill_name = goal.skill_name.clone();
            goals.remove(goal_id);
            return Some(SkillResult {
                skill_name,
                status: SkillStatus::Cancelled,
                error_code: Some("CANCELLED".to_string()),
                error_msg: Some("cancelled by user".to_string()),
                output: None,
            });
        }
        let elapsed = (Utc::now() - goal.dispatched_at).num_milliseconds() as f64 / 1000.0;
        if elapsed < goal.travel_seconds {
            return None;
        }
        let skill_name = goal.skill_name.clone();
        goals.remove(goal_id);
        Some(SkillResult { skill_name, status: SkillStatus::Succeeded, error_code: None, error_msg: None, output: None })
    }

    async fn is_done(&self, goal_id: &str) -> bool {
        let goals = self.goals.read().await;
        match goals.get(goal_id) {
            Some(goal) if goal.cancelled => true,
            Some(goal) => {
                let elapsed = (Utc::now() - goal.dispatched_at).num_milliseconds() as f64 / 1000.0;
                elapsed >= goal.travel_seconds
            }
            None => true,
        }
    }
}
