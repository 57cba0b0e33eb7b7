//! K3 World Update — refreshes zones and annotates obstacles with
//! collision-risk (§4.3). The segment-to-box distance is an explicit
//! approximation: sample t∈{0,0.25,0.5,0.75,1} on the robot→target segment
//! and take the minimum point-to-box distance.

use cortex_middleware::WorldSource;
use cortex_types::{zone_center, navigate_goal_target, BrainState, Obstacle};

const RISK_THRESHOLD: f64 = 0.6;
const SAMPLE_TS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

fn point_to_aabb_dist(px: f64, py: f64, cx: f64, cy: f64, w: f64, h: f64) -> f64 {
    let (hx, hy) = (w / 2.0, h / 2.0);
    let nx = clamp(px, cx - hx, cx + hx);
    let ny = clamp(py, cy - hy, cy + hy);
    ((px - nx).powi(2) + (py - ny).powi(2)).sqrt()
}

fn segment_to_aabb_dist(x1: f64, y1: f64, x2: f64, y2: f64, cx: f64, cy: f64, w: f64, h: f64) -> f64 {
    SAMPLE_TS
        .iter()
        .map(|t| {
            let px = x1 + (x2 - x1) * t;
            let py = y1 + (y2 - y1) * t;
            point_to_aabb_dist(px, py, cx, cy, w, h)
        })
        .fold(f64::INFINITY, f64::min)
}

fn active_target(state: &BrainState) -> Option<(f64, f64)> {
    let id = state.tasks.active_task_id?;
    let task = state.tasks.queue.iter().find(|t| t.id == id)?;
    navigate_goal_target(&task.goal).and_then(zone_center)
}

pub async fn run(mut state: BrainState, source: &dyn WorldSource) -> BrainState {
    state.world.zones = source.zones().await;

    let raw_obstacles = source.obstacles().await;
    let target = active_target(&state);
    let (rx, ry) = (state.robot.pose.x, state.robot.pose.y);

    let obstacles: Vec<Obstacle> = if raw_obstacles.is_empty() {
        state.world.obstacles.clone()
    } else {
        raw_obstacles
            .into_iter()
            .map(|(x, y, w, h)| {
                let mut risk = point_to_aabb_dist(rx, ry, x, y, w, h) < RISK_THRESHOLD;
                if !risk {
                    if let Some((tx, ty)) = target {
                        risk = segment_to_aabb_dist(rx, ry, tx, ty, x, y, w, h) < RISK_THRESHOLD;
                    }
                }
                Obstacle { x, y, w, h, collision_risk: risk }
            })
            .collect()
    };

    let risk_count = obstacles.iter().filter(|o| o.collision_risk).count();
    state.world.summary = format!(
        "zones={} obstacles={} risk={}",
        state.world.zones.len(),
        obstacles.len(),
        risk_count
    );
    state.world.obstacles = obstacles;

    state
        .trace
        .push(format!("[K3 World Update] zones={} risk_count={}", state.world.zones.len(), risk_count));
    state
}
