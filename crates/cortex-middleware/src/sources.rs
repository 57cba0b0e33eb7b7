//! Telemetry and world source traits consumed by K2/K3 (§6).
//!
//! Every getter returns `None` when the field is unavailable so that K2/K3
//! can preserve prior state rather than clobbering it with a default.

use async_trait::async_trait;
use cortex_types::{Pose, Twist};

/// Robot pose/twist/battery/resource telemetry, as consumed by K2 Telemetry
/// Sync.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn pose(&self) -> Option<Pose>;
    async fn twist(&self) -> Option<Twist>;
    async fn battery_pct(&self) -> Option<f64>;
    /// Busy flags keyed by resource name (`base`, `arm`, `gripper`, …).
    async fn resources(&self) -> Option<std::collections::HashMap<String, bool>>;
}

/// Zone/obstacle world data, as consumed by K3 World Update.
#[async_trait]
pub trait WorldSource: Send + Sync {
    async fn zones(&self) -> Vec<String>;
    /// Raw obstacles, not yet annotated with collision-risk — K3 computes
    /// that itself from robot pose and active-task target.
    async fn obstacles(&self) -> Vec<(f64, f64, f64, f64)>;
    async fn zone_accessible(&self, zone: &str) -> bool;
}
