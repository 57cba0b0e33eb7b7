//! Simulated [`WorldSource`] (§6, §10.6) — a small in-memory obstacle
//! list, mutable via the HTTP surface, plus the fixed zone table.

use async_trait::async_trait;
use cortex_middleware::WorldSource;
use cortex_types::ZONES;
use tokio::sync::RwLock;

pub struct SimWorld {
    obstacles: RwLock<Vec<(f64, f64, f64, f64)>>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self { obstacles: RwLock::new(Vec::new()) }
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_obstacle(&self, x: f64, y: f64, w: f64, h: f64) {
        self.obstacles.write().await.push((x, y, w, h));
    }

    pub async fn clear_obstacles(&self) {
        self.obstacles.write().await.clear();
    }
}

#[async_trait]
impl WorldSource for SimWorld {
    async fn zones(&self) -> Vec<String> {
        ZONES.iter().map(|(name, _)| name.to_string()).collect()
    }

    async fn obstacles(&self) -> Vec<(f64, f64, f64, f64)> {
        self.obstacles.read().await.clone()
    }

    async fn zone_accessible(&self, zone: &str) -> bool {
        ZONES.iter().any(|(name, _)| *name == zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zones_returns_the_fixed_table() {
        let world = SimWorld::new();
        let zones = world.zones().await;
        assert!(zones.contains(&"kitchen".to_string()));
    }

    #[tokio::test]
    async fn added_obstacle_is_reported() {
        let world = SimWorld::new();
        world.add_obstacle(1.0, 1.0, 0.5, 0.5).await;
        assert_eq!(world.obstacles().await.len(), 1);
    }

    #[tokio::test]
    async fn cleared_obstacles_are_empty() {
        let world = SimWorld::new();
        world.add_obstacle(1.0, 1.0, 0.5, 0.5).await;
        world.clear_obstacles().await;
        assert!(world.obstacles().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_zone_is_inaccessible() {
        let world = SimWorld::new();
        assert!(!world.zone_accessible("attic").await);
    }
}
