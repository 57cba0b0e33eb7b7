//! The fixed zone table (§4.9): symbolic zone names resolve to coordinates.
//! Shared between K3's collision-risk annotation (which needs the active
//! task's target point) and R3's op compilation (which needs it to expand
//! navigation params).

pub const ZONES: &[(&str, (f64, f64))] = &[
    ("kitchen", (2.0, 2.0)),
    ("living_room", (10.0, 5.0)),
    ("bedroom", (2.0, 7.0)),
    ("bathroom", (7.0, 12.0)),
    ("charging_station", (-1.0, 1.0)),
];

/// `home` is excluded: it resolves to the robot's home-pose, not a fixed
/// coordinate, and is handled by the caller.
pub fn zone_center(name: &str) -> Option<(f64, f64)> {
    ZONES.iter().find(|(n, _)| *n == name).map(|(_, xy)| *xy)
}

/// Extracts the zone name from a `navigate_to:<zone>` goal string.
pub fn navigate_goal_target(goal: &str) -> Option<&str> {
    goal.strip_prefix("navigate_to:").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_zone_resolves() {
        assert_eq!(zone_center("kitchen"), Some((2.0, 2.0)));
    }

    #[test]
    fn unknown_zone_is_none() {
        assert_eq!(zone_center("garage"), None);
        assert_eq!(zone_center("home"), None);
    }

    #[test]
    fn navigate_goal_target_strips_prefix() {
        assert_eq!(navigate_goal_target("navigate_to:kitchen"), Some("kitchen"));
        assert_eq!(navigate_goal_target("speak:hello"), None);
    }
}
