use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::navigation::NavigationPhase;
use crate::types::{Coordinate, UpcomingTurn};

/// Snapshot of everything the presentation layer renders
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GuidanceStatus {
    pub timestamp: f64,
    pub position: Option<Coordinate>,
    pub heading_deg: Option<f64>,
    /// Rotation of the position marker; 0 without heading
    pub marker_rotation_deg: f64,
    pub phase: NavigationPhase,
    pub next_turn_index: usize,
    pub turn_count: usize,
    pub is_approaching: bool,
    pub upcoming_turns: Vec<UpcomingTurn>,
    pub distance_to_next_m: Option<f64>,
    pub remaining_distance_m: Option<f64>,
    pub total_distance_m: f64,
    pub announcements: u64,
    pub off_route_alerts: u64,
    // Position stream
    pub gps_fixes: u64,
    pub gps_healthy: bool,
    pub gps_silence_duration_secs: f64,
}

impl GuidanceStatus {
    pub fn new(turn_count: usize, total_distance_m: f64) -> Self {
        Self {
            timestamp: current_timestamp(),
            position: None,
            heading_deg: None,
            marker_rotation_deg: 0.0,
            phase: if turn_count == 0 {
                NavigationPhase::Completed
            } else {
                NavigationPhase::Navigating(0)
            },
            next_turn_index: 0,
            turn_count,
            is_approaching: false,
            upcoming_turns: Vec::new(),
            distance_to_next_m: None,
            remaining_distance_m: None,
            total_distance_m,
            announcements: 0,
            off_route_alerts: 0,
            gps_fixes: 0,
            gps_healthy: true,
            gps_silence_duration_secs: 0.0,
        }
    }

    /// Write as pretty JSON through a sibling temp file, so readers never see a partial file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TurnDirection, TurnPoint};

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let mut status = GuidanceStatus::new(3, 222.4);
        status.position = Some(Coordinate::new(43.0, 141.0));
        status.upcoming_turns.push(UpcomingTurn {
            turn_point: TurnPoint::new(43.001, 141.0, TurnDirection::Left),
            index: 1,
            distance: Some(111.2),
        });
        status.save(&path).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let reloaded = GuidanceStatus::load(&path).unwrap();
        assert_eq!(reloaded.position, status.position);
        assert_eq!(reloaded.upcoming_turns, status.upcoming_turns);
        assert_eq!(reloaded.phase, NavigationPhase::Navigating(0));
        assert_eq!(reloaded.turn_count, 3);
    }

    #[test]
    fn test_empty_route_starts_completed() {
        assert_eq!(GuidanceStatus::new(0, 0.0).phase, NavigationPhase::Completed);
        assert_eq!(
            GuidanceStatus::new(2, 10.0).phase,
            NavigationPhase::Navigating(0)
        );
    }
}
