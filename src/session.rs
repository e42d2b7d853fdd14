//! One guided run: sensor subscriptions, the guidance engine and the status
//! snapshot, driven by a single-threaded event loop.
//!
//! Every delivery is handled to completion before the next one is taken, so
//! the engine sees positions strictly in delivery order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use crate::announcement::Announcer;
use crate::config::Config;
use crate::error::Result;
use crate::live_status::{current_timestamp, GuidanceStatus};
use crate::navigation::{GuidanceEvent, NavigationEngine};
use crate::sensors::{
    HeadingSource, LocationService, OrientationReading, OrientationService, Permission,
    PositionFix, PositionSource, SensorHealth,
};
use crate::types::{RouteData, TurnPoint};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// A guidance event and when it happened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    /// Number of position deliveries received up to and including the trigger
    pub fix: u64,
    pub elapsed_secs: f64,
    pub event: GuidanceEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: String,
    pub duration_secs: f64,
    pub fixes_received: u64,
    /// Deliveries that changed the position and ran a guidance cycle
    pub fixes_processed: u64,
    /// Duplicates and errors that left the position unchanged
    pub fixes_ignored: u64,
    pub headings_received: u64,
    pub heading_permission: Permission,
    pub events: Vec<TimedEvent>,
    pub status: GuidanceStatus,
}

impl SessionReport {
    /// Texts of every announcement in the order they were made
    pub fn announcements(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match &e.event {
                GuidanceEvent::Announced { text, .. } => Some(text.as_str()),
                GuidanceEvent::OffRoute { .. } => Some(crate::navigation::OFF_ROUTE_MESSAGE),
                _ => None,
            })
            .collect()
    }
}

pub struct NavigationSession<L, O, A>
where
    L: LocationService,
    O: OrientationService,
    A: Announcer,
{
    session_id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    position: PositionSource<L>,
    heading: HeadingSource<O>,
    engine: NavigationEngine<A>,
    route: RouteData,
    gps_health: SensorHealth,
    status: GuidanceStatus,
    status_path: Option<PathBuf>,
    status_write_failed: bool,
    fixes_received: u64,
    fixes_processed: u64,
    fixes_ignored: u64,
    headings_received: u64,
    events: Vec<TimedEvent>,
}

impl<L, O, A> NavigationSession<L, O, A>
where
    L: LocationService,
    O: OrientationService,
    A: Announcer,
{
    /// Without `route`, the chords between the turn points stand in for it
    pub fn new(
        config: &Config,
        turn_points: Vec<TurnPoint>,
        route: Option<RouteData>,
        location: L,
        orientation: O,
        announcer: A,
    ) -> Result<Self> {
        config.guidance.validate()?;
        let route = route.unwrap_or_else(|| {
            RouteData::from_points(turn_points.iter().map(|t| t.position).collect())
        });
        let started_at = Utc::now();
        let status = GuidanceStatus::new(turn_points.len(), route.total_distance_m);

        Ok(NavigationSession {
            session_id: format!("nav_{}", started_at.timestamp_millis()),
            started_at,
            started: Instant::now(),
            position: PositionSource::new(location, &config.position),
            heading: HeadingSource::new(orientation),
            engine: NavigationEngine::new(turn_points, config.guidance.clone(), announcer),
            route,
            gps_health: SensorHealth::new("GPS", config.position.silence_threshold_secs),
            status,
            status_path: config.status.path.clone(),
            status_write_failed: false,
            fixes_received: 0,
            fixes_processed: 0,
            fixes_ignored: 0,
            headings_received: 0,
            events: Vec::new(),
        })
    }

    /// Run until `shutdown` resolves or the position stream ends, then release
    /// both sensor subscriptions.
    pub async fn run<F>(mut self, shutdown: F) -> SessionReport
    where
        F: Future<Output = ()>,
    {
        log::info!(
            "Session {} started: {} turn points, route {:.0} m",
            self.session_id,
            self.engine.turn_points().len(),
            self.route.total_distance_m
        );
        self.started = Instant::now();
        self.gps_health.update();

        self.heading.request_permission().await;
        let mut headings = self.heading.start();
        let mut positions = self.position.start();
        let mut health_check = interval(HEALTH_CHECK_INTERVAL);
        health_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.publish();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
                fix = positions.recv() => match fix {
                    Some(fix) => self.handle_position(fix),
                    None => {
                        log::info!("Position stream ended");
                        break;
                    }
                },
                reading = next_reading(&mut headings) => match reading {
                    Some(reading) => self.handle_heading(reading),
                    None => {
                        log::debug!("Orientation stream ended");
                        headings = None;
                    }
                },
                _ = health_check.tick() => self.check_health(),
            }
        }

        self.finish()
    }

    fn handle_position(&mut self, fix: PositionFix) {
        self.fixes_received += 1;
        if fix.is_ok() {
            self.gps_health.update();
        }

        let Some(position) = self.position.accept(fix) else {
            self.fixes_ignored += 1;
            return;
        };
        self.fixes_processed += 1;
        let events = self.engine.update(Some(position));
        self.record(events);
        self.publish();
    }

    fn handle_heading(&mut self, reading: OrientationReading) {
        if self.heading.accept(reading).is_some() {
            self.headings_received += 1;
            self.publish();
        }
    }

    fn check_health(&mut self) {
        let was_healthy = self.status.gps_healthy;
        self.gps_health.check();
        if was_healthy == self.gps_health.is_silent() {
            self.publish();
        }
    }

    fn record(&mut self, events: Vec<GuidanceEvent>) {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        for event in events {
            match &event {
                GuidanceEvent::Announced { .. } => self.status.announcements += 1,
                GuidanceEvent::OffRoute { .. } => {
                    self.status.announcements += 1;
                    self.status.off_route_alerts += 1;
                }
                GuidanceEvent::TurnPassed { .. } | GuidanceEvent::Completed => {}
            }
            self.events.push(TimedEvent {
                fix: self.fixes_received,
                elapsed_secs,
                event,
            });
        }
    }

    fn refresh_status(&mut self) {
        let state = self.engine.state();
        self.status.timestamp = current_timestamp();
        self.status.position = self.position.latest();
        self.status.heading_deg = self.heading.heading();
        self.status.marker_rotation_deg = self.marker_rotation();
        self.status.phase = self.engine.phase();
        self.status.next_turn_index = state.next_turn_index();
        self.status.is_approaching = state.is_approaching();
        self.status.upcoming_turns = state.upcoming_turns().to_vec();
        self.status.distance_to_next_m = state.target_distance();
        self.status.remaining_distance_m = self.engine.remaining_distance();
        self.status.gps_fixes = self.fixes_received;
        self.status.gps_healthy = !self.gps_health.is_silent();
        self.status.gps_silence_duration_secs =
            self.gps_health.time_since_last_update().as_secs_f64();
    }

    fn publish(&mut self) {
        self.refresh_status();
        let Some(path) = &self.status_path else {
            return;
        };
        match self.status.save(path) {
            Ok(()) => self.status_write_failed = false,
            Err(e) => {
                if !self.status_write_failed {
                    log::warn!("Failed to write status {}: {}", path.display(), e);
                }
                self.status_write_failed = true;
            }
        }
    }

    fn finish(mut self) -> SessionReport {
        self.position.stop();
        self.heading.stop();
        self.publish();

        let duration_secs = self.started.elapsed().as_secs_f64();
        log::info!(
            "Session {} stopped after {:.1}s: {} fixes, {} announcements, phase {:?}",
            self.session_id,
            duration_secs,
            self.fixes_received,
            self.status.announcements,
            self.status.phase
        );

        SessionReport {
            session_id: self.session_id,
            started_at: self.started_at.to_rfc3339(),
            duration_secs,
            fixes_received: self.fixes_received,
            fixes_processed: self.fixes_processed,
            fixes_ignored: self.fixes_ignored,
            headings_received: self.headings_received,
            heading_permission: self.heading.permission(),
            events: self.events,
            status: self.status,
        }
    }

    /// Rotation for the position marker: latest heading, 0° without one
    pub fn marker_rotation(&self) -> f64 {
        self.heading.heading().unwrap_or(0.0)
    }

    pub fn engine(&self) -> &NavigationEngine<A> {
        &self.engine
    }

    pub fn route(&self) -> &RouteData {
        &self.route
    }

    pub fn status(&self) -> &GuidanceStatus {
        &self.status
    }
}

/// Next orientation reading; pending forever once the stream is gone
async fn next_reading(
    headings: &mut Option<UnboundedReceiver<OrientationReading>>,
) -> Option<OrientationReading> {
    match headings {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::RecordingAnnouncer;
    use crate::error::{LocationError, LocationErrorCode};
    use crate::navigation::NavigationPhase;
    use crate::sensors::heading::tests::FakeOrientationService;
    use crate::sensors::position::tests::FakeLocationService;
    use crate::sensors::{ReplayLocationService, ReplayOrientationService};
    use crate::types::{Coordinate, TurnDirection};

    fn three_point_route() -> Vec<TurnPoint> {
        vec![
            TurnPoint::new(43.0, 141.0, TurnDirection::Straight),
            TurnPoint::new(43.001, 141.0, TurnDirection::Left),
            TurnPoint::new(43.002, 141.0, TurnDirection::Straight),
        ]
    }

    fn north_of(lat: f64, lng: f64, meters: f64) -> Coordinate {
        Coordinate::new(lat + meters / 111_194.9, lng)
    }

    fn walk_through_route() -> Vec<(f64, PositionFix)> {
        let track = [
            north_of(43.0, 141.0, 0.0),
            north_of(43.0, 141.0, 0.0),
            north_of(43.0, 141.0, 40.0),
            north_of(43.001, 141.0, -20.0),
            north_of(43.001, 141.0, 35.0),
            north_of(43.002, 141.0, -10.0),
            north_of(43.002, 141.0, 40.0),
        ];
        let mut fixes = vec![(
            0.0,
            Err(LocationError::new(LocationErrorCode::Timeout, "no fix yet")),
        )];
        fixes.extend(
            track
                .iter()
                .enumerate()
                .map(|(i, p)| ((i + 1) as f64, Ok(*p))),
        );
        fixes
    }

    fn session<L: LocationService, O: OrientationService>(
        config: &Config,
        location: L,
        orientation: O,
    ) -> NavigationSession<L, O, RecordingAnnouncer> {
        NavigationSession::new(
            config,
            three_point_route(),
            None,
            location,
            orientation,
            RecordingAnnouncer::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_replayed_walk_completes_route() {
        let config = Config::default();
        let session = session(
            &config,
            ReplayLocationService::new(walk_through_route(), 0.0),
            ReplayOrientationService::new(Vec::new(), 0.0),
        );
        let report = session.run(std::future::pending()).await;

        assert_eq!(report.fixes_received, 8);
        assert_eq!(report.fixes_processed, 7);
        assert_eq!(report.fixes_ignored, 1);
        assert_eq!(
            report.announcements(),
            ["In approximately 110 meters, turn left.", "Turn left."]
        );
        let kinds: Vec<_> = report.events.iter().map(|e| e.event.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                GuidanceEvent::Announced {
                    index: 0,
                    text: "In approximately 110 meters, turn left.".to_string(),
                },
                GuidanceEvent::TurnPassed { index: 0 },
                GuidanceEvent::Announced {
                    index: 1,
                    text: "Turn left.".to_string(),
                },
                GuidanceEvent::TurnPassed { index: 1 },
                GuidanceEvent::TurnPassed { index: 2 },
                GuidanceEvent::Completed,
            ]
        );
        assert_eq!(report.status.phase, NavigationPhase::Completed);
        assert_eq!(report.status.announcements, 2);
        assert!(report.status.upcoming_turns.is_empty());
    }

    #[tokio::test]
    async fn test_error_first_uses_fallback_position() {
        let config = Config::default();
        let fixes = vec![(
            0.0,
            Err(LocationError::new(LocationErrorCode::PermissionDenied, "denied")),
        )];
        let session = session(
            &config,
            ReplayLocationService::new(fixes, 0.0),
            ReplayOrientationService::new(Vec::new(), 0.0),
        );
        let report = session.run(std::future::pending()).await;

        assert_eq!(report.status.position, config.position.fallback);
        assert_eq!(report.status.phase, NavigationPhase::Navigating(0));
        assert!(report.events.is_empty());
        // Fallback is ~29 km away from the first turn
        assert!(report.status.upcoming_turns[0].distance.unwrap() > 20_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_drives_marker_rotation() {
        let config = Config::default();
        let mut location = FakeLocationService::new(None, Vec::new());
        location.keep_open = true;
        let readings = vec![
            (
                0.0,
                OrientationReading {
                    compass_heading: Some(90.0),
                    alpha: None,
                },
            ),
            (
                1.0,
                OrientationReading {
                    compass_heading: None,
                    alpha: Some(-45.0),
                },
            ),
        ];
        let session = session(&config, location, ReplayOrientationService::new(readings, 1.0));
        assert_eq!(session.marker_rotation(), 0.0);

        let report = session.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(report.headings_received, 2);
        assert_eq!(report.heading_permission, Permission::Granted);
        assert_eq!(report.status.heading_deg, Some(315.0));
        assert_eq!(report.status.marker_rotation_deg, 315.0);
    }

    #[tokio::test]
    async fn test_denied_heading_keeps_marker_at_zero() {
        let config = Config::default();
        let orientation = FakeOrientationService::new(true, false, Vec::new());
        let orientation_log = orientation.log.clone();
        let fixes = vec![(0.0, Ok(Coordinate::new(43.0, 141.0)))];
        let session = session(&config, ReplayLocationService::new(fixes, 0.0), orientation);
        let report = session.run(std::future::pending()).await;

        assert_eq!(report.heading_permission, Permission::Denied);
        assert_eq!(report.status.marker_rotation_deg, 0.0);
        assert_eq!(orientation_log.lock().unwrap().permission_requests, 1);
        assert!(orientation_log.lock().unwrap().subscribed.is_empty());
        // Navigation itself is unaffected
        assert_eq!(report.status.phase, NavigationPhase::Approaching(0));
    }

    #[tokio::test]
    async fn test_teardown_releases_both_subscriptions() {
        let config = Config::default();
        let location = FakeLocationService::new(Some(Ok(Coordinate::new(43.0, 141.0))), Vec::new());
        let location_log = location.log.clone();
        let orientation = FakeOrientationService::new(false, true, Vec::new());
        let orientation_log = orientation.log.clone();

        let report = session(&config, location, orientation)
            .run(std::future::pending())
            .await;
        assert_eq!(report.fixes_processed, 1);

        let location_log = location_log.lock().unwrap();
        assert_eq!(location_log.watches.len(), 1);
        assert_eq!(location_log.watches, location_log.cleared);
        let orientation_log = orientation_log.lock().unwrap();
        assert_eq!(orientation_log.subscribed.len(), 1);
        assert_eq!(orientation_log.subscribed, orientation_log.unsubscribed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_gps_is_reported() {
        let config = Config::default();
        let mut location = FakeLocationService::new(None, Vec::new());
        location.keep_open = true;
        let session = session(&config, location, ReplayOrientationService::new(Vec::new(), 0.0));

        let report = session.run(tokio::time::sleep(Duration::from_secs(45))).await;
        assert!(!report.status.gps_healthy);
        assert!(report.status.gps_silence_duration_secs >= 30.0);
        assert_eq!(report.fixes_received, 0);
    }

    #[tokio::test]
    async fn test_status_file_follows_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut config = Config::default();
        config.status.path = Some(path.clone());

        let session = session(
            &config,
            ReplayLocationService::new(walk_through_route(), 0.0),
            ReplayOrientationService::new(Vec::new(), 0.0),
        );
        session.run(std::future::pending()).await;

        let status = GuidanceStatus::load(&path).unwrap();
        assert_eq!(status.phase, NavigationPhase::Completed);
        assert_eq!(status.next_turn_index, 3);
        assert_eq!(status.turn_count, 3);
        assert!((status.total_distance_m - 222.4).abs() < 0.5);
    }

    #[test]
    fn test_invalid_guidance_config_is_rejected() {
        let mut config = Config::default();
        config.guidance.preview_count = 0;
        let result = NavigationSession::new(
            &config,
            three_point_route(),
            None,
            FakeLocationService::new(None, Vec::new()),
            FakeOrientationService::new(false, true, Vec::new()),
            RecordingAnnouncer::new(),
        );
        assert!(result.is_err());
    }
}
