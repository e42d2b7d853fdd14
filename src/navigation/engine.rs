use serde::{Deserialize, Serialize};

use crate::announcement::Announcer;
use crate::config::GuidanceConfig;
use crate::distance::chord_length;
use crate::navigation::phrasing::{approach_message, OFF_ROUTE_MESSAGE};
use crate::types::{Coordinate, TurnPoint, UpcomingTurn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum NavigationPhase {
    Navigating(usize),
    Approaching(usize),
    Completed,
}

/// Something a guidance cycle did, in the order it happened
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GuidanceEvent {
    Announced { index: usize, text: String },
    OffRoute { index: usize, distance_m: f64, min_distance_m: f64 },
    TurnPassed { index: usize },
    Completed,
}

/// Bookkeeping owned by exactly one target index.
///
/// Replaced as a whole when the index moves, so the minimum distance and the
/// off-route flag can never outlive their target.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TargetTracker {
    index: usize,
    min_distance: f64,
    off_route_alerted: bool,
}

impl TargetTracker {
    fn new(index: usize) -> Self {
        TargetTracker {
            index,
            min_distance: f64::INFINITY,
            off_route_alerted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NavigationState {
    target: TargetTracker,
    is_approaching: bool,
    target_distance: Option<f64>,
    upcoming_turns: Vec<UpcomingTurn>,
}

impl NavigationState {
    fn new() -> Self {
        NavigationState {
            target: TargetTracker::new(0),
            is_approaching: false,
            target_distance: None,
            upcoming_turns: Vec::new(),
        }
    }

    pub fn next_turn_index(&self) -> usize {
        self.target.index
    }

    pub fn is_approaching(&self) -> bool {
        self.is_approaching
    }

    /// Closest distance to the current target since it became the target
    pub fn min_distance_since_target_change(&self) -> f64 {
        self.target.min_distance
    }

    pub fn off_route_alerted(&self) -> bool {
        self.target.off_route_alerted
    }

    /// Distance to the current target at the last cycle with a position
    pub fn target_distance(&self) -> Option<f64> {
        self.target_distance
    }

    pub fn upcoming_turns(&self) -> &[UpcomingTurn] {
        &self.upcoming_turns
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cycle {
    Idle,
    Evaluated,
    Advanced,
}

/// Turn-by-turn guidance state machine.
///
/// Feed it every new position with [`NavigationEngine::update`]. It decides
/// which turn to announce, when the runner has passed it, and when the runner
/// has probably left the route. A turn counts as passed once its approach zone
/// has been entered and then left again.
pub struct NavigationEngine<A: Announcer> {
    turn_points: Vec<TurnPoint>,
    config: GuidanceConfig,
    state: NavigationState,
    announcer: A,
}

impl<A: Announcer> NavigationEngine<A> {
    pub fn new(turn_points: Vec<TurnPoint>, config: GuidanceConfig, announcer: A) -> Self {
        let mut engine = NavigationEngine {
            turn_points,
            config,
            state: NavigationState::new(),
            announcer,
        };
        engine.state.upcoming_turns = engine.preview_without_distance();
        engine
    }

    /// Run one guidance cycle for `position`.
    ///
    /// When the cycle moves on to the next turn, the same position is
    /// evaluated once more against the new target.
    pub fn update(&mut self, position: Option<Coordinate>) -> Vec<GuidanceEvent> {
        let mut events = Vec::new();
        if self.evaluate(position, &mut events) == Cycle::Advanced {
            self.evaluate(position, &mut events);
        }
        events
    }

    fn evaluate(&mut self, position: Option<Coordinate>, events: &mut Vec<GuidanceEvent>) -> Cycle {
        let index = self.state.target.index;
        let position = match position {
            Some(p) if index < self.turn_points.len() => p,
            _ => {
                self.state.target_distance = None;
                self.state.upcoming_turns = self.preview_without_distance();
                return Cycle::Idle;
            }
        };

        let target = self.turn_points[index];
        let distance = position.distance_to(&target.position);
        self.state.target_distance = Some(distance);

        let tracker = &mut self.state.target;
        tracker.min_distance = tracker.min_distance.min(distance);
        if distance > tracker.min_distance + self.config.off_route_margin_m
            && !tracker.off_route_alerted
        {
            tracker.off_route_alerted = true;
            let min_distance = tracker.min_distance;
            log::warn!(
                "Possibly off route: {:.0} m from turn {} (closest {:.0} m)",
                distance,
                index,
                min_distance
            );
            self.announcer.speak(OFF_ROUTE_MESSAGE);
            events.push(GuidanceEvent::OffRoute {
                index,
                distance_m: distance,
                min_distance_m: min_distance,
            });
        }

        let radius = self.config.approach_radius_m;
        if distance < radius && !self.state.is_approaching {
            self.state.is_approaching = true;
            let following = self.turn_points.get(index + 1);
            match approach_message(&target, following, self.config.preview_rounding_m) {
                Some(text) => {
                    log::info!("Approaching turn {}: {}", index, text);
                    self.announcer.speak(&text);
                    events.push(GuidanceEvent::Announced { index, text });
                }
                None => log::debug!("Approaching turn {} (nothing to announce)", index),
            }
        } else if distance >= radius && self.state.is_approaching {
            self.advance(events);
            return Cycle::Advanced;
        }

        self.state.upcoming_turns = self.preview_from(distance);
        Cycle::Evaluated
    }

    fn advance(&mut self, events: &mut Vec<GuidanceEvent>) {
        let passed = self.state.target.index;
        self.state.target = TargetTracker::new(passed + 1);
        self.state.is_approaching = false;
        self.state.target_distance = None;
        log::info!("Passed turn {}", passed);
        events.push(GuidanceEvent::TurnPassed { index: passed });

        if self.state.target.index >= self.turn_points.len() {
            log::info!("Route completed");
            self.state.upcoming_turns.clear();
            events.push(GuidanceEvent::Completed);
        }
    }

    fn upcoming_slice(&self) -> &[TurnPoint] {
        let start = self.state.target.index.min(self.turn_points.len());
        let end = (start + self.config.preview_count).min(self.turn_points.len());
        &self.turn_points[start..end]
    }

    fn preview_without_distance(&self) -> Vec<UpcomingTurn> {
        let start = self.state.target.index;
        self.upcoming_slice()
            .iter()
            .enumerate()
            .map(|(offset, turn_point)| UpcomingTurn {
                turn_point: *turn_point,
                index: start + offset,
                distance: None,
            })
            .collect()
    }

    /// Distances accumulate along the chords between turn points
    fn preview_from(&self, first_distance: f64) -> Vec<UpcomingTurn> {
        let start = self.state.target.index;
        let slice = self.upcoming_slice();
        let mut cumulative = first_distance;
        let mut preview = Vec::with_capacity(slice.len());
        for (offset, turn_point) in slice.iter().enumerate() {
            if offset > 0 {
                cumulative += slice[offset - 1].position.distance_to(&turn_point.position);
            }
            preview.push(UpcomingTurn {
                turn_point: *turn_point,
                index: start + offset,
                distance: Some(cumulative),
            });
        }
        preview
    }

    pub fn phase(&self) -> NavigationPhase {
        let index = self.state.target.index;
        if index >= self.turn_points.len() {
            NavigationPhase::Completed
        } else if self.state.is_approaching {
            NavigationPhase::Approaching(index)
        } else {
            NavigationPhase::Navigating(index)
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == NavigationPhase::Completed
    }

    /// Distance to the current target plus the chords from there to the goal
    pub fn remaining_distance(&self) -> Option<f64> {
        let index = self.state.target.index;
        if index >= self.turn_points.len() {
            return None;
        }
        let to_target = self.state.target_distance?;
        let rest: Vec<Coordinate> = self.turn_points[index..]
            .iter()
            .map(|t| t.position)
            .collect();
        Some(to_target + chord_length(&rest))
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn upcoming_turns(&self) -> &[UpcomingTurn] {
        self.state.upcoming_turns()
    }

    pub fn next_turn_index(&self) -> usize {
        self.state.next_turn_index()
    }

    pub fn is_approaching(&self) -> bool {
        self.state.is_approaching()
    }

    pub fn turn_points(&self) -> &[TurnPoint] {
        &self.turn_points
    }

    pub fn announcer(&self) -> &A {
        &self.announcer
    }

    pub fn announcer_mut(&mut self) -> &mut A {
        &mut self.announcer
    }
}
