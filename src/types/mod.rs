use serde::{Deserialize, Serialize};

use crate::distance::{chord_length, haversine_distance};

/// WGS84 position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }
}

/// Direction the runner has to take at a turn point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnDirection {
    Left,
    Right,
    UTurn,
    Straight,
}

impl TurnDirection {
    /// Spoken instruction, or None for directions with nothing to say
    pub fn instruction(&self) -> Option<&'static str> {
        match self {
            TurnDirection::Left => Some("turn left"),
            TurnDirection::Right => Some("turn right"),
            TurnDirection::UTurn => Some("make a U-turn"),
            TurnDirection::Straight => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnPoint {
    #[serde(flatten)]
    pub position: Coordinate,
    pub turn: TurnDirection,
}

impl TurnPoint {
    pub fn new(lat: f64, lng: f64, turn: TurnDirection) -> Self {
        Self {
            position: Coordinate::new(lat, lng),
            turn,
        }
    }
}

/// Entry of the "next turns" preview handed to the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpcomingTurn {
    pub turn_point: TurnPoint,
    pub index: usize,
    /// Meters from the current position, None while no fix is known
    pub distance: Option<f64>,
}

/// Route geometry produced upstream; immutable for a session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteData {
    pub total_distance_m: f64,
    pub route_points: Vec<Coordinate>,
}

impl RouteData {
    pub fn from_points(route_points: Vec<Coordinate>) -> Self {
        let total_distance_m = chord_length(&route_points);
        Self {
            total_distance_m,
            route_points,
        }
    }
}
