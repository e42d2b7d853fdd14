//! Turn-by-turn voice guidance for running a drawn route.
//!
//! [`navigation::NavigationEngine`] is the core: feed it positions, it
//! announces turns through an [`announcement::Announcer`]. [`session`] wires
//! it to platform sensors.

pub mod announcement;
pub mod config;
pub mod distance;
pub mod error;
pub mod live_status;
pub mod navigation;
pub mod sensors;
pub mod session;
pub mod speech;
pub mod trace;
pub mod types;

pub use announcement::{AnnouncementChannel, Announcer, RecordingAnnouncer};
pub use config::Config;
pub use distance::haversine_distance;
pub use error::{LocationError, LocationErrorCode, NavError, Result};
pub use navigation::{GuidanceEvent, NavigationEngine, NavigationPhase, NavigationState};
pub use session::{NavigationSession, SessionReport};
pub use types::{Coordinate, RouteData, TurnDirection, TurnPoint, UpcomingTurn};
