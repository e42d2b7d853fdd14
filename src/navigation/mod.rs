pub mod engine;
pub mod phrasing;

pub use engine::{GuidanceEvent, NavigationEngine, NavigationPhase, NavigationState};
pub use phrasing::{approach_message, OFF_ROUTE_MESSAGE};
