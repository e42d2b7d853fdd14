pub mod health;
pub mod heading;
pub mod position;
pub mod replay;
pub mod termux;

pub use health::SensorHealth;
pub use heading::{HeadingSource, OrientationReading, OrientationService, Permission};
pub use position::{LocationService, PositionFix, PositionOptions, PositionSource};
pub use replay::{ReplayLocationService, ReplayOrientationService};
pub use termux::{TermuxLocationService, TermuxOrientationService};

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle of a sensor subscription; released with the matching clear call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        WatchId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
