//! Sensor services that play back recorded readings.
//!
//! Readings carry an offset in seconds from the start of the recording. With a
//! positive `speed` the offsets are honoured (2.0 plays twice as fast); with
//! `speed == 0.0` everything is delivered as fast as the receiver drains it.
//! The stream closes after the last reading.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use crate::sensors::heading::{OrientationReading, OrientationService};
use crate::sensors::position::{LocationService, PositionFix, PositionOptions};
use crate::sensors::WatchId;

/// When a reading recorded `offset` seconds in is due; None if it is out of range
fn playback_deadline(start: Instant, offset: f64, speed: f64) -> Option<Instant> {
    let delay = Duration::try_from_secs_f64(offset / speed).ok()?;
    start.checked_add(delay)
}

fn spawn_playback<T: Send + 'static>(
    readings: Vec<(f64, T)>,
    speed: f64,
    sink: UnboundedSender<T>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        for (offset, reading) in readings {
            if speed > 0.0 && offset > 0.0 {
                let Some(deadline) = playback_deadline(start, offset, speed) else {
                    log::warn!("Skipping reading at unreachable offset {}s", offset);
                    continue;
                };
                sleep_until(deadline).await;
            } else {
                tokio::task::yield_now().await;
            }
            if sink.send(reading).is_err() {
                break;
            }
        }
    })
}

/// Location service over a recorded list of fixes.
///
/// The one-shot request answers with the first recorded fix; the watch plays
/// the rest.
pub struct ReplayLocationService {
    fixes: VecDeque<(f64, PositionFix)>,
    speed: f64,
    watches: HashMap<WatchId, JoinHandle<()>>,
}

impl ReplayLocationService {
    pub fn new(fixes: Vec<(f64, PositionFix)>, speed: f64) -> Self {
        ReplayLocationService {
            fixes: fixes.into(),
            speed,
            watches: HashMap::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

impl LocationService for ReplayLocationService {
    fn request_position(&mut self, _options: &PositionOptions, sink: UnboundedSender<PositionFix>) {
        if let Some((_, fix)) = self.fixes.pop_front() {
            // Receiver may already be gone; nothing to deliver to then
            let _ = sink.send(fix);
        }
    }

    fn watch_position(
        &mut self,
        _options: &PositionOptions,
        sink: UnboundedSender<PositionFix>,
    ) -> WatchId {
        let fixes: Vec<_> = self.fixes.drain(..).collect();
        log::debug!("Replaying {} position fixes", fixes.len());
        let id = WatchId::next();
        self.watches.insert(id, spawn_playback(fixes, self.speed, sink));
        id
    }

    fn clear_watch(&mut self, id: WatchId) {
        if let Some(handle) = self.watches.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for ReplayLocationService {
    fn drop(&mut self) {
        for (_, handle) in self.watches.drain() {
            handle.abort();
        }
    }
}

pub struct ReplayOrientationService {
    readings: Vec<(f64, OrientationReading)>,
    speed: f64,
    requires_permission: bool,
    grant: bool,
    subscriptions: HashMap<WatchId, JoinHandle<()>>,
}

impl ReplayOrientationService {
    pub fn new(readings: Vec<(f64, OrientationReading)>, speed: f64) -> Self {
        ReplayOrientationService {
            readings,
            speed,
            requires_permission: false,
            grant: true,
            subscriptions: HashMap::new(),
        }
    }

    /// Simulate a platform that gates orientation behind a permission prompt
    pub fn with_permission(mut self, requires_permission: bool, grant: bool) -> Self {
        self.requires_permission = requires_permission;
        self.grant = grant;
        self
    }
}

#[async_trait]
impl OrientationService for ReplayOrientationService {
    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    async fn request_permission(&mut self) -> bool {
        self.grant
    }

    fn subscribe(&mut self, sink: UnboundedSender<OrientationReading>) -> WatchId {
        let readings = std::mem::take(&mut self.readings);
        log::debug!("Replaying {} orientation readings", readings.len());
        let id = WatchId::next();
        self.subscriptions
            .insert(id, spawn_playback(readings, self.speed, sink));
        id
    }

    fn unsubscribe(&mut self, id: WatchId) {
        if let Some(handle) = self.subscriptions.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for ReplayOrientationService {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            handle.abort();
        }
    }
}
