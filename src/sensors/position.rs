use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::config::PositionConfig;
use crate::error::LocationError;
use crate::sensors::WatchId;
use crate::types::Coordinate;

pub type PositionFix = Result<Coordinate, LocationError>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the platform may hand back
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::from(&PositionConfig::default())
    }
}

impl From<&PositionConfig> for PositionOptions {
    fn from(config: &PositionConfig) -> Self {
        PositionOptions {
            enable_high_accuracy: config.enable_high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

/// Platform location service.
///
/// Both calls deliver their results into `sink` asynchronously; a closed sink
/// ends the delivery.
pub trait LocationService {
    /// Deliver a single fix (or error)
    fn request_position(&mut self, options: &PositionOptions, sink: UnboundedSender<PositionFix>);

    /// Deliver fixes continuously until [`LocationService::clear_watch`]
    fn watch_position(
        &mut self,
        options: &PositionOptions,
        sink: UnboundedSender<PositionFix>,
    ) -> WatchId;

    fn clear_watch(&mut self, id: WatchId);
}

/// Deduplicated device position.
///
/// Requests one immediate fix, then keeps a watch open until [`PositionSource::stop`]
/// or drop. Platform errors never reach the caller: before the first real fix
/// they fall back to the configured default coordinate, afterwards the last fix
/// is kept.
pub struct PositionSource<S: LocationService> {
    service: S,
    options: PositionOptions,
    fallback: Option<Coordinate>,
    latest: Option<Coordinate>,
    has_real_fix: bool,
    watch: Option<WatchId>,
}

impl<S: LocationService> PositionSource<S> {
    pub fn new(service: S, config: &PositionConfig) -> Self {
        PositionSource {
            service,
            options: PositionOptions::from(config),
            fallback: config.fallback,
            latest: None,
            has_real_fix: false,
            watch: None,
        }
    }

    /// Open the one-shot request and the watch; both feed the returned stream
    pub fn start(&mut self) -> UnboundedReceiver<PositionFix> {
        self.stop();
        let (tx, rx) = unbounded_channel();
        self.service.request_position(&self.options, tx.clone());
        self.watch = Some(self.service.watch_position(&self.options, tx));
        log::debug!(
            "Position watch opened (high accuracy: {}, timeout: {:?}, max age: {:?})",
            self.options.enable_high_accuracy,
            self.options.timeout,
            self.options.maximum_age
        );
        rx
    }

    /// Fold one delivery into the source. Returns the new position when it changed.
    pub fn accept(&mut self, fix: PositionFix) -> Option<Coordinate> {
        match fix {
            Ok(coordinate) => {
                if !self.has_real_fix {
                    log::info!("First position fix: {:.6}, {:.6}", coordinate.lat, coordinate.lng);
                    self.has_real_fix = true;
                }
                self.replace(coordinate)
            }
            Err(e) => {
                if self.has_real_fix {
                    log::warn!("Location error, keeping last fix: {}", e);
                    return None;
                }
                match self.fallback {
                    Some(fallback) => {
                        log::warn!(
                            "Location error, using default position {:.4}, {:.4}: {}",
                            fallback.lat,
                            fallback.lng,
                            e
                        );
                        self.replace(fallback)
                    }
                    None => {
                        log::warn!("Location error: {}", e);
                        None
                    }
                }
            }
        }
    }

    fn replace(&mut self, coordinate: Coordinate) -> Option<Coordinate> {
        if self.latest == Some(coordinate) {
            return None;
        }
        self.latest = Some(coordinate);
        self.latest
    }

    pub fn latest(&self) -> Option<Coordinate> {
        self.latest
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Release the watch subscription
    pub fn stop(&mut self) {
        if let Some(id) = self.watch.take() {
            self.service.clear_watch(id);
            log::debug!("Position watch {:?} released", id);
        }
    }
}

impl<S: LocationService> Drop for PositionSource<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
