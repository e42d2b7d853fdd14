//! Android sensors through the Termux:API command-line tools.
//!
//! `termux-location` and `termux-sensor` are polled on a tokio interval; each
//! poll is one short-lived child process.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Duration, Instant, Interval, MissedTickBehavior};

use crate::error::{LocationError, LocationErrorCode};
use crate::sensors::heading::{OrientationReading, OrientationService};
use crate::sensors::position::{LocationService, PositionFix, PositionOptions};
use crate::sensors::WatchId;
use crate::types::Coordinate;

type FixCache = Arc<Mutex<Option<(Instant, Coordinate)>>>;

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
}

pub struct TermuxLocationService {
    poll_interval: Duration,
    cache: FixCache,
    watches: HashMap<WatchId, JoinHandle<()>>,
}

impl TermuxLocationService {
    pub fn new(poll_interval: Duration) -> Self {
        TermuxLocationService {
            poll_interval,
            cache: Arc::new(Mutex::new(None)),
            watches: HashMap::new(),
        }
    }
}

impl LocationService for TermuxLocationService {
    fn request_position(&mut self, options: &PositionOptions, sink: UnboundedSender<PositionFix>) {
        let options = *options;
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let fix = fetch_location(&options, &cache).await;
            if sink.send(fix).is_err() {
                log::debug!("Position request finished after the session closed");
            }
        });
    }

    fn watch_position(
        &mut self,
        options: &PositionOptions,
        sink: UnboundedSender<PositionFix>,
    ) -> WatchId {
        let options = *options;
        let cache = self.cache.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = watch_ticker(poll_interval);
            loop {
                ticker.tick().await;
                let fix = fetch_location(&options, &cache).await;
                if sink.send(fix).is_err() {
                    break;
                }
            }
        });
        let id = WatchId::next();
        self.watches.insert(id, handle);
        id
    }

    fn clear_watch(&mut self, id: WatchId) {
        if let Some(handle) = self.watches.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TermuxLocationService {
    fn drop(&mut self) {
        for (_, handle) in self.watches.drain() {
            handle.abort();
        }
    }
}

/// Poll ticker for a position watch. The first poll waits one period; the
/// one-shot request covers the start.
fn watch_ticker(poll_interval: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn cached_fix(cache: &FixCache, maximum_age: Duration) -> Option<Coordinate> {
    let guard = cache.lock().ok()?;
    let (taken_at, coordinate) = (*guard)?;
    (taken_at.elapsed() <= maximum_age).then_some(coordinate)
}

async fn fetch_location(options: &PositionOptions, cache: &FixCache) -> PositionFix {
    if let Some(coordinate) = cached_fix(cache, options.maximum_age) {
        return Ok(coordinate);
    }

    let provider = if options.enable_high_accuracy {
        "gps"
    } else {
        "network"
    };
    let request = Command::new("termux-location")
        .args(["-p", provider, "-r", "once"])
        .kill_on_drop(true)
        .output();

    let output = match timeout(options.timeout, request).await {
        Err(_) => {
            return Err(LocationError::new(
                LocationErrorCode::Timeout,
                format!("no fix within {:?}", options.timeout),
            ))
        }
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(LocationError::new(
                LocationErrorCode::PositionUnavailable,
                "termux-location not installed",
            ))
        }
        Ok(Err(e)) => {
            return Err(LocationError::new(
                LocationErrorCode::PositionUnavailable,
                e.to_string(),
            ))
        }
        Ok(Ok(output)) => output,
    };

    let coordinate = parse_location(&String::from_utf8_lossy(&output.stdout))?;
    if let Ok(mut guard) = cache.lock() {
        *guard = Some((Instant::now(), coordinate));
    }
    Ok(coordinate)
}

/// Parse the JSON printed by `termux-location`
pub fn parse_location(output: &str) -> PositionFix {
    match serde_json::from_str::<TermuxLocation>(output) {
        Ok(location) => Ok(Coordinate::new(location.latitude, location.longitude)),
        Err(_) if output.to_lowercase().contains("permission") => Err(LocationError::new(
            LocationErrorCode::PermissionDenied,
            output.trim(),
        )),
        Err(e) => Err(LocationError::new(
            LocationErrorCode::PositionUnavailable,
            format!("unreadable location output: {}", e),
        )),
    }
}

pub struct TermuxOrientationService {
    poll_interval: Duration,
    subscriptions: HashMap<WatchId, JoinHandle<()>>,
}

impl TermuxOrientationService {
    pub fn new(poll_interval: Duration) -> Self {
        TermuxOrientationService {
            poll_interval,
            subscriptions: HashMap::new(),
        }
    }
}

#[async_trait]
impl OrientationService for TermuxOrientationService {
    fn subscribe(&mut self, sink: UnboundedSender<OrientationReading>) -> WatchId {
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(reading) = read_orientation(poll_interval).await else {
                    continue;
                };
                if sink.send(reading).is_err() {
                    break;
                }
            }
        });
        let id = WatchId::next();
        self.subscriptions.insert(id, handle);
        id
    }

    fn unsubscribe(&mut self, id: WatchId) {
        if let Some(handle) = self.subscriptions.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TermuxOrientationService {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            handle.abort();
        }
    }
}

async fn read_orientation(limit: Duration) -> Option<OrientationReading> {
    let request = Command::new("termux-sensor")
        .args(["-s", "orientation", "-n", "1"])
        .kill_on_drop(true)
        .output();
    match timeout(limit.max(Duration::from_secs(2)), request).await {
        Ok(Ok(output)) => parse_orientation(&String::from_utf8_lossy(&output.stdout)),
        Ok(Err(e)) => {
            log::debug!("termux-sensor failed: {}", e);
            None
        }
        Err(_) => None,
    }
}

/// Parse `termux-sensor` JSON: `{"<sensor name>": {"values": [azimuth, pitch, roll]}}`
pub fn parse_orientation(output: &str) -> Option<OrientationReading> {
    let value: serde_json::Value = serde_json::from_str(output).ok()?;
    let azimuth = value
        .as_object()?
        .values()
        .find_map(|sensor| sensor.get("values")?.get(0)?.as_f64())?;
    Some(OrientationReading {
        compass_heading: Some(azimuth),
        alpha: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let output = r#"{
  "latitude": 43.0686,
  "longitude": 141.3508,
  "altitude": 19.5,
  "accuracy": 8.0,
  "bearing": 0.0,
  "speed": 0.0,
  "elapsedMs": 31,
  "provider": "gps"
}"#;
        assert_eq!(parse_location(output), Ok(Coordinate::new(43.0686, 141.3508)));
    }

    #[test]
    fn test_parse_location_errors() {
        let denied = parse_location("Error: Location permission not granted\n").unwrap_err();
        assert_eq!(denied.code, LocationErrorCode::PermissionDenied);

        let empty = parse_location("").unwrap_err();
        assert_eq!(empty.code, LocationErrorCode::PositionUnavailable);
    }

    #[test]
    fn test_parse_orientation() {
        let output = r#"{"Orientation Sensor": {"values": [271.5, -3.2, 0.4]}}"#;
        assert_eq!(
            parse_orientation(output),
            Some(OrientationReading {
                compass_heading: Some(271.5),
                alpha: None,
            })
        );
        assert_eq!(parse_orientation("{}"), None);
        assert_eq!(parse_orientation("not json"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_waits_one_period_before_first_poll() {
        let start = Instant::now();
        let mut ticker = watch_ticker(Duration::from_secs(1));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_respects_maximum_age() {
        let cache: FixCache = Arc::new(Mutex::new(None));
        let p = Coordinate::new(43.0, 141.0);
        *cache.lock().unwrap() = Some((Instant::now(), p));

        assert_eq!(cached_fix(&cache, Duration::from_secs(3)), Some(p));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cached_fix(&cache, Duration::from_secs(3)), None);
    }
}
