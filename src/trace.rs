//! Recorded sessions: the route plus every sensor delivery, in order.
//!
//! Stored as JSON, optionally gzip-compressed (`.json.gz`).

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{LocationError, NavError, Result};
use crate::sensors::{OrientationReading, PositionFix};
use crate::types::{Coordinate, RouteData, TurnPoint};

/// One sensor delivery. A reading holds a position, an error, a heading, or a
/// position/error together with a heading.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TraceReading {
    /// Seconds; only differences matter
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LocationError>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TraceFile {
    pub turn_points: Vec<TurnPoint>,
    #[serde(default)]
    pub route: Option<RouteData>,
    #[serde(default)]
    pub readings: Vec<TraceReading>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn trace_error(path: &Path, message: impl ToString) -> NavError {
    NavError::Trace {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

impl TraceFile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| trace_error(path, e))?;
        let parsed = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            serde_json::from_reader(BufReader::new(file))
        };
        let trace: TraceFile = parsed.map_err(|e| trace_error(path, e))?;
        log::info!(
            "Loaded trace {}: {} turn points, {} readings",
            path.display(),
            trace.turn_points.len(),
            trace.readings.len()
        );
        Ok(trace)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn start_time(&self) -> f64 {
        self.readings.first().map(|r| r.timestamp).unwrap_or(0.0)
    }

    /// Position deliveries with their offset from the first reading
    pub fn position_fixes(&self) -> Vec<(f64, PositionFix)> {
        let start = self.start_time();
        self.readings
            .iter()
            .filter_map(|r| {
                let fix = match (r.position, &r.error) {
                    (Some(p), _) => Ok(p),
                    (None, Some(e)) => Err(e.clone()),
                    (None, None) => return None,
                };
                Some((r.timestamp - start, fix))
            })
            .collect()
    }

    /// Heading deliveries with their offset from the first reading
    pub fn orientation_readings(&self) -> Vec<(f64, OrientationReading)> {
        let start = self.start_time();
        self.readings
            .iter()
            .filter_map(|r| {
                let heading = r.heading?;
                Some((
                    r.timestamp - start,
                    OrientationReading {
                        compass_heading: Some(heading),
                        alpha: None,
                    },
                ))
            })
            .collect()
    }

    /// Recorded route, or the chords between the turn points when none was recorded
    pub fn route_data(&self) -> RouteData {
        self.route.clone().unwrap_or_else(|| {
            RouteData::from_points(self.turn_points.iter().map(|t| t.position).collect())
        })
    }
}
