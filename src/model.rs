//! Data types shared by the resolver, the interpolator and the stream.

use chrono::{NaiveTime, Timelike};
use serde::Serialize;
use std::sync::Arc;

/// Identifier of a bus line as used in the stream URL.
pub type LineId = i64;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Returned for runs without any geometry. Not a real location.
    pub const ORIGIN: Coordinate = Coordinate { lat: 0.0, lon: 0.0 };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Linear blend towards `other`; `alpha == 0` yields `self` exactly.
    pub fn lerp(self, other: Coordinate, alpha: f64) -> Coordinate {
        Coordinate {
            lat: self.lat + (other.lat - self.lat) * alpha,
            lon: self.lon + (other.lon - self.lon) * alpha,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

/// A scheduled trip that is currently in progress for one direction of a line.
///
/// Built fresh on every resolution and never mutated afterwards. The path is
/// the line's full route geometry and is shared by every run of that line.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: i64,
    pub direction_id: i64,
    pub path: Arc<[Coordinate]>,
    /// Scheduled start, seconds since local midnight.
    pub start_offset_secs: u32,
    /// Scheduled end, seconds since local midnight.
    pub end_offset_secs: u32,
}

impl ActiveRun {
    /// True when the run's scheduled window contains `offset_secs`.
    pub fn spans(&self, offset_secs: u32) -> bool {
        self.start_offset_secs <= offset_secs && offset_secs <= self.end_offset_secs
    }

    /// Whether this run should replace `other` as the direction's active run.
    pub(crate) fn supersedes(&self, other: &ActiveRun) -> bool {
        (self.start_offset_secs, self.run_id) > (other.start_offset_secs, other.run_id)
    }
}

/// One interpolated vehicle position as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusPosition {
    pub departure_id: i64,
    pub direction_id: i64,
    pub lat: f64,
    pub lon: f64,
}

impl BusPosition {
    pub fn new(run: &ActiveRun, at: Coordinate) -> Self {
        Self {
            departure_id: run.run_id,
            direction_id: run.direction_id,
            lat: at.lat,
            lon: at.lon,
        }
    }
}

/// Seconds elapsed since midnight for a wall-clock time of day.
pub fn seconds_since_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight()
}
