//! Schedule-based position estimate.
//!
//! A run is assumed to travel its path at constant pace between its scheduled
//! start and end, with every path vertex equally spaced in time. There is no
//! telemetry behind this, only the timetable.

use crate::model::{ActiveRun, Coordinate};

/// Estimates where `run` is at `now_offset_secs` (seconds since midnight).
///
/// Before the start the first vertex is returned, after the end the last one.
/// An empty path yields [`Coordinate::ORIGIN`], which callers must treat as
/// "no data".
pub fn interpolate(run: &ActiveRun, now_offset_secs: u32) -> Coordinate {
    let path = &run.path;
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return Coordinate::ORIGIN;
    };

    if path.len() == 1 || now_offset_secs <= run.start_offset_secs {
        return *first;
    }
    if now_offset_secs >= run.end_offset_secs {
        return *last;
    }

    // start < now < end here, so the span is non-zero.
    let elapsed = f64::from(now_offset_secs - run.start_offset_secs);
    let duration = f64::from(run.end_offset_secs - run.start_offset_secs);
    let fraction = (elapsed / duration).clamp(0.0, 1.0);

    let idx = fraction * (path.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;

    path[lower].lerp(path[upper], idx - lower as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn run_with(path: Vec<[f64; 2]>, start: u32, end: u32) -> ActiveRun {
        ActiveRun {
            run_id: 1,
            direction_id: 1,
            path: path.into_iter().map(Coordinate::from).collect(),
            start_offset_secs: start,
            end_offset_secs: end,
        }
    }

    fn three_point_run() -> ActiveRun {
        run_with(vec![[46.00, 14.50], [46.10, 14.60], [46.20, 14.70]], 0, 100)
    }

    fn assert_close(actual: Coordinate, lat: f64, lon: f64) {
        assert!(
            (actual.lat - lat).abs() < 1e-9 && (actual.lon - lon).abs() < 1e-9,
            "expected ({lat}, {lon}), got ({}, {})",
            actual.lat,
            actual.lon
        );
    }

    #[test]
    fn test_exact_vertex_at_half_way() {
        assert_eq!(interpolate(&three_point_run(), 50), Coordinate::new(46.10, 14.60));
    }

    #[test]
    fn test_midpoint_between_vertices() {
        assert_close(interpolate(&three_point_run(), 25), 46.05, 14.55);
    }

    #[test]
    fn test_endpoints_are_exact() {
        let run = three_point_run();
        assert_eq!(interpolate(&run, run.start_offset_secs), run.path[0]);
        assert_eq!(interpolate(&run, run.end_offset_secs), run.path[2]);
    }

    #[test]
    fn test_clamps_outside_window() {
        let run = run_with(vec![[46.00, 14.50], [46.10, 14.60], [46.20, 14.70]], 100, 200);
        for t in [0, 50, 99] {
            assert_eq!(interpolate(&run, t), run.path[0]);
        }
        for t in [201, 5_000, 86_399] {
            assert_eq!(interpolate(&run, t), run.path[2]);
        }
    }

    #[test]
    fn test_single_point_path_is_constant() {
        let run = run_with(vec![[46.55, 15.64]], 100, 200);
        for t in [0, 100, 150, 200, 10_000] {
            assert_eq!(interpolate(&run, t), Coordinate::new(46.55, 15.64));
        }
    }

    #[test]
    fn test_empty_path_yields_origin_sentinel() {
        let run = ActiveRun {
            run_id: 1,
            direction_id: 1,
            path: Arc::from(Vec::new()),
            start_offset_secs: 0,
            end_offset_secs: 100,
        };
        assert_eq!(interpolate(&run, 50), Coordinate::ORIGIN);
    }

    #[test]
    fn test_latitude_is_monotonic_over_the_run() {
        let path = (0..7).map(|i| [46.0 + 0.013 * i as f64, 14.5]).collect();
        let run = run_with(path, 3_600, 4_321);
        let mut previous = f64::MIN;
        for t in run.start_offset_secs..=run.end_offset_secs {
            let lat = interpolate(&run, t).lat;
            assert!(lat >= previous, "latitude went backwards at t={t}");
            previous = lat;
        }
    }

    #[test]
    fn test_is_deterministic() {
        let run = three_point_run();
        assert_eq!(interpolate(&run, 37), interpolate(&run, 37));
    }
}
