//! Active Run Resolver.
//!
//! Narrows the store's candidates down to the runs whose scheduled window
//! spans the requested instant, keeping at most one run per direction.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::ResolveError;
use crate::model::{ActiveRun, LineId, seconds_since_midnight};
use crate::store::ScheduleStore;

/// Resolves the active runs of `line_id` at the local wall-clock instant `as_of`.
///
/// Store failures are returned as-is; the caller decides what a failed tick means.
#[tracing::instrument(skip(store, as_of), fields(as_of = %as_of))]
pub async fn resolve_active_runs<S>(
    store: &S,
    line_id: LineId,
    as_of: NaiveDateTime,
) -> Result<Vec<ActiveRun>, ResolveError>
where
    S: ScheduleStore + ?Sized,
{
    let candidates = store
        .fetch_active_runs(line_id, as_of.date(), as_of.time())
        .await?;
    let offset = seconds_since_midnight(as_of.time());
    let runs = latest_per_direction(candidates, offset);

    tracing::debug!(active = runs.len(), "Resolved active runs");
    Ok(runs)
}

/// Keeps, for every direction, the spanning run with the latest start.
/// Equal starts fall back to the higher run id. Output is ordered by direction.
pub fn latest_per_direction(candidates: Vec<ActiveRun>, offset_secs: u32) -> Vec<ActiveRun> {
    let mut by_direction: BTreeMap<i64, ActiveRun> = BTreeMap::new();

    for run in candidates.into_iter().filter(|r| r.spans(offset_secs)) {
        match by_direction.entry(run.direction_id) {
            Entry::Vacant(slot) => {
                slot.insert(run);
            }
            Entry::Occupied(mut slot) => {
                if run.supersedes(slot.get()) {
                    slot.insert(run);
                }
            }
        }
    }

    by_direction.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinate;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::{Arc, Mutex};

    fn run(run_id: i64, direction_id: i64, start: u32, end: u32) -> ActiveRun {
        ActiveRun {
            run_id,
            direction_id,
            path: Arc::from(vec![Coordinate::new(46.0, 14.5), Coordinate::new(46.1, 14.6)]),
            start_offset_secs: start,
            end_offset_secs: end,
        }
    }

    fn ids(runs: &[ActiveRun]) -> Vec<i64> {
        runs.iter().map(|r| r.run_id).collect()
    }

    /// Returns a fixed candidate list and remembers what it was asked for.
    struct CannedStore {
        runs: Vec<ActiveRun>,
        asked: Mutex<Option<(LineId, NaiveDate, NaiveTime)>>,
    }

    #[async_trait::async_trait]
    impl ScheduleStore for CannedStore {
        async fn fetch_active_runs(
            &self,
            line_id: LineId,
            date: NaiveDate,
            time_of_day: NaiveTime,
        ) -> Result<Vec<ActiveRun>, ResolveError> {
            *self.asked.lock().unwrap() = Some((line_id, date, time_of_day));
            Ok(self.runs.clone())
        }
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl ScheduleStore for DownStore {
        async fn fetch_active_runs(
            &self,
            _: LineId,
            _: NaiveDate,
            _: NaiveTime,
        ) -> Result<Vec<ActiveRun>, ResolveError> {
            Err(ResolveError::DataUnavailable(sqlx::Error::PoolTimedOut))
        }
    }

    #[test]
    fn test_one_run_per_direction_latest_start_wins() {
        let candidates = vec![run(1, 10, 100, 900), run(2, 10, 300, 900), run(3, 11, 200, 900)];
        let runs = latest_per_direction(candidates, 400);
        assert_eq!(ids(&runs), vec![2, 3]);
    }

    #[test]
    fn test_equal_start_breaks_on_run_id() {
        let candidates = vec![run(8, 10, 100, 900), run(9, 10, 100, 800), run(7, 10, 100, 950)];
        assert_eq!(ids(&latest_per_direction(candidates, 400)), vec![9]);
    }

    #[test]
    fn test_candidates_not_spanning_now_are_dropped() {
        // Run 2 starts later but has not departed yet.
        let candidates = vec![run(1, 10, 100, 900), run(2, 10, 500, 900), run(3, 11, 10, 50)];
        assert_eq!(ids(&latest_per_direction(candidates, 400)), vec![1]);
    }

    #[test]
    fn test_no_candidates_is_empty() {
        assert!(latest_per_direction(Vec::new(), 400).is_empty());
    }

    #[test]
    fn test_output_is_ordered_by_direction() {
        let candidates = vec![run(1, 30, 0, 900), run(2, 10, 0, 900), run(3, 20, 0, 900)];
        let runs = latest_per_direction(candidates, 400);
        let directions: Vec<i64> = runs.iter().map(|r| r.direction_id).collect();
        assert_eq!(directions, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_resolve_queries_store_with_date_and_time_of_day() {
        let store = CannedStore {
            runs: vec![run(1, 10, 3_600, 7_200), run(2, 10, 3_700, 7_200)],
            asked: Mutex::new(None),
        };
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();

        let runs = resolve_active_runs(&store, 6, as_of).await.unwrap();

        assert_eq!(ids(&runs), vec![2]);
        let asked = *store.asked.lock().unwrap();
        assert_eq!(asked, Some((6, as_of.date(), as_of.time())));
    }

    #[tokio::test]
    async fn test_resolve_propagates_store_failure() {
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let err = resolve_active_runs(&DownStore, 1, as_of).await.unwrap_err();
        assert!(matches!(err, ResolveError::DataUnavailable(_)));
    }
}
