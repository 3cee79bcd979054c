use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat};
use std::sync::Arc;

use crate::error::{ResolveError, StreamError};
use crate::interpolate::interpolate;
use crate::model::{BusPosition, LineId, seconds_since_midnight};
use crate::resolver::resolve_active_runs;
use crate::store::ScheduleStore;

/// Produces the payload of one tick.
#[async_trait::async_trait]
pub trait Feed: Send + Sync {
    fn name(&self) -> &'static str;

    async fn frame(&self, now: DateTime<Local>) -> Result<String, StreamError>;
}

/// Liveness probe: a timestamp, no schedule lookup.
pub struct HeartbeatFeed;

#[async_trait::async_trait]
impl Feed for HeartbeatFeed {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn frame(&self, now: DateTime<Local>) -> Result<String, StreamError> {
        Ok(format!(
            "Current time: {}",
            now.to_rfc3339_opts(SecondsFormat::Secs, false)
        ))
    }
}

/// Estimated positions of every active run on one line, as a JSON array.
pub struct PositionFeed {
    store: Arc<dyn ScheduleStore>,
    line_id: LineId,
}

impl PositionFeed {
    pub fn new(store: Arc<dyn ScheduleStore>, line_id: LineId) -> Self {
        Self { store, line_id }
    }

    /// Positions of the line's active runs at the local instant `as_of`.
    pub async fn positions_at(
        &self,
        as_of: NaiveDateTime,
    ) -> Result<Vec<BusPosition>, ResolveError> {
        let runs = resolve_active_runs(self.store.as_ref(), self.line_id, as_of).await?;
        let offset = seconds_since_midnight(as_of.time());

        // An empty path only interpolates to the origin sentinel.
        Ok(runs
            .iter()
            .filter(|run| !run.path.is_empty())
            .map(|run| BusPosition::new(run, interpolate(run, offset)))
            .collect())
    }
}

#[async_trait::async_trait]
impl Feed for PositionFeed {
    fn name(&self) -> &'static str {
        "positions"
    }

    async fn frame(&self, now: DateTime<Local>) -> Result<String, StreamError> {
        let positions = self.positions_at(now.naive_local()).await?;
        Ok(serde_json::to_string(&positions)?)
    }
}
