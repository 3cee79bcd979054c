//! Schedule Store access.
//!
//! [`ScheduleStore`] is the read-only query surface the resolver depends on.
//! [`SqliteStore`] implements it over the timetable database.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{NaiveDate, NaiveTime};

use crate::error::ResolveError;
use crate::model::{ActiveRun, LineId};

/// Returns the scheduled trips of a line whose window spans a given time of
/// day on a given date. Shared by every open stream, so implementations must
/// be safe for concurrent reads.
#[async_trait::async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn fetch_active_runs(
        &self,
        line_id: LineId,
        date: NaiveDate,
        time_of_day: NaiveTime,
    ) -> Result<Vec<ActiveRun>, ResolveError>;
}
