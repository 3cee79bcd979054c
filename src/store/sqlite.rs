use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;

use super::ScheduleStore;
use crate::error::ResolveError;
use crate::model::{ActiveRun, Coordinate, LineId, seconds_since_midnight};

const TIME_FORMAT: &str = "%H:%M:%S";

// A run starts at its lowest stop_sequence and ends at its highest. Times are
// compared after parsing, never as text.
const DEPARTURES_QUERY: &str = "
    SELECT d.id, d.direction_id, head.departure_time, tail.departure_time
    FROM departures d
    JOIN directions dir ON dir.id = d.direction_id
    JOIN arrivals head ON head.departure_id = d.id
        AND head.stop_sequence = (SELECT MIN(stop_sequence) FROM arrivals WHERE departure_id = d.id)
    JOIN arrivals tail ON tail.departure_id = d.id
        AND tail.stop_sequence = (SELECT MAX(stop_sequence) FROM arrivals WHERE departure_id = d.id)
    WHERE dir.line_id = ?
      AND d.date = ?
    ORDER BY d.id";

/// Timetable and route geometry stored in SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path` and initializes the schema.
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        let database_url = format!("sqlite://{}?mode=rwc", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await
            .context("Failed to connect to schedule database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// A private in-memory database. Limited to one connection because every
    /// SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory schedule database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS lines (
                id INTEGER PRIMARY KEY,
                line_code TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS directions (
                id INTEGER PRIMARY KEY,
                line_id INTEGER NOT NULL REFERENCES lines(id),
                name TEXT
            );
            CREATE TABLE IF NOT EXISTS departures (
                id INTEGER PRIMARY KEY,
                direction_id INTEGER NOT NULL REFERENCES directions(id),
                date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS arrivals (
                departure_id INTEGER NOT NULL REFERENCES departures(id),
                stop_sequence INTEGER NOT NULL,
                departure_time TEXT NOT NULL,
                PRIMARY KEY (departure_id, stop_sequence)
            );
            CREATE TABLE IF NOT EXISTS routes (
                id INTEGER PRIMARY KEY,
                line_id INTEGER NOT NULL REFERENCES lines(id),
                name TEXT,
                path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_departures_date ON departures(date, direction_id);
            CREATE INDEX IF NOT EXISTS idx_routes_line ON routes(line_id);",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create schedule schema")?;

        tracing::debug!("Schedule schema initialized");
        Ok(())
    }

    /// Runs a multi-statement SQL script, e.g. a timetable export.
    pub async fn load_script(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .context("Failed to execute schedule script")?;
        Ok(())
    }

    async fn route_path(&self, line_id: LineId) -> Result<Arc<[Coordinate]>, ResolveError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT path FROM routes WHERE line_id = ? ORDER BY id LIMIT 1")
                .bind(line_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((raw,)) => decode_path(line_id, &raw),
            None => Err(ResolveError::MalformedGeometry {
                line_id,
                reason: "no route geometry stored".to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ScheduleStore for SqliteStore {
    async fn fetch_active_runs(
        &self,
        line_id: LineId,
        date: NaiveDate,
        time_of_day: NaiveTime,
    ) -> Result<Vec<ActiveRun>, ResolveError> {
        let date = date.format("%Y-%m-%d").to_string();
        let offset = seconds_since_midnight(time_of_day);

        let rows: Vec<(i64, i64, String, String)> = sqlx::query_as(DEPARTURES_QUERY)
            .bind(line_id)
            .bind(&date)
            .fetch_all(&self.pool)
            .await?;

        let departures = rows.len();
        let mut spanning = Vec::new();
        for (run_id, direction_id, start, end) in rows {
            let start = parse_offset(run_id, start)?;
            let end = parse_offset(run_id, end)?;
            if start <= offset && offset <= end {
                spanning.push((run_id, direction_id, start, end));
            }
        }

        tracing::debug!(
            line_id,
            %date,
            offset,
            departures,
            active = spanning.len(),
            "Fetched active departures"
        );

        if spanning.is_empty() {
            return Ok(Vec::new());
        }

        let path = self.route_path(line_id).await?;

        Ok(spanning
            .into_iter()
            .map(|(run_id, direction_id, start, end)| ActiveRun {
                run_id,
                direction_id,
                path: Arc::clone(&path),
                start_offset_secs: start,
                end_offset_secs: end,
            })
            .collect())
    }
}

/// Parses a stored `HH:MM:SS` value. Both digits of every field are required.
fn parse_offset(run_id: i64, value: String) -> Result<u32, ResolveError> {
    let well_formed = value.len() == 8
        && value.bytes().enumerate().all(|(i, b)| match i {
            2 | 5 => b == b':',
            _ => b.is_ascii_digit(),
        });

    match NaiveTime::parse_from_str(&value, TIME_FORMAT) {
        Ok(time) if well_formed => Ok(seconds_since_midnight(time)),
        _ => Err(ResolveError::MalformedTimetable { run_id, value }),
    }
}

/// Decodes a stored `[[lat, lon], ...]` route path.
fn decode_path(line_id: LineId, raw: &str) -> Result<Arc<[Coordinate]>, ResolveError> {
    let points: Vec<[f64; 2]> =
        serde_json::from_str(raw).map_err(|e| ResolveError::MalformedGeometry {
            line_id,
            reason: e.to_string(),
        })?;

    if points.is_empty() {
        return Err(ResolveError::MalformedGeometry {
            line_id,
            reason: "path has no coordinates".to_string(),
        });
    }

    Ok(points.into_iter().map(Coordinate::from).collect())
}
