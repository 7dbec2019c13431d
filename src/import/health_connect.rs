//! Reader for Health Connect database exports
//!
//! The export is the SQLite file Health Connect writes on backup. Every record table
//! carries an `app_info_id` naming the writing app; apps are mapped to source ids
//! through `sources.health_connect_apps` and records from unmapped apps are skipped.
//! Timestamps are epoch milliseconds. Records are bucketed into local days with the
//! configured offset applied inside SQLite's `date()` so grouping happens in the query.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::mapping::{exercise_external_id, exercise_name};
use super::{has_extension, ExportData, ExportReader};
use crate::config::SourceSettings;
use crate::day::DayBoundary;
use crate::error::ImportError;
use crate::models::{
    CalorieTotals, ExerciseRecord, HeartRatePair, IntradaySample, RawSleepSession, RawStage,
    SourceId,
};

const FORMAT_NAME: &str = "Health Connect";

/// Tables whose presence identifies a Health Connect export
const KNOWN_TABLES: [&str; 6] = [
    "steps_record_table",
    "heart_rate_record_table",
    "sleep_session_record_table",
    "resting_heart_rate_record_table",
    "oxygen_saturation_record_table",
    "exercise_session_record_table",
];

const STEPS_SQL: &str = "SELECT app_info_id, date(start_time / 1000, 'unixepoch', ?1) AS day, SUM(count)
     FROM steps_record_table GROUP BY app_info_id, day";

const DISTANCE_SQL: &str = "SELECT app_info_id, date(start_time / 1000, 'unixepoch', ?1) AS day, SUM(distance)
     FROM distance_record_table GROUP BY app_info_id, day";

const CALORIES_SQL: &str = "SELECT app_info_id, date(start_time / 1000, 'unixepoch', ?1) AS day, SUM(energy)
     FROM total_calories_burned_record_table GROUP BY app_info_id, day";

const HEART_RATE_SQL: &str = "SELECT h.app_info_id, date(h.start_time / 1000, 'unixepoch', ?1) AS day,
            AVG(s.beats_per_minute), MAX(s.beats_per_minute)
     FROM heart_rate_record_series_table s
     JOIN heart_rate_record_table h ON s.parent_key = h.row_id
     GROUP BY h.app_info_id, day";

const RESTING_HR_SQL: &str = "SELECT app_info_id, date(time / 1000, 'unixepoch', ?1) AS day, AVG(beats_per_minute)
     FROM resting_heart_rate_record_table GROUP BY app_info_id, day";

const SPO2_SQL: &str = "SELECT app_info_id, date(time / 1000, 'unixepoch', ?1) AS day,
            AVG(percentage), MIN(percentage), MAX(percentage)
     FROM oxygen_saturation_record_table GROUP BY app_info_id, day";

const HRV_SQL: &str = "SELECT app_info_id, date(time / 1000, 'unixepoch', ?1) AS day, AVG(heart_rate_variability_millis)
     FROM heart_rate_variability_rmssd_record_table GROUP BY app_info_id, day";

const BREATHING_RATE_SQL: &str = "SELECT app_info_id, date(time / 1000, 'unixepoch', ?1) AS day, AVG(rate)
     FROM respiratory_rate_record_table GROUP BY app_info_id, day";

const SKIN_TEMP_SQL: &str = "SELECT s.app_info_id, date(d.epoch_millis / 1000, 'unixepoch', ?1) AS day, AVG(d.delta)
     FROM skin_temperature_delta_table d
     JOIN skin_temperature_record_table s ON d.parent_key = s.row_id
     GROUP BY s.app_info_id, day";

const SLEEP_SESSIONS_SQL: &str = "SELECT row_id, app_info_id, start_time, end_time
     FROM sleep_session_record_table ORDER BY start_time";

const SLEEP_STAGES_SQL: &str = "SELECT parent_key, stage_start_time, stage_end_time, stage_type
     FROM sleep_stages_table ORDER BY stage_start_time";

const INTRADAY_SQL: &str = "SELECT h.app_info_id, s.epoch_millis, s.beats_per_minute
     FROM heart_rate_record_series_table s
     JOIN heart_rate_record_table h ON s.parent_key = h.row_id
     ORDER BY s.epoch_millis";

const EXERCISES_SQL: &str = "SELECT uuid, exercise_type, start_time, end_time
     FROM exercise_session_record_table ORDER BY start_time";

/// Daily aggregate row: source, local day, metric payload
type DailyRow<T> = (SourceId, NaiveDate, T);

pub struct HealthConnectReader {
    sources: SourceSettings,
    boundary: DayBoundary,
}

impl HealthConnectReader {
    pub fn new(sources: SourceSettings, boundary: DayBoundary) -> Self {
        Self { sources, boundary }
    }

    /// Read every metric from an open export connection
    pub fn read_connection(&self, conn: &Connection) -> Result<ExportData, ImportError> {
        let present = self.present_tables(conn)?;
        if !KNOWN_TABLES.iter().any(|t| present.iter().any(|p| p == t)) {
            return Err(ImportError::Read {
                format: FORMAT_NAME,
                reason: "no Health Connect record tables found".to_string(),
            });
        }

        let mut data = ExportData::default();

        if let Some(rows) = self.metric("steps", self.daily(conn, STEPS_SQL, |row| row.get::<_, i64>(2))) {
            for (source, day, steps) in rows {
                data.baseline_mut(day, source).steps = u32::try_from(steps).ok();
            }
        }

        if let Some(rows) = self.metric("distance", self.daily(conn, DISTANCE_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, meters) in rows {
                data.baseline_mut(day, source).distance_km = Some(meters / 1000.0);
            }
        }

        if let Some(rows) = self.metric("calories", self.daily(conn, CALORIES_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, energy) in rows {
                let kcal = (energy / 1000.0).round();
                if kcal.is_finite() && kcal >= 0.0 {
                    data.baseline_mut(day, source).calories = Some(CalorieTotals {
                        total: Some(kcal as u32),
                        ..Default::default()
                    });
                }
            }
        }

        let heart_rate = self.daily(conn, HEART_RATE_SQL, |row| {
            Ok((row.get::<_, f64>(2)?, row.get::<_, i64>(3)?))
        });
        if let Some(rows) = self.metric("heart_rate", heart_rate) {
            for (source, day, (average, max)) in rows {
                if let Ok(max) = u16::try_from(max) {
                    data.baseline_mut(day, source).heart_rate = Some(HeartRatePair { average, max });
                }
            }
        }

        if let Some(rows) = self.metric("resting_hr", self.daily(conn, RESTING_HR_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, bpm) in rows {
                data.baseline_mut(day, source).resting_hr = round_bpm(bpm);
            }
        }

        let spo2 = self.daily(conn, SPO2_SQL, |row| {
            Ok((row.get::<_, f64>(2)?, row.get::<_, f64>(3)?, row.get::<_, f64>(4)?))
        });
        if let Some(rows) = self.metric("spo2", spo2) {
            for (source, day, (avg, min, max)) in rows {
                let reading = data.day_mut(day).spo2.entry(source).or_default();
                reading.avg = Some(avg);
                reading.min = Some(min);
                reading.max = Some(max);
            }
        }

        if let Some(rows) = self.metric("hrv", self.daily(conn, HRV_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, rmssd) in rows {
                data.day_mut(day).hrv.entry(source).or_default().daily_rmssd = Some(rmssd);
            }
        }

        if let Some(rows) = self.metric("breathing_rate", self.daily(conn, BREATHING_RATE_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, rate) in rows {
                data.day_mut(day).breathing_rate.entry(source).or_default().full_sleep = Some(rate);
            }
        }

        if let Some(rows) = self.metric("skin_temperature", self.daily(conn, SKIN_TEMP_SQL, |row| row.get::<_, f64>(2))) {
            for (source, day, delta) in rows {
                data.day_mut(day).skin_temperature.entry(source).or_default().delta = Some(delta);
            }
        }

        if let Some(sessions) = self.metric("sleep", self.sleep_sessions(conn)) {
            data.sleep_sessions = sessions;
        }

        if let Some(series) = self.metric("intraday_heart_rate", self.intraday(conn)) {
            data.heart_rate = series;
        }

        if let Some(exercises) = self.metric("exercises", self.exercises(conn)) {
            data.exercises = exercises;
        }

        Ok(data)
    }

    fn present_tables(&self, conn: &Connection) -> Result<Vec<String>, ImportError> {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Log and drop a failed metric query; one missing table must not sink the import
    fn metric<T>(&self, name: &str, result: rusqlite::Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                debug!(metric = name, "metric read");
                Some(value)
            }
            Err(e) => {
                warn!(metric = name, error = %e, "skipping metric");
                None
            }
        }
    }

    /// Run a per-day aggregate whose first two columns are app id and local day
    fn daily<T, F>(&self, conn: &Connection, sql: &str, payload: F) -> rusqlite::Result<Vec<DailyRow<T>>>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        let modifier = self.boundary.sqlite_modifier();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![modifier])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let app: i64 = row.get(0)?;
            let Some(source) = self.sources.source_for_app(app) else {
                continue;
            };
            // NULL aggregates (e.g. AVG over nothing) carry no reading
            let day: Option<NaiveDate> = row.get(1)?;
            let Some(day) = day else { continue };
            match payload(row) {
                Ok(value) => out.push((source, day, value)),
                Err(rusqlite::Error::InvalidColumnType(_, _, rusqlite::types::Type::Null)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn sleep_sessions(&self, conn: &Connection) -> rusqlite::Result<Vec<RawSleepSession>> {
        let mut stages: HashMap<i64, Vec<RawStage>> = HashMap::new();
        {
            let mut stmt = conn.prepare(SLEEP_STAGES_SQL)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let parent: i64 = row.get(0)?;
                let (Some(start), Some(end)) = (millis(row.get(1)?), millis(row.get(2)?)) else {
                    continue;
                };
                stages.entry(parent).or_default().push(RawStage {
                    start,
                    end,
                    code: row.get(3)?,
                });
            }
        }

        let mut stmt = conn.prepare(SLEEP_SESSIONS_SQL)?;
        let mut rows = stmt.query([])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            let session_id: i64 = row.get(0)?;
            let Some(source) = self.sources.source_for_app(row.get(1)?) else {
                continue;
            };
            let (Some(start), Some(end)) = (millis(row.get(2)?), millis(row.get(3)?)) else {
                continue;
            };
            sessions.push(RawSleepSession {
                session_id,
                source,
                start,
                end,
                stages: stages.remove(&session_id).unwrap_or_default(),
            });
        }
        Ok(sessions)
    }

    fn intraday(&self, conn: &Connection) -> rusqlite::Result<HashMap<SourceId, Vec<IntradaySample>>> {
        let mut stmt = conn.prepare(INTRADAY_SQL)?;
        let mut rows = stmt.query([])?;
        let mut series: HashMap<SourceId, Vec<IntradaySample>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let Some(source) = self.sources.source_for_app(row.get(0)?) else {
                continue;
            };
            let Some(time) = millis(row.get(1)?) else { continue };
            let Ok(bpm) = u16::try_from(row.get::<_, i64>(2)?) else {
                continue;
            };
            series.entry(source).or_default().push(IntradaySample {
                time,
                bpm,
                confidence: None,
            });
        }
        Ok(series)
    }

    fn exercises(&self, conn: &Connection) -> rusqlite::Result<Vec<ExerciseRecord>> {
        let synced_at = Utc::now();
        let mut stmt = conn.prepare(EXERCISES_SQL)?;
        let mut rows = stmt.query([])?;
        let mut exercises = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid: Vec<u8> = row.get(0)?;
            let exercise_type: i32 = row.get(1)?;
            let start_ms: i64 = row.get(2)?;
            let end_ms: i64 = row.get(3)?;
            let Some(started_at) = millis(start_ms) else { continue };
            exercises.push(ExerciseRecord {
                external_id: exercise_external_id(&uuid),
                activity_name: exercise_name(exercise_type).to_string(),
                started_at,
                duration_ms: (end_ms - start_ms).max(0),
                calories: None,
                avg_hr: None,
                distance_km: None,
                synced_at,
            });
        }
        Ok(exercises)
    }
}

impl ExportReader for HealthConnectReader {
    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["db", "sqlite", "sqlite3"])
    }

    fn read(&self, path: &Path) -> Result<ExportData, ImportError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        self.read_connection(&conn)
    }

    fn format_name(&self) -> &'static str {
        FORMAT_NAME
    }
}

fn millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn round_bpm(bpm: f64) -> Option<u16> {
    let rounded = bpm.round();
    (rounded.is_finite() && rounded >= 0.0 && rounded <= f64::from(u16::MAX)).then_some(rounded as u16)
}
