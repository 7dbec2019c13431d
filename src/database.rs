use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::RepositoryError;
use crate::models::{
    BaselineMaturity, ConfidenceLevel, DataQuality, DaySummary, ExerciseRecord, IntradaySample,
    PlausibilityStatus, SleepType, StageEvent, StageKind,
};
use crate::repository::{Repository, RepositoryStats};

/// Columns of `daily_summaries`, in bind order
const SUMMARY_COLUMNS: [&str; 44] = [
    "date",
    "provider",
    "resting_hr",
    "avg_hr",
    "max_hr",
    "hrv_daily_rmssd",
    "hrv_deep_rmssd",
    "spo2_avg",
    "spo2_min",
    "spo2_max",
    "br_full_sleep",
    "br_deep_sleep",
    "br_light_sleep",
    "br_rem_sleep",
    "skin_temp_delta",
    "sleep_start",
    "sleep_end",
    "sleep_duration_min",
    "sleep_minutes_asleep",
    "sleep_minutes_awake",
    "sleep_onset_latency_min",
    "sleep_type",
    "sleep_deep_min",
    "sleep_light_min",
    "sleep_rem_min",
    "sleep_wake_min",
    "sleep_is_main",
    "steps",
    "distance_km",
    "floors",
    "calories_total",
    "calories_active",
    "calories_bmr",
    "minutes_sedentary",
    "minutes_lightly_active",
    "minutes_fairly_active",
    "minutes_very_active",
    "vo2_max",
    "hr_zone_out_min",
    "hr_zone_fat_min",
    "hr_zone_cardio_min",
    "hr_zone_peak_min",
    "synced_at",
    "updated_at",
];

/// Enrichment columns a later upsert may not clear
const PRESERVED_COLUMNS: [&str; 10] = [
    "hrv_daily_rmssd",
    "hrv_deep_rmssd",
    "spo2_avg",
    "spo2_min",
    "spo2_max",
    "br_full_sleep",
    "br_deep_sleep",
    "br_light_sleep",
    "br_rem_sleep",
    "skin_temp_delta",
];

/// Sleep window columns, kept as a group when the incoming row has no sleep session
const SLEEP_COLUMNS: [&str; 12] = [
    "sleep_start",
    "sleep_end",
    "sleep_duration_min",
    "sleep_minutes_asleep",
    "sleep_minutes_awake",
    "sleep_onset_latency_min",
    "sleep_type",
    "sleep_deep_min",
    "sleep_light_min",
    "sleep_rem_min",
    "sleep_wake_min",
    "sleep_is_main",
];

/// SQLite-backed [`Repository`]
///
/// A single connection behind a mutex. Every call takes the lock, runs its
/// statements and releases it before returning.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, RepositoryError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::LockPoisoned)
    }

    fn count(conn: &Connection, sql: &str) -> Result<u64, RepositoryError> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

/// Initialize database schema with tables and indexes
fn init_schema(conn: &Connection) -> Result<(), RepositoryError> {
    // journal_mode returns a row, so it cannot go through execute()
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        r#"
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS daily_summaries (
            date TEXT PRIMARY KEY,
            provider TEXT NOT NULL,

            resting_hr INTEGER,
            avg_hr REAL,
            max_hr INTEGER,
            hrv_daily_rmssd REAL,
            hrv_deep_rmssd REAL,
            spo2_avg REAL,
            spo2_min REAL,
            spo2_max REAL,
            br_full_sleep REAL,
            br_deep_sleep REAL,
            br_light_sleep REAL,
            br_rem_sleep REAL,
            skin_temp_delta REAL,

            -- epoch seconds
            sleep_start INTEGER,
            sleep_end INTEGER,
            sleep_duration_min INTEGER,
            sleep_minutes_asleep INTEGER,
            sleep_minutes_awake INTEGER,
            sleep_onset_latency_min INTEGER,
            sleep_type TEXT,
            sleep_deep_min INTEGER,
            sleep_light_min INTEGER,
            sleep_rem_min INTEGER,
            sleep_wake_min INTEGER,
            sleep_is_main BOOLEAN NOT NULL DEFAULT FALSE,

            steps INTEGER,
            distance_km REAL,
            floors INTEGER,
            calories_total INTEGER,
            calories_active INTEGER,
            calories_bmr INTEGER,
            minutes_sedentary INTEGER,
            minutes_lightly_active INTEGER,
            minutes_fairly_active INTEGER,
            minutes_very_active INTEGER,
            vo2_max REAL,
            hr_zone_out_min INTEGER,
            hr_zone_fat_min INTEGER,
            hr_zone_cardio_min INTEGER,
            hr_zone_peak_min INTEGER,

            synced_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS heart_rate_intraday (
            time INTEGER PRIMARY KEY,
            bpm INTEGER NOT NULL,
            confidence INTEGER
        );

        CREATE TABLE IF NOT EXISTS sleep_stages (
            time INTEGER NOT NULL,
            session_id INTEGER NOT NULL,
            stage TEXT NOT NULL,
            seconds INTEGER NOT NULL,
            PRIMARY KEY (time, session_id)
        );

        CREATE TABLE IF NOT EXISTS exercises (
            external_id TEXT PRIMARY KEY,
            activity_name TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            calories INTEGER,
            avg_hr INTEGER,
            distance_km REAL,
            synced_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS data_quality (
            date TEXT PRIMARY KEY,
            wear_time_hours REAL NOT NULL,
            hr_sample_count INTEGER NOT NULL,
            completeness_pct REAL NOT NULL,
            metrics_present TEXT NOT NULL,
            metrics_missing TEXT NOT NULL,
            plausibility_flags TEXT NOT NULL,
            plausibility_pass BOOLEAN NOT NULL,
            is_valid_day BOOLEAN NOT NULL,
            baseline_days INTEGER NOT NULL,
            baseline_maturity TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            confidence_level TEXT NOT NULL,
            computed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sleep_stages_session ON sleep_stages (session_id);
        CREATE INDEX IF NOT EXISTS idx_exercises_started ON exercises (started_at);
        CREATE INDEX IF NOT EXISTS idx_quality_valid ON data_quality (date) WHERE is_valid_day;
        "#,
    )?;
    Ok(())
}

fn summary_upsert_sql() -> String {
    let columns = SUMMARY_COLUMNS.join(", ");
    let placeholders = (1..=SUMMARY_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = SUMMARY_COLUMNS
        .iter()
        .skip(1)
        .map(|c| {
            if PRESERVED_COLUMNS.contains(c) {
                format!("{c} = COALESCE(excluded.{c}, daily_summaries.{c})")
            } else if SLEEP_COLUMNS.contains(c) {
                format!(
                    "{c} = CASE WHEN excluded.sleep_start IS NULL THEN daily_summaries.{c} ELSE excluded.{c} END"
                )
            } else {
                format!("{c} = excluded.{c}")
            }
        })
        .collect::<Vec<_>>()
        .join(",\n            ");

    format!(
        "INSERT INTO daily_summaries ({columns}) VALUES ({placeholders})\n        ON CONFLICT(date) DO UPDATE SET\n            {updates}"
    )
}

fn to_epoch(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

fn conversion_error(column: &str, value: impl fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, format!("invalid {}: {}", column, value).into())
}

fn epoch_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(column)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| conversion_error(column, secs))
}

fn optional_epoch_column(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(column)? {
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| conversion_error(column, secs)),
        None => Ok(None),
    }
}

fn summary_from_row(row: &Row) -> rusqlite::Result<DaySummary> {
    let sleep_type = match row.get::<_, Option<String>>("sleep_type")? {
        Some(s) => Some(SleepType::parse(&s).ok_or_else(|| conversion_error("sleep_type", &s))?),
        None => None,
    };

    Ok(DaySummary {
        date: row.get("date")?,
        provider: row.get("provider")?,
        resting_hr: row.get("resting_hr")?,
        avg_hr: row.get("avg_hr")?,
        max_hr: row.get("max_hr")?,
        hrv_daily_rmssd: row.get("hrv_daily_rmssd")?,
        hrv_deep_rmssd: row.get("hrv_deep_rmssd")?,
        spo2_avg: row.get("spo2_avg")?,
        spo2_min: row.get("spo2_min")?,
        spo2_max: row.get("spo2_max")?,
        br_full_sleep: row.get("br_full_sleep")?,
        br_deep_sleep: row.get("br_deep_sleep")?,
        br_light_sleep: row.get("br_light_sleep")?,
        br_rem_sleep: row.get("br_rem_sleep")?,
        skin_temp_delta: row.get("skin_temp_delta")?,
        sleep_start: optional_epoch_column(row, "sleep_start")?,
        sleep_end: optional_epoch_column(row, "sleep_end")?,
        sleep_duration_min: row.get("sleep_duration_min")?,
        sleep_minutes_asleep: row.get("sleep_minutes_asleep")?,
        sleep_minutes_awake: row.get("sleep_minutes_awake")?,
        sleep_onset_latency_min: row.get("sleep_onset_latency_min")?,
        sleep_type,
        sleep_deep_min: row.get("sleep_deep_min")?,
        sleep_light_min: row.get("sleep_light_min")?,
        sleep_rem_min: row.get("sleep_rem_min")?,
        sleep_wake_min: row.get("sleep_wake_min")?,
        sleep_is_main: row.get("sleep_is_main")?,
        steps: row.get("steps")?,
        distance_km: row.get("distance_km")?,
        floors: row.get("floors")?,
        calories_total: row.get("calories_total")?,
        calories_active: row.get("calories_active")?,
        calories_bmr: row.get("calories_bmr")?,
        minutes_sedentary: row.get("minutes_sedentary")?,
        minutes_lightly_active: row.get("minutes_lightly_active")?,
        minutes_fairly_active: row.get("minutes_fairly_active")?,
        minutes_very_active: row.get("minutes_very_active")?,
        vo2_max: row.get("vo2_max")?,
        hr_zone_out_min: row.get("hr_zone_out_min")?,
        hr_zone_fat_min: row.get("hr_zone_fat_min")?,
        hr_zone_cardio_min: row.get("hr_zone_cardio_min")?,
        hr_zone_peak_min: row.get("hr_zone_peak_min")?,
        synced_at: row.get("synced_at")?,
    })
}

fn stage_event_from_row(row: &Row) -> rusqlite::Result<StageEvent> {
    let stage: String = row.get("stage")?;
    Ok(StageEvent {
        time: epoch_column(row, "time")?,
        stage: StageKind::parse(&stage).ok_or_else(|| conversion_error("stage", &stage))?,
        seconds: row.get("seconds")?,
        session_id: row.get("session_id")?,
    })
}

fn exercise_from_row(row: &Row) -> rusqlite::Result<ExerciseRecord> {
    Ok(ExerciseRecord {
        external_id: row.get("external_id")?,
        activity_name: row.get("activity_name")?,
        started_at: epoch_column(row, "started_at")?,
        duration_ms: row.get("duration_ms")?,
        calories: row.get("calories")?,
        avg_hr: row.get("avg_hr")?,
        distance_km: row.get("distance_km")?,
        synced_at: row.get("synced_at")?,
    })
}

/// `data_quality` row before its JSON and label columns are decoded
struct QualityRow {
    date: NaiveDate,
    wear_time_hours: f64,
    hr_sample_count: u32,
    completeness_pct: f64,
    metrics_present: String,
    metrics_missing: String,
    plausibility_flags: String,
    plausibility_pass: bool,
    is_valid_day: bool,
    baseline_days: u32,
    baseline_maturity: String,
    confidence_score: f64,
    confidence_level: String,
    computed_at: DateTime<Utc>,
}

impl QualityRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get("date")?,
            wear_time_hours: row.get("wear_time_hours")?,
            hr_sample_count: row.get("hr_sample_count")?,
            completeness_pct: row.get("completeness_pct")?,
            metrics_present: row.get("metrics_present")?,
            metrics_missing: row.get("metrics_missing")?,
            plausibility_flags: row.get("plausibility_flags")?,
            plausibility_pass: row.get("plausibility_pass")?,
            is_valid_day: row.get("is_valid_day")?,
            baseline_days: row.get("baseline_days")?,
            baseline_maturity: row.get("baseline_maturity")?,
            confidence_score: row.get("confidence_score")?,
            confidence_level: row.get("confidence_level")?,
            computed_at: row.get("computed_at")?,
        })
    }

    fn decode(self) -> Result<DataQuality, RepositoryError> {
        let plausibility_flags: BTreeMap<String, PlausibilityStatus> =
            serde_json::from_str(&self.plausibility_flags)?;

        let baseline_maturity =
            BaselineMaturity::parse(&self.baseline_maturity).ok_or_else(|| RepositoryError::Corrupt {
                table: "data_quality",
                column: "baseline_maturity",
                value: self.baseline_maturity.clone(),
            })?;
        let confidence_level =
            ConfidenceLevel::parse(&self.confidence_level).ok_or_else(|| RepositoryError::Corrupt {
                table: "data_quality",
                column: "confidence_level",
                value: self.confidence_level.clone(),
            })?;

        Ok(DataQuality {
            date: self.date,
            wear_time_hours: self.wear_time_hours,
            hr_sample_count: self.hr_sample_count,
            completeness_pct: self.completeness_pct,
            metrics_present: serde_json::from_str(&self.metrics_present)?,
            metrics_missing: serde_json::from_str(&self.metrics_missing)?,
            plausibility_flags,
            plausibility_pass: self.plausibility_pass,
            is_valid_day: self.is_valid_day,
            baseline_days: self.baseline_days,
            baseline_maturity,
            confidence_score: self.confidence_score,
            confidence_level,
            computed_at: self.computed_at,
        })
    }
}

const QUALITY_SELECT: &str = "SELECT date, wear_time_hours, hr_sample_count, completeness_pct, \
     metrics_present, metrics_missing, plausibility_flags, plausibility_pass, is_valid_day, \
     baseline_days, baseline_maturity, confidence_score, confidence_level, computed_at \
     FROM data_quality";

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_summary(&self, summary: &DaySummary) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        let s = summary;
        conn.execute(
            &summary_upsert_sql(),
            params![
                s.date,
                s.provider,
                s.resting_hr,
                s.avg_hr,
                s.max_hr,
                s.hrv_daily_rmssd,
                s.hrv_deep_rmssd,
                s.spo2_avg,
                s.spo2_min,
                s.spo2_max,
                s.br_full_sleep,
                s.br_deep_sleep,
                s.br_light_sleep,
                s.br_rem_sleep,
                s.skin_temp_delta,
                s.sleep_start.map(to_epoch),
                s.sleep_end.map(to_epoch),
                s.sleep_duration_min,
                s.sleep_minutes_asleep,
                s.sleep_minutes_awake,
                s.sleep_onset_latency_min,
                s.sleep_type.map(|t| t.as_str()),
                s.sleep_deep_min,
                s.sleep_light_min,
                s.sleep_rem_min,
                s.sleep_wake_min,
                s.sleep_is_main,
                s.steps,
                s.distance_km,
                s.floors,
                s.calories_total,
                s.calories_active,
                s.calories_bmr,
                s.minutes_sedentary,
                s.minutes_lightly_active,
                s.minutes_fairly_active,
                s.minutes_very_active,
                s.vo2_max,
                s.hr_zone_out_min,
                s.hr_zone_fat_min,
                s.hr_zone_cardio_min,
                s.hr_zone_peak_min,
                s.synced_at,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    async fn get_summary(&self, date: NaiveDate) -> Result<Option<DaySummary>, RepositoryError> {
        let conn = self.lock()?;
        let summary = conn
            .query_row(
                "SELECT * FROM daily_summaries WHERE date = ?1",
                params![date],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    async fn list_summaries(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DaySummary>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM daily_summaries WHERE date BETWEEN ?1 AND ?2 ORDER BY date",
        )?;
        let summaries = stmt
            .query_map(params![from, to], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    async fn upsert_intraday(&self, samples: &[IntradaySample]) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO heart_rate_intraday (time, bpm, confidence) VALUES (?1, ?2, ?3)
                 ON CONFLICT(time) DO UPDATE SET bpm = excluded.bpm, confidence = excluded.confidence",
            )?;
            for sample in samples {
                stmt.execute(params![to_epoch(sample.time), sample.bpm, sample.confidence])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_intraday(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<IntradaySample>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT time, bpm, confidence FROM heart_rate_intraday WHERE time >= ?1 AND time < ?2 ORDER BY time",
        )?;
        let samples = stmt
            .query_map(params![to_epoch(from), to_epoch(to)], |row| {
                Ok(IntradaySample {
                    time: epoch_column(row, "time")?,
                    bpm: row.get("bpm")?,
                    confidence: row.get("confidence")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    async fn upsert_stage_events(&self, events: &[StageEvent]) -> Result<(), RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO sleep_stages (time, session_id, stage, seconds) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(time, session_id) DO UPDATE SET stage = excluded.stage, seconds = excluded.seconds",
            )?;
            for event in events {
                stmt.execute(params![
                    to_epoch(event.time),
                    event.session_id,
                    event.stage.as_str(),
                    event.seconds
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn list_stage_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<StageEvent>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT time, session_id, stage, seconds FROM sleep_stages
             WHERE time BETWEEN ?1 AND ?2 ORDER BY time, session_id",
        )?;
        let events = stmt
            .query_map(params![to_epoch(from), to_epoch(to)], stage_event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn upsert_exercise(&self, exercise: &ExerciseRecord) -> Result<(), RepositoryError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO exercises (
                external_id, activity_name, started_at, duration_ms, calories, avg_hr, distance_km, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(external_id) DO UPDATE SET
                activity_name = excluded.activity_name,
                started_at = excluded.started_at,
                duration_ms = excluded.duration_ms,
                calories = excluded.calories,
                avg_hr = excluded.avg_hr,
                distance_km = excluded.distance_km,
                synced_at = excluded.synced_at
            "#,
            params![
                exercise.external_id,
                exercise.activity_name,
                to_epoch(exercise.started_at),
                exercise.duration_ms,
                exercise.calories,
                exercise.avg_hr,
                exercise.distance_km,
                exercise.synced_at,
            ],
        )?;
        Ok(())
    }

    async fn list_exercises(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<ExerciseRecord>, RepositoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM exercises WHERE started_at >= ?1 AND started_at < ?2 ORDER BY started_at",
        )?;
        let exercises = stmt
            .query_map(params![to_epoch(from), to_epoch(to)], exercise_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(exercises)
    }

    async fn upsert_quality(&self, quality: &DataQuality) -> Result<(), RepositoryError> {
        let metrics_present = serde_json::to_string(&quality.metrics_present)?;
        let metrics_missing = serde_json::to_string(&quality.metrics_missing)?;
        let flags = serde_json::to_string(&quality.plausibility_flags)?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO data_quality (
                date, wear_time_hours, hr_sample_count, completeness_pct,
                metrics_present, metrics_missing, plausibility_flags, plausibility_pass,
                is_valid_day, baseline_days, baseline_maturity, confidence_score,
                confidence_level, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(date) DO UPDATE SET
                wear_time_hours = excluded.wear_time_hours,
                hr_sample_count = excluded.hr_sample_count,
                completeness_pct = excluded.completeness_pct,
                metrics_present = excluded.metrics_present,
                metrics_missing = excluded.metrics_missing,
                plausibility_flags = excluded.plausibility_flags,
                plausibility_pass = excluded.plausibility_pass,
                is_valid_day = excluded.is_valid_day,
                baseline_days = excluded.baseline_days,
                baseline_maturity = excluded.baseline_maturity,
                confidence_score = excluded.confidence_score,
                confidence_level = excluded.confidence_level,
                computed_at = excluded.computed_at
            "#,
            params![
                quality.date,
                quality.wear_time_hours,
                quality.hr_sample_count,
                quality.completeness_pct,
                metrics_present,
                metrics_missing,
                flags,
                quality.plausibility_pass,
                quality.is_valid_day,
                quality.baseline_days,
                quality.baseline_maturity.as_str(),
                quality.confidence_score,
                quality.confidence_level.as_str(),
                quality.computed_at,
            ],
        )?;
        Ok(())
    }

    async fn get_quality(&self, date: NaiveDate) -> Result<Option<DataQuality>, RepositoryError> {
        let row = {
            let conn = self.lock()?;
            let row = conn
                .query_row(
                    &format!("{} WHERE date = ?1", QUALITY_SELECT),
                    params![date],
                    QualityRow::from_row,
                )
                .optional()?;
            row
        };
        row.map(QualityRow::decode).transpose()
    }

    async fn list_quality(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DataQuality>, RepositoryError> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "{} WHERE date BETWEEN ?1 AND ?2 ORDER BY date",
                QUALITY_SELECT
            ))?;
            let rows = stmt
                .query_map(params![from, to], QualityRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(QualityRow::decode).collect()
    }

    async fn count_valid_days(&self, before: NaiveDate, window_days: u32) -> Result<u32, RepositoryError> {
        let from = before - Duration::days(i64::from(window_days));
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM data_quality WHERE date >= ?1 AND date < ?2 AND is_valid_day",
            params![from, before],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn stats(&self) -> Result<RepositoryStats, RepositoryError> {
        let conn = self.lock()?;
        Ok(RepositoryStats {
            summaries: Self::count(&conn, "SELECT COUNT(*) FROM daily_summaries")?,
            intraday_samples: Self::count(&conn, "SELECT COUNT(*) FROM heart_rate_intraday")?,
            stage_events: Self::count(&conn, "SELECT COUNT(*) FROM sleep_stages")?,
            exercises: Self::count(&conn, "SELECT COUNT(*) FROM exercises")?,
            quality_records: Self::count(&conn, "SELECT COUNT(*) FROM data_quality")?,
            valid_days: Self::count(&conn, "SELECT COUNT(*) FROM data_quality WHERE is_valid_day")?,
        })
    }
}
