//! Batch import: export file -> ExportSource -> orchestrator -> SQLite

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use biorecon::config::SourceSettings;
use biorecon::database::SqliteRepository;
use biorecon::day::DayBoundary;
use biorecon::error::ImportError;
use biorecon::import::{ExportData, ExportSource, ImportManager};
use biorecon::merge::PriorityMerger;
use biorecon::models::*;
use biorecon::orchestrator::Orchestrator;
use biorecon::quality::ConfidenceScorer;
use biorecon::repository::Repository;

fn boundary() -> DayBoundary {
    DayBoundary::new(9, 6, 14).unwrap()
}

fn ms(day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

/// Minimal Health Connect backup with two apps: 3 (fitbit) and 5 (nothing_x)
fn write_health_connect_export(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE steps_record_table (app_info_id INTEGER, start_time INTEGER, count INTEGER);
         CREATE TABLE distance_record_table (app_info_id INTEGER, start_time INTEGER, distance REAL);
         CREATE TABLE total_calories_burned_record_table (app_info_id INTEGER, start_time INTEGER, energy REAL);
         CREATE TABLE resting_heart_rate_record_table (app_info_id INTEGER, time INTEGER, beats_per_minute INTEGER);
         CREATE TABLE heart_rate_record_table (row_id INTEGER PRIMARY KEY, app_info_id INTEGER, start_time INTEGER);
         CREATE TABLE heart_rate_record_series_table (parent_key INTEGER, epoch_millis INTEGER, beats_per_minute INTEGER);
         CREATE TABLE heart_rate_variability_rmssd_record_table (app_info_id INTEGER, time INTEGER, heart_rate_variability_millis REAL);
         CREATE TABLE oxygen_saturation_record_table (app_info_id INTEGER, time INTEGER, percentage REAL);
         CREATE TABLE skin_temperature_record_table (row_id INTEGER PRIMARY KEY, app_info_id INTEGER);
         CREATE TABLE skin_temperature_delta_table (parent_key INTEGER, epoch_millis INTEGER, delta REAL);
         CREATE TABLE sleep_session_record_table (row_id INTEGER PRIMARY KEY, app_info_id INTEGER, start_time INTEGER, end_time INTEGER);
         CREATE TABLE sleep_stages_table (parent_key INTEGER, stage_start_time INTEGER, stage_end_time INTEGER, stage_type INTEGER);
         CREATE TABLE exercise_session_record_table (uuid BLOB, exercise_type INTEGER, start_time INTEGER, end_time INTEGER);",
    )
    .unwrap();

    // 2 March local is 1 March 15:00 UTC to 2 March 15:00 UTC
    conn.execute("INSERT INTO steps_record_table VALUES (3, ?1, 6000)", [ms(2, 1, 0)]).unwrap();
    conn.execute("INSERT INTO steps_record_table VALUES (3, ?1, 2500)", [ms(2, 9, 0)]).unwrap();
    conn.execute("INSERT INTO steps_record_table VALUES (5, ?1, 9000)", [ms(2, 2, 0)]).unwrap();
    conn.execute("INSERT INTO distance_record_table VALUES (3, ?1, 6400.0)", [ms(2, 1, 0)]).unwrap();
    conn.execute("INSERT INTO total_calories_burned_record_table VALUES (3, ?1, 2150000.0)", [ms(2, 1, 0)]).unwrap();

    // fitbit resting HR is implausible, nothing_x must win
    conn.execute("INSERT INTO resting_heart_rate_record_table VALUES (3, ?1, 140)", [ms(2, 0, 0)]).unwrap();
    conn.execute("INSERT INTO resting_heart_rate_record_table VALUES (5, ?1, 57)", [ms(2, 0, 0)]).unwrap();

    conn.execute("INSERT INTO heart_rate_variability_rmssd_record_table VALUES (3, ?1, 38.5)", [ms(1, 19, 0)]).unwrap();
    conn.execute("INSERT INTO oxygen_saturation_record_table VALUES (5, ?1, 96.0)", [ms(1, 19, 0)]).unwrap();
    conn.execute("INSERT INTO oxygen_saturation_record_table VALUES (5, ?1, 94.0)", [ms(1, 20, 0)]).unwrap();
    conn.execute("INSERT INTO skin_temperature_record_table VALUES (1, 3)", []).unwrap();
    conn.execute("INSERT INTO skin_temperature_delta_table VALUES (1, ?1, -0.4)", [ms(1, 20, 0)]).unwrap();

    // 11 hours of one-per-minute heart rate from fitbit starting at local midnight
    conn.execute("INSERT INTO heart_rate_record_table VALUES (1, 3, ?1)", [ms(1, 15, 0)]).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
    let tx = conn.unchecked_transaction().unwrap();
    for minute in 0..660 {
        let time = (start + Duration::minutes(minute)).timestamp_millis();
        tx.execute(
            "INSERT INTO heart_rate_record_series_table VALUES (1, ?1, ?2)",
            params![time, 60 + minute % 10],
        )
        .unwrap();
    }
    tx.commit().unwrap();

    // 23:00-06:00 local, one stage per hour
    conn.execute(
        "INSERT INTO sleep_session_record_table VALUES (77, 3, ?1, ?2)",
        params![ms(1, 14, 0), ms(1, 21, 0)],
    )
    .unwrap();
    for (hour, code) in [(14, 1), (15, 4), (16, 5), (17, 4), (18, 6), (19, 2), (20, 3)] {
        conn.execute(
            "INSERT INTO sleep_stages_table VALUES (77, ?1, ?2, ?3)",
            params![ms(1, hour, 0), ms(1, hour + 1, 0), code],
        )
        .unwrap();
    }

    conn.execute(
        "INSERT INTO exercise_session_record_table VALUES (?1, 53, ?2, ?3)",
        params![vec![0xabu8; 16], ms(2, 0, 0), ms(2, 0, 45)],
    )
    .unwrap();
}

fn orchestrator(data: ExportData, repository: Arc<SqliteRepository>) -> Orchestrator {
    let sources = SourceSettings::default();
    Orchestrator::new(
        Arc::new(ExportSource::new(data, boundary(), "health_connect")),
        repository,
        PriorityMerger::new(sources.source_priority()),
        boundary(),
        ConfidenceScorer::default(),
    )
}

#[tokio::test]
async fn test_health_connect_import_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let export_path = dir.path().join("health_connect_export.db");
    write_health_connect_export(&export_path);

    let manager = ImportManager::new(&SourceSettings::default(), boundary());
    let data = manager.read(&export_path).unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    assert_eq!(data.dates(), vec![date]);
    assert_eq!(data.sources(), vec![SourceId::new("fitbit"), SourceId::new("nothing_x")]);

    let repository = Arc::new(SqliteRepository::open(dir.path().join("biorecon.db")).unwrap());
    let orchestrator = orchestrator(data, repository.clone());
    let batch = orchestrator
        .reconcile_range(&[date], &CancellationToken::new(), None)
        .await;
    assert_eq!(batch.reconciled.len(), 1);
    assert!(batch.failures.is_empty());

    let summary = repository.get_summary(date).await.unwrap().unwrap();
    assert_eq!(summary.provider, "health_connect");
    assert_eq!(summary.steps, Some(8500));
    assert_eq!(summary.resting_hr, Some(57));
    assert_eq!(summary.distance_km, Some(6.4));
    assert_eq!(summary.calories_total, Some(2150));
    assert_eq!(summary.hrv_daily_rmssd, Some(38.5));
    assert_eq!(summary.spo2_avg, Some(95.0));
    assert_eq!(summary.spo2_min, Some(94.0));
    assert_eq!(summary.skin_temp_delta, Some(-0.4));
    assert_eq!(summary.max_hr, Some(69));

    // stage code 3 (out of bed) has no bucket
    assert_eq!(summary.sleep_duration_min, Some(420));
    assert_eq!(summary.sleep_wake_min, Some(60));
    assert_eq!(summary.sleep_light_min, Some(180));
    assert_eq!(summary.sleep_deep_min, Some(60));
    assert_eq!(summary.sleep_rem_min, Some(60));
    assert_eq!(summary.sleep_onset_latency_min, Some(60));

    let quality = repository.get_quality(date).await.unwrap().unwrap();
    assert_eq!(quality.hr_sample_count, 660);
    assert!((quality.wear_time_hours - 11.0).abs() < 1e-9);
    assert!(quality.is_valid_day);

    let (from, to) = boundary().day_range(date);
    let exercises = repository.list_exercises(from, to).await.unwrap();
    assert_eq!(exercises.len(), 1);
    assert_eq!(exercises[0].activity_name, "Walking");
    assert_eq!(exercises[0].external_id, format!("hc-{}", "ab".repeat(16)));

    let timeline = orchestrator.stage_timeline(date).await.unwrap();
    assert_eq!(timeline.len(), 6);
    assert!(timeline.iter().all(|e| e.session_id == 77));
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let export_path = dir.path().join("export.db");
    write_health_connect_export(&export_path);
    let manager = ImportManager::new(&SourceSettings::default(), boundary());
    let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

    let repository = Arc::new(SqliteRepository::open(dir.path().join("biorecon.db")).unwrap());
    for _ in 0..2 {
        let data = manager.read(&export_path).unwrap();
        orchestrator(data, repository.clone())
            .reconcile(date, &CancellationToken::new())
            .await
            .unwrap();
    }

    let stats = repository.stats().await.unwrap();
    assert_eq!(stats.summaries, 1);
    assert_eq!(stats.quality_records, 1);
    assert_eq!(stats.intraday_samples, 660);
    assert_eq!(stats.stage_events, 6);
    assert_eq!(stats.exercises, 1);
}

#[tokio::test]
async fn test_json_batch_skips_days_without_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.json");
    std::fs::write(
        &path,
        r#"{
            "days": {
                "2024-03-01": { "baseline": { "fitbit": { "resting_hr": 60, "steps": 7000 } } },
                "2024-03-02": { "hrv": { "fitbit": { "daily_rmssd": 45.0 } } },
                "2024-03-03": { "baseline": { "nothing_x": { "resting_hr": 62, "steps": 5000 } } }
            }
        }"#,
    )
    .unwrap();

    let manager = ImportManager::new(&SourceSettings::default(), boundary());
    let data = manager.read(&path).unwrap();
    let dates = data.dates();
    assert_eq!(dates.len(), 3);

    let repository = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let batch = orchestrator(data, repository.clone())
        .reconcile_range(&dates, &CancellationToken::new(), None)
        .await;

    assert_eq!(batch.reconciled.len(), 2);
    assert_eq!(batch.skipped_count(), 1);
    assert_eq!(batch.failed_count(), 0);
    assert_eq!(batch.failures[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    assert!(!batch.cancelled);

    let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
    let summaries = repository.list_summaries(from, to).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].resting_hr, Some(62));
}

#[tokio::test]
async fn test_cancelled_batch_stops() {
    let mut data = ExportData::default();
    for day in 1..=3 {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        data.baseline_mut(date, SourceId::new("fitbit")).steps = Some(1000);
    }
    let dates = data.dates();

    let token = CancellationToken::new();
    token.cancel();
    let repository = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let batch = orchestrator(data, repository.clone()).reconcile_range(&dates, &token, None).await;

    assert!(batch.cancelled);
    assert!(batch.reconciled.is_empty());
    assert_eq!(repository.stats().await.unwrap().summaries, 0);
}

#[test]
fn test_unknown_export_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workout.fit");
    std::fs::write(&path, [0u8; 12]).unwrap();

    let manager = ImportManager::new(&SourceSettings::default(), boundary());
    assert!(matches!(manager.read(&path), Err(ImportError::UnsupportedFormat { .. })));
}
