use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::RepositoryError;
use crate::models::{DataQuality, DaySummary, ExerciseRecord, IntradaySample, StageEvent};

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub summaries: u64,
    pub intraday_samples: u64,
    pub stage_events: u64,
    pub exercises: u64,
    pub quality_records: u64,
    pub valid_days: u64,
}

/// Persistence of reconciled data
///
/// Every write is an upsert on the record's natural key: the date for summaries and
/// quality, the timestamp for intraday samples, `(time, session_id)` for stage events
/// and the external id for exercises. Lookups with no data return `None` or an empty
/// list.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Stored HRV, SpO2, breathing-rate and skin-temperature values survive an
    /// upsert that carries none for them.
    async fn upsert_summary(&self, summary: &DaySummary) -> Result<(), RepositoryError>;

    async fn get_summary(&self, date: NaiveDate) -> Result<Option<DaySummary>, RepositoryError>;

    /// Inclusive date range, oldest first
    async fn list_summaries(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DaySummary>, RepositoryError>;

    async fn upsert_intraday(&self, samples: &[IntradaySample]) -> Result<(), RepositoryError>;

    /// Half-open `[from, to)`, time ordered
    async fn list_intraday(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<IntradaySample>, RepositoryError>;

    async fn upsert_stage_events(&self, events: &[StageEvent]) -> Result<(), RepositoryError>;

    /// Inclusive `[from, to]` on event start, in storage order by time
    async fn list_stage_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<StageEvent>, RepositoryError>;

    async fn upsert_exercise(&self, exercise: &ExerciseRecord) -> Result<(), RepositoryError>;

    async fn list_exercises(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<ExerciseRecord>, RepositoryError>;

    async fn upsert_quality(&self, quality: &DataQuality) -> Result<(), RepositoryError>;

    async fn get_quality(&self, date: NaiveDate) -> Result<Option<DataQuality>, RepositoryError>;

    async fn list_quality(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DataQuality>, RepositoryError>;

    /// Valid days in the `window_days` days strictly before `before`
    async fn count_valid_days(&self, before: NaiveDate, window_days: u32) -> Result<u32, RepositoryError>;

    async fn stats(&self) -> Result<RepositoryStats, RepositoryError>;
}
