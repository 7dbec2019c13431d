use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SourceError;
use crate::models::{
    BaselineReading, BreathingRateReading, ExerciseRecord, HrvReading, IntradaySample,
    RawSleepSession, SkinTemperatureReading, SourceValues, SpO2Reading,
};

/// Provider of raw per-day biometrics, keyed by the source that recorded them
///
/// Every call may fail independently. A source with nothing for a date returns an
/// empty map or list; an error means the call itself failed.
#[async_trait]
pub trait BiometricsSource: Send + Sync {
    /// Name used in logs and as the summary's provider label
    fn name(&self) -> &str;

    /// Activity and heart-rate baseline. Failure aborts the date.
    async fn fetch_daily_summary(&self, date: NaiveDate) -> Result<SourceValues<BaselineReading>, SourceError>;

    async fn fetch_hrv(&self, date: NaiveDate) -> Result<SourceValues<HrvReading>, SourceError>;

    async fn fetch_spo2(&self, date: NaiveDate) -> Result<SourceValues<SpO2Reading>, SourceError>;

    async fn fetch_breathing_rate(&self, date: NaiveDate) -> Result<SourceValues<BreathingRateReading>, SourceError>;

    async fn fetch_skin_temperature(&self, date: NaiveDate) -> Result<SourceValues<SkinTemperatureReading>, SourceError>;

    /// Sessions from every source that may belong to the night ending on `date`
    async fn fetch_sleep_sessions(&self, date: NaiveDate) -> Result<Vec<RawSleepSession>, SourceError>;

    async fn fetch_intraday_heart_rate(&self, date: NaiveDate) -> Result<SourceValues<Vec<IntradaySample>>, SourceError>;

    async fn fetch_exercises(&self, date: NaiveDate) -> Result<Vec<ExerciseRecord>, SourceError>;
}
