use async_trait::async_trait;
use chrono::NaiveDate;

use super::{ExportData, ExportDay};
use crate::day::DayBoundary;
use crate::error::SourceError;
use crate::models::{
    BaselineReading, BreathingRateReading, ExerciseRecord, HrvReading, IntradaySample,
    RawSleepSession, SkinTemperatureReading, SourceValues, SpO2Reading,
};
use crate::source::BiometricsSource;

/// Serves a parsed export through the same interface as a live provider
pub struct ExportSource {
    data: ExportData,
    boundary: DayBoundary,
    name: String,
}

impl ExportSource {
    pub fn new(data: ExportData, boundary: DayBoundary, name: impl Into<String>) -> Self {
        Self { data, boundary, name: name.into() }
    }

    fn day(&self, date: NaiveDate) -> Option<&ExportDay> {
        self.data.days.get(&date)
    }

    fn per_day<T: Clone>(&self, date: NaiveDate, pick: impl Fn(&ExportDay) -> &SourceValues<T>) -> SourceValues<T> {
        self.day(date).map(|day| pick(day).clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BiometricsSource for ExportSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_daily_summary(&self, date: NaiveDate) -> Result<SourceValues<BaselineReading>, SourceError> {
        self.day(date)
            .map(|day| day.baseline.clone())
            .ok_or(SourceError::NoData { metric: "daily summary", date })
    }

    async fn fetch_hrv(&self, date: NaiveDate) -> Result<SourceValues<HrvReading>, SourceError> {
        Ok(self.per_day(date, |day| &day.hrv))
    }

    async fn fetch_spo2(&self, date: NaiveDate) -> Result<SourceValues<SpO2Reading>, SourceError> {
        Ok(self.per_day(date, |day| &day.spo2))
    }

    async fn fetch_breathing_rate(&self, date: NaiveDate) -> Result<SourceValues<BreathingRateReading>, SourceError> {
        Ok(self.per_day(date, |day| &day.breathing_rate))
    }

    async fn fetch_skin_temperature(&self, date: NaiveDate) -> Result<SourceValues<SkinTemperatureReading>, SourceError> {
        Ok(self.per_day(date, |day| &day.skin_temperature))
    }

    async fn fetch_sleep_sessions(&self, date: NaiveDate) -> Result<Vec<RawSleepSession>, SourceError> {
        let (from, to) = self.boundary.sleep_window(date);
        Ok(self
            .data
            .sleep_sessions
            .iter()
            .filter(|s| s.start < to && s.end > from)
            .cloned()
            .collect())
    }

    async fn fetch_intraday_heart_rate(&self, date: NaiveDate) -> Result<SourceValues<Vec<IntradaySample>>, SourceError> {
        let (from, to) = self.boundary.day_range(date);
        Ok(self
            .data
            .heart_rate
            .iter()
            .map(|(source, samples)| {
                let day: Vec<IntradaySample> = samples
                    .iter()
                    .filter(|s| s.time >= from && s.time < to)
                    .cloned()
                    .collect();
                (source.clone(), day)
            })
            .filter(|(_, samples)| !samples.is_empty())
            .collect())
    }

    async fn fetch_exercises(&self, date: NaiveDate) -> Result<Vec<ExerciseRecord>, SourceError> {
        let (from, to) = self.boundary.day_range(date);
        Ok(self
            .data
            .exercises
            .iter()
            .filter(|e| e.started_at >= from && e.started_at < to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(h: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, 0, 0).unwrap()
    }

    fn source() -> ExportSource {
        let mut data = ExportData::default();
        let fitbit = SourceId::new("fitbit");
        data.baseline_mut(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), fitbit.clone()).steps = Some(10);
        data.sleep_sessions = vec![
            // 23:00-06:00 JST, night ending 2 March
            RawSleepSession { session_id: 1, source: fitbit.clone(), start: at(14, 1), end: at(21, 1), stages: vec![] },
            // afternoon nap on 2 March, after the overnight window
            RawSleepSession { session_id: 2, source: fitbit.clone(), start: at(6, 2), end: at(7, 2), stages: vec![] },
        ];
        data.heart_rate.insert(
            fitbit,
            vec![
                IntradaySample { time: at(14, 1), bpm: 60, confidence: None },
                IntradaySample { time: at(15, 1), bpm: 61, confidence: None },
                IntradaySample { time: at(15, 1) + Duration::days(1), bpm: 62, confidence: None },
            ],
        );
        ExportSource::new(data, DayBoundary::new(9, 6, 14).unwrap(), "health_connect")
    }

    #[tokio::test]
    async fn test_missing_day_is_no_data() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let err = source().fetch_daily_summary(date).await.unwrap_err();
        assert!(matches!(err, SourceError::NoData { .. }));
        assert!(source().fetch_hrv(date).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sleep_sessions_filtered_to_overnight_window() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let sessions = source().fetch_sleep_sessions(date).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, 1);
    }

    #[tokio::test]
    async fn test_intraday_filtered_to_local_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let series = source().fetch_intraday_heart_rate(date).await.unwrap();
        // 14:00 UTC on 1 March is 23:00 local on 1 March; 15:00 UTC is local midnight
        let bpms: Vec<u16> = series[&SourceId::new("fitbit")].iter().map(|s| s.bpm).collect();
        assert_eq!(bpms, vec![61]);
    }
}
