//! End-to-end reconciliation of one date
//!
//! A run moves through fixed phases:
//!
//! ```text
//! Fetching -> Enriching -> SummaryPersisted -> SubordinatePersisting -> QualityComputed -> Done
//! ```
//!
//! Only the baseline fetch and the summary write can fail a run. Every other step
//! degrades: the failure is logged, recorded on the [`SyncReport`] and the run moves on.
//! Nothing is retried here; re-running a date is always safe because every write is an
//! upsert on its natural key.

use chrono::{DateTime, NaiveDate, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::day::DayBoundary;
use crate::error::{ErrorSeverity, ReconError, Result, SourceError};
use crate::merge::PriorityMerger;
use crate::models::{BaselineReading, DataQuality, DaySummary, SourceValues, StageEvent};
use crate::plausibility::predicates;
use crate::quality::ConfidenceScorer;
use crate::repository::Repository;
use crate::sleep::{ReconstructedSleep, SleepSessionReconstructor};
use crate::source::BiometricsSource;
use crate::timeline;

/// Phase a run has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Fetching,
    Enriching,
    SummaryPersisted,
    SubordinatePersisting,
    QualityComputed,
    Done,
}

/// A step that may fail without failing the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Hrv,
    Spo2,
    BreathingRate,
    SkinTemperature,
    Sleep,
    IntradayFetch,
    IntradayWrite,
    StageEventWrite,
    ExerciseFetch,
    ExerciseWrite,
    BaselineHistory,
    QualityWrite,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Hrv => "hrv",
            SyncStep::Spo2 => "spo2",
            SyncStep::BreathingRate => "breathing_rate",
            SyncStep::SkinTemperature => "skin_temperature",
            SyncStep::Sleep => "sleep",
            SyncStep::IntradayFetch => "intraday_fetch",
            SyncStep::IntradayWrite => "intraday_write",
            SyncStep::StageEventWrite => "stage_event_write",
            SyncStep::ExerciseFetch => "exercise_fetch",
            SyncStep::ExerciseWrite => "exercise_write",
            SyncStep::BaselineHistory => "baseline_history",
            SyncStep::QualityWrite => "quality_write",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step that failed and was skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub step: SyncStep,
    pub reason: String,
}

/// Outcome of one successful run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub date: NaiveDate,
    pub phase: SyncPhase,
    pub degradations: Vec<Degradation>,
    pub intraday_samples: usize,
    pub stage_events: usize,
    pub exercises: usize,

    /// Present only when the quality record was written
    pub quality: Option<DataQuality>,
}

impl SyncReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            phase: SyncPhase::Fetching,
            degradations: Vec::new(),
            intraday_samples: 0,
            stage_events: 0,
            exercises: 0,
            quality: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn degraded(&self, step: SyncStep) -> bool {
        self.degradations.iter().any(|d| d.step == step)
    }

    fn degrade(&mut self, step: SyncStep, reason: impl fmt::Display) {
        let reason = reason.to_string();
        warn!(step = %step, error = %reason, "step failed, continuing");
        self.degradations.push(Degradation { step, reason });
    }

    fn advance(&mut self, phase: SyncPhase) {
        debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }
}

/// A date the batch could not reconcile
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub date: NaiveDate,
    pub error: String,

    /// Missing input rather than a real failure
    pub skipped: bool,
}

/// Outcome of reconciling a run of dates
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reconciled: Vec<SyncReport>,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn degraded_count(&self) -> usize {
        self.reconciled.iter().filter(|r| r.is_degraded()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.failures.iter().filter(|f| f.skipped).count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len() - self.skipped_count()
    }
}

/// Drives reconciliation of dates from one source into one repository
pub struct Orchestrator {
    source: Arc<dyn BiometricsSource>,
    repository: Arc<dyn Repository>,
    merger: PriorityMerger,
    boundary: DayBoundary,
    scorer: ConfidenceScorer,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn BiometricsSource>,
        repository: Arc<dyn Repository>,
        merger: PriorityMerger,
        boundary: DayBoundary,
        scorer: ConfidenceScorer,
    ) -> Self {
        Self { source, repository, merger, boundary, scorer }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Produce and persist the summary and quality record for `date`
    pub async fn reconcile(&self, date: NaiveDate, token: &CancellationToken) -> Result<SyncReport> {
        let span = info_span!("reconcile", date = %date, source = self.source.name());
        self.run(date, token).instrument(span).await
    }

    async fn run(&self, date: NaiveDate, token: &CancellationToken) -> Result<SyncReport> {
        let mut report = SyncReport::new(date);

        let baseline = until_cancelled(date, token, self.source.fetch_daily_summary(date))
            .await?
            .map_err(|source| ReconError::FatalFetch { date, source })?;
        if !baseline.keys().any(|s| self.merger.priority().rank(s).is_some()) {
            return Err(ReconError::FatalFetch {
                date,
                source: SourceError::NoData { metric: "daily summary", date },
            });
        }
        let mut summary = self.merge_baseline(date, &baseline);

        report.advance(SyncPhase::Enriching);
        let sleep = self.enrich(&mut summary, &mut report, token).await?;

        until_cancelled(date, token, self.repository.upsert_summary(&summary))
            .await?
            .map_err(|source| ReconError::PersistenceWrite { date, source })?;
        report.advance(SyncPhase::SummaryPersisted);

        report.advance(SyncPhase::SubordinatePersisting);
        let hr_sample_count = self.persist_intraday(date, &mut report, token).await?;
        if let Some(sleep) = &sleep {
            self.persist_stage_events(date, &sleep.stage_events, &mut report, token).await?;
        }
        self.persist_exercises(date, &mut report, token).await?;

        // score the row the merge-preserving upsert left behind
        let stored = match until_cancelled(date, token, self.repository.get_summary(date)).await? {
            Ok(Some(stored)) => stored,
            Ok(None) => summary,
            Err(e) => {
                warn!(error = %e, "stored summary unreadable, scoring the merged one");
                summary
            }
        };
        let quality = self.score(&stored, hr_sample_count, &mut report, token).await?;
        match until_cancelled(date, token, self.repository.upsert_quality(&quality)).await? {
            Ok(()) => report.quality = Some(quality),
            Err(e) => report.degrade(SyncStep::QualityWrite, e),
        }
        report.advance(SyncPhase::QualityComputed);

        report.advance(SyncPhase::Done);
        info!(
            degradations = report.degradations.len(),
            intraday = report.intraday_samples,
            stages = report.stage_events,
            exercises = report.exercises,
            "date reconciled"
        );
        Ok(report)
    }

    /// Merge every baseline field across sources
    pub fn merge_baseline(&self, date: NaiveDate, readings: &SourceValues<BaselineReading>) -> DaySummary {
        let merger = &self.merger;
        let mut summary = DaySummary::empty(date, self.source.name());

        summary.resting_hr = merger.merge_by(readings, |r| r.resting_hr, predicates::resting_hr);
        if let Some(hr) = merger.merge_by(readings, |r| r.heart_rate, predicates::heart_rate) {
            summary.avg_hr = Some(hr.average);
            summary.max_hr = Some(hr.max);
        }

        summary.steps = merger.merge_by(readings, |r| r.steps, predicates::steps);
        summary.distance_km = merger.merge_by(readings, |r| r.distance_km, predicates::distance_km);
        summary.floors = merger.merge_by(readings, |r| r.floors, predicates::any);
        summary.vo2_max = merger.merge_by(readings, |r| r.vo2_max, predicates::any);

        if let Some(calories) = merger.merge_by(readings, |r| r.calories, predicates::calories) {
            summary.calories_total = calories.total;
            summary.calories_active = calories.active;
            summary.calories_bmr = calories.bmr;
        }

        if let Some(minutes) = merger.merge_by(readings, |r| r.activity_minutes, predicates::any) {
            summary.minutes_sedentary = Some(minutes.sedentary);
            summary.minutes_lightly_active = Some(minutes.lightly);
            summary.minutes_fairly_active = Some(minutes.fairly);
            summary.minutes_very_active = Some(minutes.very);
        }

        if let Some(zones) = merger.merge_by(readings, |r| r.hr_zones, predicates::any) {
            summary.hr_zone_out_min = Some(zones.out_of_range);
            summary.hr_zone_fat_min = Some(zones.fat_burn);
            summary.hr_zone_cardio_min = Some(zones.cardio);
            summary.hr_zone_peak_min = Some(zones.peak);
        }

        summary
    }

    /// Run the five enrichment fetches concurrently and fold whatever succeeded
    async fn enrich(
        &self,
        summary: &mut DaySummary,
        report: &mut SyncReport,
        token: &CancellationToken,
    ) -> Result<Option<ReconstructedSleep>> {
        let date = summary.date;
        let source = &self.source;
        let (hrv, spo2, breathing, skin, sessions) = until_cancelled(date, token, async {
            tokio::join!(
                source.fetch_hrv(date),
                source.fetch_spo2(date),
                source.fetch_breathing_rate(date),
                source.fetch_skin_temperature(date),
                source.fetch_sleep_sessions(date),
            )
        })
        .await?;

        match hrv {
            Ok(values) => {
                if let Some(hrv) = self.merger.merge(&values, predicates::hrv) {
                    summary.hrv_daily_rmssd = hrv.daily_rmssd;
                    summary.hrv_deep_rmssd = hrv.deep_rmssd;
                }
            }
            Err(e) => report.degrade(SyncStep::Hrv, e),
        }

        match spo2 {
            Ok(values) => {
                if let Some(spo2) = self.merger.merge(&values, predicates::spo2) {
                    summary.spo2_avg = spo2.avg;
                    summary.spo2_min = spo2.min;
                    summary.spo2_max = spo2.max;
                }
            }
            Err(e) => report.degrade(SyncStep::Spo2, e),
        }

        match breathing {
            Ok(values) => {
                if let Some(br) = self.merger.merge(&values, predicates::breathing_rate) {
                    summary.br_full_sleep = br.full_sleep;
                    summary.br_deep_sleep = br.deep_sleep;
                    summary.br_light_sleep = br.light_sleep;
                    summary.br_rem_sleep = br.rem_sleep;
                }
            }
            Err(e) => report.degrade(SyncStep::BreathingRate, e),
        }

        match skin {
            Ok(values) => {
                if let Some(skin) = self.merger.merge(&values, predicates::skin_temperature) {
                    summary.skin_temp_delta = skin.delta;
                }
            }
            Err(e) => report.degrade(SyncStep::SkinTemperature, e),
        }

        let sleep = match sessions {
            Ok(sessions) => {
                let reconstructed = SleepSessionReconstructor::new(&self.merger)
                    .reconstruct(&sessions, self.boundary.sleep_window(date));
                match &reconstructed {
                    Some(sleep) => {
                        debug!(
                            source = %sleep.candidate.source,
                            session_id = sleep.candidate.session_id,
                            minutes = sleep.candidate.duration_min,
                            "sleep session chosen"
                        );
                        sleep.apply_to(summary);
                    }
                    None => debug!(candidates = sessions.len(), "no sleep session for date"),
                }
                reconstructed
            }
            Err(e) => {
                report.degrade(SyncStep::Sleep, e);
                None
            }
        };

        Ok(sleep)
    }

    /// Returns the number of stored per-minute samples inside the local day
    async fn persist_intraday(&self, date: NaiveDate, report: &mut SyncReport, token: &CancellationToken) -> Result<u32> {
        let series = match until_cancelled(date, token, self.source.fetch_intraday_heart_rate(date)).await? {
            Ok(series) => series,
            Err(e) => {
                report.degrade(SyncStep::IntradayFetch, e);
                return Ok(0);
            }
        };

        let merged = self.merger.merge_intraday(&series);
        if merged.is_empty() {
            return Ok(0);
        }

        match until_cancelled(date, token, self.repository.upsert_intraday(&merged)).await? {
            Ok(()) => report.intraday_samples = merged.len(),
            Err(e) => report.degrade(SyncStep::IntradayWrite, e),
        }

        let (from, to) = self.boundary.day_range(date);
        let in_day = merged.iter().filter(|s| in_range(s.time, from, to)).count();
        Ok(u32::try_from(in_day).unwrap_or(u32::MAX))
    }

    async fn persist_stage_events(
        &self,
        date: NaiveDate,
        events: &[StageEvent],
        report: &mut SyncReport,
        token: &CancellationToken,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        match until_cancelled(date, token, self.repository.upsert_stage_events(events)).await? {
            Ok(()) => report.stage_events = events.len(),
            Err(e) => report.degrade(SyncStep::StageEventWrite, e),
        }
        Ok(())
    }

    async fn persist_exercises(&self, date: NaiveDate, report: &mut SyncReport, token: &CancellationToken) -> Result<()> {
        let exercises = match until_cancelled(date, token, self.source.fetch_exercises(date)).await? {
            Ok(exercises) => exercises,
            Err(e) => {
                report.degrade(SyncStep::ExerciseFetch, e);
                return Ok(());
            }
        };

        for exercise in &exercises {
            match until_cancelled(date, token, self.repository.upsert_exercise(exercise)).await? {
                Ok(()) => report.exercises += 1,
                Err(e) => report.degrade(SyncStep::ExerciseWrite, format!("{}: {}", exercise.external_id, e)),
            }
        }
        Ok(())
    }

    async fn score(
        &self,
        summary: &DaySummary,
        hr_sample_count: u32,
        report: &mut SyncReport,
        token: &CancellationToken,
    ) -> Result<DataQuality> {
        let lookback = self.scorer.settings().baseline_lookback_days;
        let count = self.repository.count_valid_days(summary.date, lookback);
        let baseline_days = match until_cancelled(summary.date, token, count).await? {
            Ok(days) => days,
            Err(e) => {
                report.degrade(SyncStep::BaselineHistory, e);
                0
            }
        };

        let quality = self.scorer.score(summary, hr_sample_count, baseline_days);
        debug!(
            confidence = quality.confidence_score,
            level = quality.confidence_level.as_str(),
            valid = quality.is_valid_day,
            "quality computed"
        );
        Ok(quality)
    }

    /// Clean stage timeline for the night belonging to `date`
    pub async fn stage_timeline(&self, date: NaiveDate) -> Result<Vec<StageEvent>> {
        Ok(timeline::stage_timeline(self.repository.as_ref(), &self.boundary, date).await?)
    }

    /// Reconcile dates in order. A failing date is recorded and the batch moves on;
    /// cancellation stops the batch.
    pub async fn reconcile_range(
        &self,
        dates: &[NaiveDate],
        token: &CancellationToken,
        progress: Option<&ProgressBar>,
    ) -> BatchReport {
        let mut batch = BatchReport::default();

        for &date in dates {
            if token.is_cancelled() {
                batch.cancelled = true;
                break;
            }

            if let Some(pb) = progress {
                pb.set_message(date.to_string());
            }

            match self.reconcile(date, token).await {
                Ok(report) => batch.reconciled.push(report),
                Err(ReconError::Cancelled { .. }) => {
                    info!(date = %date, "batch cancelled");
                    batch.cancelled = true;
                    break;
                }
                Err(e) => {
                    let skipped = e.severity() == ErrorSeverity::Warning;
                    if skipped {
                        warn!(date = %date, error = %e, "date skipped");
                    } else {
                        tracing::error!(date = %date, error = %e, "date failed");
                    }
                    batch.failures.push(BatchFailure { date, error: e.to_string(), skipped });
                }
            }

            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        info!(
            reconciled = batch.reconciled.len(),
            degraded = batch.degraded_count(),
            skipped = batch.skipped_count(),
            failed = batch.failed_count(),
            cancelled = batch.cancelled,
            "batch finished"
        );
        batch
    }
}

/// Race an I/O future against the cancellation token
async fn until_cancelled<F: Future>(date: NaiveDate, token: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ReconError::Cancelled { date }),
        out = fut => Ok(out),
    }
}

fn in_range(time: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    time >= from && time < to
}
