//! Completeness and confidence scoring for a reconciled day

use chrono::Utc;

use crate::config::QualitySettings;
use crate::models::{BaselineMaturity, ConfidenceLevel, DataQuality, DaySummary};
use crate::plausibility::PlausibilityChecker;

/// Tracked metrics, in reporting order
pub const TRACKED_METRICS: [&str; 7] = ["hr", "hrv", "spo2", "sleep", "activity", "br", "temp"];

const COMPLETENESS_WEIGHT: f64 = 0.4;
const WEAR_WEIGHT: f64 = 0.3;
const BASELINE_WEIGHT: f64 = 0.3;

/// Which tracked metrics a day has
#[derive(Debug, Clone, PartialEq)]
pub struct Completeness {
    pub present: Vec<String>,
    pub missing: Vec<String>,

    /// present / tracked, in `[0, 1]`
    pub fraction: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompletenessScorer;

impl CompletenessScorer {
    pub fn score(&self, summary: &DaySummary) -> Completeness {
        let (present, missing): (Vec<&str>, Vec<&str>) = TRACKED_METRICS
            .iter()
            .partition(|metric| Self::is_present(summary, metric));

        let fraction = present.len() as f64 / TRACKED_METRICS.len() as f64;

        Completeness {
            present: present.into_iter().map(str::to_string).collect(),
            missing: missing.into_iter().map(str::to_string).collect(),
            fraction,
        }
    }

    fn is_present(summary: &DaySummary, metric: &str) -> bool {
        match metric {
            "hr" => summary.resting_hr.is_some(),
            "hrv" => summary.hrv_daily_rmssd.is_some(),
            "spo2" => summary.spo2_avg.is_some(),
            "sleep" => summary.sleep_duration_min.is_some(),
            "activity" => summary.steps.is_some(),
            "br" => summary.br_full_sleep.is_some(),
            "temp" => summary.skin_temp_delta.is_some(),
            _ => false,
        }
    }
}

/// Builds the [`DataQuality`] record for a day
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    settings: QualitySettings,
    plausibility: PlausibilityChecker,
    completeness: CompletenessScorer,
}

impl ConfidenceScorer {
    pub fn new(settings: QualitySettings) -> Self {
        Self {
            settings,
            plausibility: PlausibilityChecker,
            completeness: CompletenessScorer,
        }
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    /// `hr_sample_count` is the number of per-minute intraday samples for the day;
    /// `baseline_days` the count of valid days in the trailing lookback window.
    pub fn score(&self, summary: &DaySummary, hr_sample_count: u32, baseline_days: u32) -> DataQuality {
        let plausibility = self.plausibility.check(summary);
        let plausibility_pass = plausibility.passed();
        let completeness = self.completeness.score(summary);

        let wear_time_hours = f64::from(hr_sample_count) / 60.0;
        let is_valid_day = wear_time_hours >= self.settings.valid_day_min_wear_hours && plausibility_pass;

        let confidence_score = self.composite(completeness.fraction, wear_time_hours, baseline_days);

        DataQuality {
            date: summary.date,
            wear_time_hours,
            hr_sample_count,
            completeness_pct: completeness.fraction,
            metrics_present: completeness.present,
            metrics_missing: completeness.missing,
            plausibility_flags: plausibility.flags,
            plausibility_pass,
            is_valid_day,
            baseline_days,
            baseline_maturity: self.maturity(baseline_days),
            confidence_score,
            confidence_level: confidence_level(confidence_score),
            computed_at: Utc::now(),
        }
    }

    pub fn maturity(&self, baseline_days: u32) -> BaselineMaturity {
        if baseline_days < self.settings.cold_below_days {
            BaselineMaturity::Cold
        } else if baseline_days < self.settings.baseline_lookback_days {
            BaselineMaturity::Warming
        } else {
            BaselineMaturity::Mature
        }
    }

    fn composite(&self, completeness: f64, wear_time_hours: f64, baseline_days: u32) -> f64 {
        let wear = (wear_time_hours / self.settings.wear_hours_target).min(1.0);
        let baseline = (f64::from(baseline_days) / f64::from(self.settings.baseline_lookback_days)).min(1.0);
        let score = COMPLETENESS_WEIGHT * completeness.clamp(0.0, 1.0) + WEAR_WEIGHT * wear + BASELINE_WEIGHT * baseline;
        score.clamp(0.0, 1.0)
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(QualitySettings::default())
    }
}

pub fn confidence_level(score: f64) -> ConfidenceLevel {
    if score < 0.4 {
        ConfidenceLevel::Low
    } else if score <= 0.7 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> DaySummary {
        DaySummary::empty(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), "fitbit")
    }

    fn complete_day() -> DaySummary {
        let mut s = day();
        s.resting_hr = Some(55);
        s.hrv_daily_rmssd = Some(48.0);
        s.spo2_avg = Some(96.5);
        s.sleep_duration_min = Some(450);
        s.steps = Some(9000);
        s.br_full_sleep = Some(14.2);
        s.skin_temp_delta = Some(-0.3);
        s
    }

    #[test]
    fn test_completeness_four_of_seven() {
        let mut s = day();
        s.resting_hr = Some(58);
        s.hrv_daily_rmssd = Some(40.0);
        s.sleep_duration_min = Some(420);
        s.steps = Some(8000);

        let c = CompletenessScorer.score(&s);
        assert_eq!(c.present, vec!["hr", "hrv", "sleep", "activity"]);
        assert_eq!(c.missing, vec!["spo2", "br", "temp"]);
        assert!((c.fraction - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_steps_still_present() {
        let mut s = day();
        s.steps = Some(0);
        assert!(CompletenessScorer.score(&s).present.contains(&"activity".to_string()));
    }

    #[test]
    fn test_confidence_worked_example() {
        let quality = ConfidenceScorer::default().score(&complete_day(), 600, 30);
        assert!((quality.wear_time_hours - 10.0).abs() < 1e-9);
        assert!((quality.confidence_score - 0.7375).abs() < 1e-9);
        assert_eq!(quality.confidence_level, ConfidenceLevel::High);
        assert_eq!(quality.baseline_maturity, BaselineMaturity::Warming);
        assert!(quality.is_valid_day);
    }

    #[test]
    fn test_valid_day_needs_wear_time() {
        // 594 samples = 9.9 hours
        let quality = ConfidenceScorer::default().score(&complete_day(), 594, 0);
        assert!(quality.plausibility_pass);
        assert!(!quality.is_valid_day);
    }

    #[test]
    fn test_valid_day_needs_plausibility() {
        let mut s = complete_day();
        s.resting_hr = Some(140);
        let quality = ConfidenceScorer::default().score(&s, 1000, 0);
        assert!(!quality.plausibility_pass);
        assert!(!quality.is_valid_day);
    }

    #[test]
    fn test_maturity_thresholds() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.maturity(0), BaselineMaturity::Cold);
        assert_eq!(scorer.maturity(13), BaselineMaturity::Cold);
        assert_eq!(scorer.maturity(14), BaselineMaturity::Warming);
        assert_eq!(scorer.maturity(59), BaselineMaturity::Warming);
        assert_eq!(scorer.maturity(60), BaselineMaturity::Mature);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(confidence_level(0.39), ConfidenceLevel::Low);
        assert_eq!(confidence_level(0.4), ConfidenceLevel::Medium);
        assert_eq!(confidence_level(0.7), ConfidenceLevel::Medium);
        assert_eq!(confidence_level(0.71), ConfidenceLevel::High);
    }

    #[test]
    fn test_score_capped_at_one() {
        let quality = ConfidenceScorer::default().score(&complete_day(), 1440, 365);
        assert!((quality.confidence_score - 1.0).abs() < 1e-9);
        assert_eq!(quality.baseline_maturity, BaselineMaturity::Mature);
    }
}
