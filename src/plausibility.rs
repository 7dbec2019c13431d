//! Physiological plausibility ranges
//!
//! The same ranges back two things: the per-day plausibility flags stored with a
//! [`DataQuality`](crate::models::DataQuality) record, and the predicates the
//! [`PriorityMerger`](crate::merge::PriorityMerger) uses to skip implausible values
//! from a higher-priority source.

use std::collections::BTreeMap;

use crate::models::{
    BreathingRateReading, CalorieTotals, DaySummary, HeartRatePair, HrvReading,
    PlausibilityStatus, SkinTemperatureReading, SpO2Reading,
};

/// Inclusive value range for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Non-finite values are treated as absent
    pub fn classify(&self, value: Option<f64>) -> PlausibilityStatus {
        match value {
            Some(v) if !v.is_finite() => PlausibilityStatus::Missing,
            Some(v) if v < self.min => PlausibilityStatus::FailLow,
            Some(v) if v > self.max => PlausibilityStatus::FailHigh,
            Some(_) => PlausibilityStatus::Pass,
            None => PlausibilityStatus::Missing,
        }
    }
}

/// Resting heart rate, bpm
pub const RESTING_HR: MetricRange = MetricRange::new(30.0, 100.0);
/// Daily average heart rate, bpm
pub const AVG_HR: MetricRange = MetricRange::new(25.0, 200.0);
/// Daily maximum heart rate, bpm
pub const MAX_HR: MetricRange = MetricRange::new(40.0, 230.0);
/// HRV RMSSD, ms
pub const HRV_RMSSD: MetricRange = MetricRange::new(5.0, 300.0);
/// Blood oxygen saturation, %
pub const SPO2: MetricRange = MetricRange::new(70.0, 100.0);
/// Nightly skin temperature deviation, °C
pub const SKIN_TEMP_DELTA: MetricRange = MetricRange::new(-5.0, 5.0);
/// Breathing rate, breaths/min
pub const BREATHING_RATE: MetricRange = MetricRange::new(4.0, 40.0);

pub const STEPS_MAX: f64 = 200_000.0;
pub const DISTANCE_KM_MAX: f64 = 300.0;
pub const CALORIES_TOTAL_MAX: f64 = 15_000.0;
pub const SLEEP_DURATION_MAX_MIN: f64 = 1440.0;

/// Flag key to range, in the order flags are reported
const CHECKS: [(&str, MetricRange); 5] = [
    ("resting_hr", RESTING_HR),
    ("hrv_rmssd", HRV_RMSSD),
    ("spo2", SPO2),
    ("skin_temp", SKIN_TEMP_DELTA),
    ("br", BREATHING_RATE),
];

/// Per-metric classification of one day
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityReport {
    pub flags: BTreeMap<String, PlausibilityStatus>,
}

impl PlausibilityReport {
    /// No metric failed low or high; missing metrics do not count against the day
    pub fn passed(&self) -> bool {
        !self.flags.values().any(PlausibilityStatus::is_failure)
    }

    pub fn status(&self, metric: &str) -> Option<PlausibilityStatus> {
        self.flags.get(metric).copied()
    }
}

/// Classifies the tracked metrics of a [`DaySummary`]
#[derive(Debug, Default, Clone, Copy)]
pub struct PlausibilityChecker;

impl PlausibilityChecker {
    pub fn check(&self, summary: &DaySummary) -> PlausibilityReport {
        let flags = CHECKS
            .iter()
            .map(|(name, range)| {
                let value = Self::value_for(summary, name);
                (name.to_string(), range.classify(value))
            })
            .collect();

        PlausibilityReport { flags }
    }

    fn value_for(summary: &DaySummary, metric: &str) -> Option<f64> {
        match metric {
            "resting_hr" => summary.resting_hr.map(f64::from),
            "hrv_rmssd" => summary.hrv_daily_rmssd,
            "spo2" => summary.spo2_avg,
            "skin_temp" => summary.skin_temp_delta,
            "br" => summary.br_full_sleep,
            _ => None,
        }
    }
}

/// Merge predicates, one per reading type
pub mod predicates {
    use super::*;

    pub fn resting_hr(bpm: &u16) -> bool {
        RESTING_HR.contains(f64::from(*bpm))
    }

    /// Judged on the average; the maximum rides along
    pub fn heart_rate(pair: &HeartRatePair) -> bool {
        AVG_HR.contains(pair.average)
    }

    pub fn hrv(reading: &HrvReading) -> bool {
        reading.daily_rmssd.is_some_and(|v| HRV_RMSSD.contains(v))
    }

    pub fn spo2(reading: &SpO2Reading) -> bool {
        reading.avg.is_some_and(|v| SPO2.contains(v))
    }

    pub fn breathing_rate(reading: &BreathingRateReading) -> bool {
        reading.full_sleep.is_some_and(|v| BREATHING_RATE.contains(v))
    }

    pub fn skin_temperature(reading: &SkinTemperatureReading) -> bool {
        reading.delta.is_some_and(|v| SKIN_TEMP_DELTA.contains(v))
    }

    pub fn steps(steps: &u32) -> bool {
        *steps > 0 && f64::from(*steps) <= STEPS_MAX
    }

    pub fn distance_km(km: &f64) -> bool {
        *km > 0.0 && *km <= DISTANCE_KM_MAX
    }

    pub fn calories(totals: &CalorieTotals) -> bool {
        totals
            .total
            .is_some_and(|kcal| kcal > 0 && f64::from(kcal) <= CALORIES_TOTAL_MAX)
    }

    /// Metrics without a meaningful range
    pub fn any<T>(_: &T) -> bool {
        true
    }
}
