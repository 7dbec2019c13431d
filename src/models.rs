use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a data source (a device app, a cloud provider, an export producer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        SourceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        SourceId(s.to_string())
    }
}

/// Candidate values for one metric, keyed by the source that reported them
pub type SourceValues<T> = HashMap<SourceId, T>;

/// One authoritative record per calendar date.
///
/// Every optional numeric field uses `None` for "not measured"; `Some(0)` is a real
/// measurement of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    /// Calendar date (local day) this record describes
    pub date: NaiveDate,

    /// Label of the source (or merge) that produced this record
    pub provider: String,

    // Heart rate
    pub resting_hr: Option<u16>,
    pub avg_hr: Option<f64>,
    pub max_hr: Option<u16>,

    // HRV (RMSSD, ms)
    pub hrv_daily_rmssd: Option<f64>,
    pub hrv_deep_rmssd: Option<f64>,

    // SpO2 (%)
    pub spo2_avg: Option<f64>,
    pub spo2_min: Option<f64>,
    pub spo2_max: Option<f64>,

    // Breathing rate (breaths/min)
    pub br_full_sleep: Option<f64>,
    pub br_deep_sleep: Option<f64>,
    pub br_light_sleep: Option<f64>,
    pub br_rem_sleep: Option<f64>,

    /// Skin temperature deviation from personal baseline (°C)
    pub skin_temp_delta: Option<f64>,

    // Sleep window
    pub sleep_start: Option<DateTime<Utc>>,
    pub sleep_end: Option<DateTime<Utc>>,
    pub sleep_duration_min: Option<u32>,
    pub sleep_minutes_asleep: Option<u32>,
    pub sleep_minutes_awake: Option<u32>,
    pub sleep_onset_latency_min: Option<u32>,
    pub sleep_type: Option<SleepType>,
    pub sleep_deep_min: Option<u32>,
    pub sleep_light_min: Option<u32>,
    pub sleep_rem_min: Option<u32>,
    pub sleep_wake_min: Option<u32>,
    pub sleep_is_main: bool,

    // Activity
    pub steps: Option<u32>,
    pub distance_km: Option<f64>,
    pub floors: Option<u32>,
    pub calories_total: Option<u32>,
    pub calories_active: Option<u32>,
    pub calories_bmr: Option<u32>,
    pub minutes_sedentary: Option<u32>,
    pub minutes_lightly_active: Option<u32>,
    pub minutes_fairly_active: Option<u32>,
    pub minutes_very_active: Option<u32>,

    /// VO2 max estimate (ml/kg/min)
    pub vo2_max: Option<f64>,

    // Heart rate zone minutes
    pub hr_zone_out_min: Option<u32>,
    pub hr_zone_fat_min: Option<u32>,
    pub hr_zone_cardio_min: Option<u32>,
    pub hr_zone_peak_min: Option<u32>,

    /// When this record was last written by a reconciliation run
    pub synced_at: DateTime<Utc>,
}

impl DaySummary {
    /// Empty summary for a date: every metric absent
    pub fn empty(date: NaiveDate, provider: impl Into<String>) -> Self {
        Self {
            date,
            provider: provider.into(),
            resting_hr: None,
            avg_hr: None,
            max_hr: None,
            hrv_daily_rmssd: None,
            hrv_deep_rmssd: None,
            spo2_avg: None,
            spo2_min: None,
            spo2_max: None,
            br_full_sleep: None,
            br_deep_sleep: None,
            br_light_sleep: None,
            br_rem_sleep: None,
            skin_temp_delta: None,
            sleep_start: None,
            sleep_end: None,
            sleep_duration_min: None,
            sleep_minutes_asleep: None,
            sleep_minutes_awake: None,
            sleep_onset_latency_min: None,
            sleep_type: None,
            sleep_deep_min: None,
            sleep_light_min: None,
            sleep_rem_min: None,
            sleep_wake_min: None,
            sleep_is_main: false,
            steps: None,
            distance_km: None,
            floors: None,
            calories_total: None,
            calories_active: None,
            calories_bmr: None,
            minutes_sedentary: None,
            minutes_lightly_active: None,
            minutes_fairly_active: None,
            minutes_very_active: None,
            vo2_max: None,
            hr_zone_out_min: None,
            hr_zone_fat_min: None,
            hr_zone_cardio_min: None,
            hr_zone_peak_min: None,
            synced_at: Utc::now(),
        }
    }

    /// Whether a sleep session has been attached to this summary
    pub fn has_sleep_window(&self) -> bool {
        self.sleep_start.is_some() && self.sleep_end.is_some()
    }
}

/// Classic sessions only distinguish asleep/awake; stage sessions carry deep/rem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepType {
    Stages,
    Classic,
}

impl SleepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepType::Stages => "stages",
            SleepType::Classic => "classic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stages" => Some(SleepType::Stages),
            "classic" => Some(SleepType::Classic),
            _ => None,
        }
    }
}

/// One heart-rate sample at minute resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradaySample {
    /// Sample time, truncated to the minute once merged
    pub time: DateTime<Utc>,

    /// Beats per minute
    pub bpm: u16,

    /// Device-reported confidence, when the source provides one
    pub confidence: Option<u8>,
}

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Deep,
    Light,
    Rem,
    Wake,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Deep => "deep",
            StageKind::Light => "light",
            StageKind::Rem => "rem",
            StageKind::Wake => "wake",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deep" => Some(StageKind::Deep),
            "light" => Some(StageKind::Light),
            "rem" => Some(StageKind::Rem),
            "wake" => Some(StageKind::Wake),
            _ => None,
        }
    }

    pub fn is_asleep(&self) -> bool {
        !matches!(self, StageKind::Wake)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped interval tagged with a sleep stage and its owning session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage start
    pub time: DateTime<Utc>,

    pub stage: StageKind,

    /// Stage length in seconds
    pub seconds: u32,

    /// Identifier of the session chain this event belongs to
    pub session_id: i64,
}

impl StageEvent {
    pub fn end(&self) -> DateTime<Utc> {
        self.time + chrono::Duration::seconds(i64::from(self.seconds))
    }
}

/// A raw stage interval as reported by a source, before stage-code mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStage {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Source-specific stage code
    pub code: i32,
}

/// A sleep session as reported by one source, with its raw stage timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSleepSession {
    /// Source-assigned session identifier (becomes `StageEvent::session_id`)
    pub session_id: i64,

    pub source: SourceId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stages: Vec<RawStage>,
}

impl RawSleepSession {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Transient per-(day, source) candidate produced while choosing the night's session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSessionCandidate {
    pub source: SourceId,
    pub session_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_min: u32,
    pub stage_minutes: StageMinutes,
}

/// Per-stage minute totals of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMinutes {
    pub deep: u32,
    pub light: u32,
    pub rem: u32,
    pub wake: u32,
}

impl StageMinutes {
    pub fn asleep(&self) -> u32 {
        self.deep + self.light + self.rem
    }

    pub fn awake(&self) -> u32 {
        self.wake
    }
}

/// An exercise session, keyed by its external id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    /// Natural key (e.g. `hc-<uuid>` for Health Connect sessions)
    pub external_id: String,

    pub activity_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub calories: Option<u32>,
    pub avg_hr: Option<u16>,
    pub distance_km: Option<f64>,
    pub synced_at: DateTime<Utc>,
}

// ============================================================================
// Raw per-source readings
// ============================================================================

/// Baseline daily reading of one source: heart rate, activity totals and zones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineReading {
    pub resting_hr: Option<u16>,
    pub heart_rate: Option<HeartRatePair>,
    pub steps: Option<u32>,
    pub distance_km: Option<f64>,
    pub floors: Option<u32>,
    pub calories: Option<CalorieTotals>,
    pub activity_minutes: Option<ActivityMinutes>,
    pub vo2_max: Option<f64>,
    pub hr_zones: Option<HeartRateZoneMinutes>,
}

/// Daily average and maximum heart rate, merged as one unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRatePair {
    pub average: f64,
    pub max: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalorieTotals {
    pub total: Option<u32>,
    pub active: Option<u32>,
    pub bmr: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMinutes {
    pub sedentary: u32,
    pub lightly: u32,
    pub fairly: u32,
    pub very: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRateZoneMinutes {
    pub out_of_range: u32,
    pub fat_burn: u32,
    pub cardio: u32,
    pub peak: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvReading {
    pub daily_rmssd: Option<f64>,
    pub deep_rmssd: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpO2Reading {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreathingRateReading {
    pub full_sleep: Option<f64>,
    pub deep_sleep: Option<f64>,
    pub light_sleep: Option<f64>,
    pub rem_sleep: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkinTemperatureReading {
    pub delta: Option<f64>,
}

// ============================================================================
// Data quality
// ============================================================================

/// Per-metric plausibility classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlausibilityStatus {
    Pass,
    FailLow,
    FailHigh,
    Missing,
}

impl PlausibilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlausibilityStatus::Pass => "pass",
            PlausibilityStatus::FailLow => "fail_low",
            PlausibilityStatus::FailHigh => "fail_high",
            PlausibilityStatus::Missing => "missing",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PlausibilityStatus::FailLow | PlausibilityStatus::FailHigh)
    }
}

/// How much valid history backs comparative scoring downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineMaturity {
    Cold,
    Warming,
    Mature,
}

impl BaselineMaturity {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineMaturity::Cold => "cold",
            BaselineMaturity::Warming => "warming",
            BaselineMaturity::Mature => "mature",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cold" => Some(BaselineMaturity::Cold),
            "warming" => Some(BaselineMaturity::Warming),
            "mature" => Some(BaselineMaturity::Mature),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ConfidenceLevel::Low),
            "medium" => Some(ConfidenceLevel::Medium),
            "high" => Some(ConfidenceLevel::High),
            _ => None,
        }
    }
}

/// Data-quality verdict for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub date: NaiveDate,

    /// Hours of wear inferred from intraday sample density
    pub wear_time_hours: f64,

    pub hr_sample_count: u32,

    /// Fraction (0-1) of tracked metrics present
    pub completeness_pct: f64,

    pub metrics_present: Vec<String>,
    pub metrics_missing: Vec<String>,

    /// Metric name → classification
    pub plausibility_flags: BTreeMap<String, PlausibilityStatus>,

    /// No metric failed its range check
    pub plausibility_pass: bool,

    /// Enough wear time and plausibility pass
    pub is_valid_day: bool,

    /// Valid days in the trailing lookback window
    pub baseline_days: u32,

    pub baseline_maturity: BaselineMaturity,

    /// Composite confidence (0-1)
    pub confidence_score: f64,

    pub confidence_level: ConfidenceLevel,

    pub computed_at: DateTime<Utc>,
}
