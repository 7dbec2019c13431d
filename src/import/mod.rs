use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::config::SourceSettings;
use crate::day::DayBoundary;
use crate::error::ImportError;
use crate::models::{
    BaselineReading, BreathingRateReading, ExerciseRecord, HrvReading, IntradaySample,
    RawSleepSession, SkinTemperatureReading, SourceId, SourceValues, SpO2Reading,
};

pub mod export_source;
pub mod health_connect;
pub mod json;
pub mod mapping;

pub use export_source::ExportSource;
pub use health_connect::HealthConnectReader;
pub use json::JsonExportReader;

/// Raw readings from an offline export, grouped by local day and source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportData {
    /// Per-day readings keyed by local calendar date
    pub days: BTreeMap<NaiveDate, ExportDay>,

    /// Every sleep session in the export, stages attached
    pub sleep_sessions: Vec<RawSleepSession>,

    /// Raw heart-rate series per source, any resolution
    pub heart_rate: SourceValues<Vec<IntradaySample>>,

    pub exercises: Vec<ExerciseRecord>,
}

/// One local day of per-source readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDay {
    pub baseline: SourceValues<BaselineReading>,
    pub hrv: SourceValues<HrvReading>,
    pub spo2: SourceValues<SpO2Reading>,
    pub breathing_rate: SourceValues<BreathingRateReading>,
    pub skin_temperature: SourceValues<SkinTemperatureReading>,
}

impl ExportDay {
    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty()
            && self.hrv.is_empty()
            && self.spo2.is_empty()
            && self.breathing_rate.is_empty()
            && self.skin_temperature.is_empty()
    }
}

impl ExportData {
    /// Dates with any per-day reading, oldest first
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days
            .iter()
            .filter(|(_, day)| !day.is_empty())
            .map(|(date, _)| *date)
            .collect()
    }

    pub fn day_mut(&mut self, date: NaiveDate) -> &mut ExportDay {
        self.days.entry(date).or_default()
    }

    pub fn baseline_mut(&mut self, date: NaiveDate, source: SourceId) -> &mut BaselineReading {
        self.day_mut(date).baseline.entry(source).or_default()
    }

    /// Sources that contributed anything
    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self
            .days
            .values()
            .flat_map(|day| {
                day.baseline
                    .keys()
                    .chain(day.hrv.keys())
                    .chain(day.spo2.keys())
                    .chain(day.breathing_rate.keys())
                    .chain(day.skin_temperature.keys())
            })
            .chain(self.heart_rate.keys())
            .chain(self.sleep_sessions.iter().map(|s| &s.source))
            .cloned()
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

/// Reader for one offline export format
pub trait ExportReader {
    /// Check if this reader can handle the given file
    fn can_read(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> Result<ExportData, ImportError>;

    fn format_name(&self) -> &'static str;
}

/// Picks a reader for an export file
pub struct ImportManager {
    readers: Vec<Box<dyn ExportReader>>,
}

impl ImportManager {
    /// Create a new import manager with all available readers
    pub fn new(sources: &SourceSettings, boundary: DayBoundary) -> Self {
        let readers: Vec<Box<dyn ExportReader>> = vec![
            Box::new(HealthConnectReader::new(sources.clone(), boundary)),
            Box::new(JsonExportReader),
        ];

        Self { readers }
    }

    pub fn can_read(&self, path: &Path) -> bool {
        self.readers.iter().any(|reader| reader.can_read(path))
    }

    /// Read an export, detecting the format from the file extension
    pub fn read(&self, path: &Path) -> Result<ExportData, ImportError> {
        if !path.exists() {
            return Err(ImportError::FileNotFound { path: path.to_path_buf() });
        }

        let reader = self
            .readers
            .iter()
            .find(|reader| reader.can_read(path))
            .ok_or_else(|| ImportError::UnsupportedFormat { path: path.to_path_buf() })?;

        info!(path = %path.display(), format = reader.format_name(), "reading export");
        let data = reader.read(path)?;
        info!(
            days = data.days.len(),
            sleep_sessions = data.sleep_sessions.len(),
            exercises = data.exercises.len(),
            "export read"
        );
        Ok(data)
    }
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}
