use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::merge::SourcePriority;
use crate::models::SourceId;

/// Largest UTC offset, in hours, accepted for the day boundary
pub const MAX_UTC_OFFSET_HOURS: i32 = 14;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,

    /// Source ranking and export app mapping
    #[serde(default)]
    pub sources: SourceSettings,

    /// Local day boundary
    #[serde(default)]
    pub day: DaySettings,

    /// Quality scoring thresholds
    #[serde(default)]
    pub quality: QualitySettings,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path of the reconciled SQLite database
    pub database_path: PathBuf,
}

/// Source ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Source ids, highest priority first
    pub priority: Vec<String>,

    /// Health Connect `app_info_id` to source id
    pub health_connect_apps: BTreeMap<String, String>,
}

/// Day boundary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaySettings {
    /// Hours east of UTC used for every device
    pub utc_offset_hours: i32,

    /// Start of the overnight sleep window, hours before local midnight
    pub sleep_window_before_midnight_hours: u32,

    /// End of the overnight sleep window, hours after local midnight
    pub sleep_window_after_midnight_hours: u32,
}

/// Quality scoring thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// Minimum wear hours for a day to count as valid
    pub valid_day_min_wear_hours: f64,

    /// Wear hours that earn the full wear component of the score
    pub wear_hours_target: f64,

    /// Trailing window used to count prior valid days
    pub baseline_lookback_days: u32,

    /// Below this many valid days the baseline is cold
    pub cold_below_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        AppConfig {
            metadata: ConfigMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: now,
                updated_at: now,
            },
            settings: AppSettings::default(),
            sources: SourceSettings::default(),
            day: DaySettings::default(),
            quality: QualitySettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            database_path: AppConfig::config_dir().join("biorecon.db"),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        let mut health_connect_apps = BTreeMap::new();
        health_connect_apps.insert("3".to_string(), "fitbit".to_string());
        health_connect_apps.insert("5".to_string(), "nothing_x".to_string());

        SourceSettings {
            priority: vec!["fitbit".to_string(), "nothing_x".to_string()],
            health_connect_apps,
        }
    }
}

impl Default for DaySettings {
    fn default() -> Self {
        DaySettings {
            utc_offset_hours: 9,
            sleep_window_before_midnight_hours: 6,
            sleep_window_after_midnight_hours: 14,
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        QualitySettings {
            valid_day_min_wear_hours: 10.0,
            wear_hours_target: 16.0,
            baseline_lookback_days: 60,
            cold_below_days: 14,
        }
    }
}

impl SourceSettings {
    /// Ranking as handed to the merger
    pub fn source_priority(&self) -> SourcePriority {
        SourcePriority::new(self.priority.iter().map(|s| SourceId::new(s.as_str())).collect())
    }

    /// Source id for a Health Connect app, if it is mapped
    pub fn source_for_app(&self, app_info_id: i64) -> Option<SourceId> {
        self.health_connect_apps
            .get(&app_info_id.to_string())
            .map(|s| SourceId::new(s.as_str()))
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// `~/.biorecon`, or `./.biorecon` without a home directory
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".biorecon")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path = %config_path.display(), error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sources.priority.is_empty() {
            bail!("sources.priority must name at least one source");
        }

        let mut seen = HashSet::new();
        for source in &self.sources.priority {
            if !seen.insert(source.as_str()) {
                bail!("sources.priority lists '{}' more than once", source);
            }
        }

        if self.day.utc_offset_hours.abs() > MAX_UTC_OFFSET_HOURS {
            bail!(
                "day.utc_offset_hours must be within ±{}, got {}",
                MAX_UTC_OFFSET_HOURS,
                self.day.utc_offset_hours
            );
        }

        if self.quality.wear_hours_target <= 0.0 || self.quality.baseline_lookback_days == 0 {
            bail!("quality.wear_hours_target and quality.baseline_lookback_days must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(config.sources.priority, deserialized.sources.priority);
        assert_eq!(config.day, deserialized.day);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sources.priority, vec!["fitbit", "nothing_x"]);
        assert_eq!(config.sources.source_for_app(3), Some(SourceId::new("fitbit")));
        assert_eq!(config.sources.source_for_app(5), Some(SourceId::new("nothing_x")));
        assert_eq!(config.sources.source_for_app(9), None);
        assert_eq!(config.day.utc_offset_hours, 9);
        assert_eq!(config.quality.baseline_lookback_days, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let toml_str = r#"
            [metadata]
            version = "0.1.0"
            created_at = "2024-03-01T00:00:00Z"
            updated_at = "2024-03-01T00:00:00Z"

            [sources]
            priority = ["garmin", "fitbit"]
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sources.priority, vec!["garmin", "fitbit"]);
        assert_eq!(config.sources.health_connect_apps.len(), 2);
        assert_eq!(config.day.sleep_window_after_midnight_hours, 14);
    }

    #[test]
    fn test_validate_rejects_bad_priority() {
        let mut config = AppConfig::default();
        config.sources.priority.clear();
        assert!(config.validate().is_err());

        config.sources.priority = vec!["fitbit".to_string(), "fitbit".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_offset() {
        let mut config = AppConfig::default();
        config.day.utc_offset_hours = -15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original_config = AppConfig::default();
        original_config.day.utc_offset_hours = 2;
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = AppConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded_config.day.utc_offset_hours, 2);
    }
}
