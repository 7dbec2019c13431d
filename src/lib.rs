// Library interface for biorecon
// The binary and the integration tests both go through this surface

pub mod config;
pub mod database;
pub mod day;
pub mod error;
pub mod import;
pub mod logging;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod plausibility;
pub mod quality;
pub mod repository;
pub mod sleep;
pub mod source;
pub mod timeline;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::AppConfig;
pub use database::SqliteRepository;
pub use day::DayBoundary;
pub use error::{ImportError, ReconError, RepositoryError, Result, SourceError};
pub use import::{ExportData, ExportSource, ImportManager};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use merge::{PriorityMerger, SourcePriority};
pub use orchestrator::{BatchReport, Degradation, Orchestrator, SyncReport, SyncStep};
pub use plausibility::PlausibilityChecker;
pub use quality::{CompletenessScorer, ConfidenceScorer};
pub use repository::Repository;
pub use sleep::SleepSessionReconstructor;
pub use source::BiometricsSource;
pub use timeline::StageStreamDeduplicator;
