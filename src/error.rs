//! Error hierarchy for biorecon
//!
//! Only the failures a caller has to act on are errors. A skipped enrichment or a
//! lost best-effort write is reported as a [`Degradation`](crate::orchestrator::Degradation)
//! on the sync report, and a lookup with no data is `Ok(None)`.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for one reconciliation run or batch import
#[derive(Debug, Error)]
pub enum ReconError {
    /// Baseline summary could not be fetched; nothing was written for the date
    #[error("baseline fetch failed for {date}: {source}")]
    FatalFetch {
        date: NaiveDate,
        #[source]
        source: SourceError,
    },

    /// Summary write failed
    #[error("failed to persist summary for {date}: {source}")]
    PersistenceWrite {
        date: NaiveDate,
        #[source]
        source: RepositoryError,
    },

    /// Cancelled at an I/O boundary; earlier writes are kept
    #[error("reconciliation cancelled for {date}")]
    Cancelled { date: NaiveDate },

    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Repository failure outside the summary write, e.g. on a read path
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Failure of one biometrics source call
#[derive(Debug, Error)]
pub enum SourceError {
    /// Provider or export has nothing for the requested date
    #[error("no {metric} data for {date}")]
    NoData { metric: &'static str, date: NaiveDate },

    #[error("provider unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored value could not be decoded into its model type
    #[error("corrupt {column} value in {table}: {value}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection mutex was poisoned by a panicking writer
    #[error("repository lock poisoned")]
    LockPoisoned,
}

/// Errors reading an offline export
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("unsupported export format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to read {format} export: {reason}")]
    Read { format: &'static str, reason: String },

    #[error("export SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("export JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for biorecon operations
pub type Result<T> = std::result::Result<T, ReconError>;

impl ReconError {
    /// Whether re-running the same date later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconError::FatalFetch { source, .. } => {
                matches!(source, SourceError::Unavailable { .. })
            }
            ReconError::PersistenceWrite { source, .. } | ReconError::Repository(source) => {
                matches!(source, RepositoryError::Sqlite(_))
            }
            ReconError::Cancelled { .. } => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReconError::Cancelled { .. } => ErrorSeverity::Info,
            ReconError::FatalFetch {
                source: SourceError::NoData { .. },
                ..
            } => ErrorSeverity::Warning,
            ReconError::FatalFetch { .. } => ErrorSeverity::Error,
            ReconError::PersistenceWrite {
                source: RepositoryError::Corrupt { .. } | RepositoryError::LockPoisoned,
                ..
            } => ErrorSeverity::Critical,
            ReconError::Repository(RepositoryError::LockPoisoned) => ErrorSeverity::Critical,
            ReconError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ReconError::FatalFetch {
                date,
                source: SourceError::NoData { .. },
            } => format!("No data recorded for {}; nothing to reconcile.", date),
            ReconError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find export file: {}", path.display())
            }
            ReconError::Import(ImportError::UnsupportedFormat { path }) => format!(
                "Unrecognised export file {}. Expected a Health Connect .db or a .json export.",
                path.display()
            ),
            ReconError::Cancelled { date } => {
                format!("Stopped while reconciling {}; earlier days are saved.", date)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Stored data may be inconsistent
    Critical,
    /// Operation failed
    Error,
    /// Operation failed on missing input
    Warning,
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_error_severity() {
        let err = ReconError::FatalFetch {
            date: date(),
            source: SourceError::NoData { metric: "summary", date: date() },
        };
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = ReconError::Cancelled { date: date() };
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_error_retryable() {
        let err = ReconError::FatalFetch {
            date: date(),
            source: SourceError::Unavailable { reason: "timeout".to_string() },
        };
        assert!(err.is_retryable());

        let err = ReconError::FatalFetch {
            date: date(),
            source: SourceError::NoData { metric: "summary", date: date() },
        };
        assert!(!err.is_retryable());

        assert!(!ReconError::Configuration("x".to_string()).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = ReconError::Import(ImportError::FileNotFound {
            path: PathBuf::from("export.db"),
        });
        assert!(err.user_message().contains("Could not find"));

        let err = ReconError::Cancelled { date: date() };
        assert!(err.user_message().contains("2024-03-01"));
    }
}
