use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{has_extension, ExportData, ExportReader};
use crate::error::ImportError;

/// Reader for exports already in biorecon's own layout, serialized as JSON
///
/// Useful for replaying a cloud provider dump or fixtures without a live source.
pub struct JsonExportReader;

impl ExportReader for JsonExportReader {
    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn read(&self, path: &Path) -> Result<ExportData, ImportError> {
        let file = File::open(path)?;
        let data: ExportData = serde_json::from_reader(BufReader::new(file))?;
        Ok(data)
    }

    fn format_name(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use chrono::NaiveDate;

    #[test]
    fn test_read_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"{
                "days": {
                    "2024-03-01": {
                        "baseline": { "fitbit": { "resting_hr": 58, "steps": 9000 } },
                        "hrv": { "fitbit": { "daily_rmssd": 41.5 } }
                    }
                }
            }"#,
        )
        .unwrap();

        let data = JsonExportReader.read(&path).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let day = &data.days[&date];
        assert_eq!(day.baseline[&SourceId::new("fitbit")].steps, Some(9000));
        assert_eq!(day.hrv[&SourceId::new("fitbit")].daily_rmssd, Some(41.5));
        assert!(data.sleep_sessions.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonExportReader.read(&path), Err(ImportError::Json(_))));
    }
}
