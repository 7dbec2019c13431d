//! Day boundary arithmetic under a fixed local-time offset
//!
//! All devices are assumed to share one constant UTC offset. Data recorded across a
//! DST change or while travelling is attributed using that offset regardless, so
//! records near those boundaries can land on the neighbouring day.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::config::DaySettings;

/// Converts between UTC instants and local calendar days
#[derive(Debug, Clone, Copy)]
pub struct DayBoundary {
    offset: FixedOffset,
    window_before_midnight: Duration,
    window_after_midnight: Duration,
}

impl DayBoundary {
    /// Build from an offset in whole hours east of UTC and the overnight window bounds
    pub fn new(utc_offset_hours: i32, before_midnight_hours: u32, after_midnight_hours: u32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)?;
        Some(Self {
            offset,
            window_before_midnight: Duration::hours(i64::from(before_midnight_hours)),
            window_after_midnight: Duration::hours(i64::from(after_midnight_hours)),
        })
    }

    pub fn from_settings(settings: &DaySettings) -> Option<Self> {
        Self::new(
            settings.utc_offset_hours,
            settings.sleep_window_before_midnight_hours,
            settings.sleep_window_after_midnight_hours,
        )
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// UTC instant of local midnight starting `date`
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&(midnight - shift))
    }

    /// Half-open UTC range `[start, end)` covering the local calendar day
    pub fn day_range(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.day_start(date);
        (start, start + Duration::days(1))
    }

    /// Overnight window used when a night's sleep has to be located without a
    /// recorded sleep start/end: by default 18:00 the previous evening to 14:00
    pub fn sleep_window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = self.day_start(date);
        (
            midnight - self.window_before_midnight,
            midnight + self.window_after_midnight,
        )
    }

    /// Offset in the `+N hours` form SQLite date modifiers expect
    pub fn sqlite_modifier(&self) -> String {
        let hours = self.offset.local_minus_utc() / 3600;
        format!("{:+} hours", hours)
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::from_settings(&DaySettings::default()).unwrap_or(Self {
            offset: Utc.fix(),
            window_before_midnight: Duration::hours(6),
            window_after_midnight: Duration::hours(14),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> DayBoundary {
        DayBoundary::new(9, 6, 14).unwrap()
    }

    #[test]
    fn test_day_start_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(
            jst().day_start(date),
            Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_sleep_window_spans_previous_evening() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let (from, to) = jst().sleep_window(date);
        // 18:00 JST on 1 March, 14:00 JST on 2 March
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_sqlite_modifier() {
        assert_eq!(jst().sqlite_modifier(), "+9 hours");
        assert_eq!(DayBoundary::new(-5, 6, 14).unwrap().sqlite_modifier(), "-5 hours");
    }

    #[test]
    fn test_invalid_offset_rejected() {
        assert!(DayBoundary::new(30, 6, 14).is_none());
    }
}
