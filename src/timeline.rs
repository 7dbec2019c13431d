//! Read-time cleanup of stored sleep stage events
//!
//! Stored stage rows for a night can contain naps, a second source's session and
//! re-imported fragments with shifted timestamps. The deduplicator keeps the dominant
//! session and drops anything that overlaps an event already kept. It only filters;
//! stored rows are never rewritten.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use crate::day::DayBoundary;
use crate::error::RepositoryError;
use crate::models::{DaySummary, StageEvent};
use crate::repository::Repository;

#[derive(Debug, Default, Clone, Copy)]
pub struct StageStreamDeduplicator;

impl StageStreamDeduplicator {
    /// Keep only the session with the largest summed duration. Ties go to the session
    /// that appears first in the input.
    pub fn filter_main_session(&self, events: Vec<StageEvent>) -> Vec<StageEvent> {
        let mut totals: HashMap<i64, (usize, u64)> = HashMap::new();
        for (index, event) in events.iter().enumerate() {
            let entry = totals.entry(event.session_id).or_insert((index, 0));
            entry.1 += u64::from(event.seconds);
        }

        let main = totals
            .into_iter()
            .max_by(|(_, (first_a, total_a)), (_, (first_b, total_b))| {
                total_a.cmp(total_b).then(first_b.cmp(first_a))
            })
            .map(|(session_id, _)| session_id);

        match main {
            Some(session_id) => events.into_iter().filter(|e| e.session_id == session_id).collect(),
            None => Vec::new(),
        }
    }

    /// Sort by start time and drop every event that starts before the end of the
    /// last kept event. A zero-length event still claims its start instant.
    pub fn deduplicate(&self, mut events: Vec<StageEvent>) -> Vec<StageEvent> {
        events.sort_by_key(|e| e.time);

        let mut kept: Vec<StageEvent> = Vec::with_capacity(events.len());
        for event in events {
            let overlaps = kept
                .last()
                .is_some_and(|last| event.time < last.end() || event.time == last.time);
            if !overlaps {
                kept.push(event);
            }
        }
        kept
    }

    /// Main-session filter followed by chain deduplication
    pub fn clean(&self, events: Vec<StageEvent>) -> Vec<StageEvent> {
        self.deduplicate(self.filter_main_session(events))
    }
}

/// Window of stored stage events belonging to `date`
///
/// The recorded sleep start/end when the day's summary has them, otherwise the
/// overnight fallback window around local midnight.
pub fn query_window(
    date: NaiveDate,
    summary: Option<&DaySummary>,
    boundary: &DayBoundary,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match summary.and_then(|s| s.sleep_start.zip(s.sleep_end)) {
        Some((start, end)) if start <= end => (start, end),
        _ => boundary.sleep_window(date),
    }
}

/// Load the stored stage events for `date` and clean them
pub async fn stage_timeline(
    repository: &dyn Repository,
    boundary: &DayBoundary,
    date: NaiveDate,
) -> Result<Vec<StageEvent>, RepositoryError> {
    let summary = repository.get_summary(date).await?;
    let (from, to) = query_window(date, summary.as_ref(), boundary);
    let events = repository.list_stage_events(from, to).await?;
    Ok(StageStreamDeduplicator.clean(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
    }

    fn event(offset_secs: i64, seconds: u32, session_id: i64) -> StageEvent {
        StageEvent {
            time: base() + Duration::seconds(offset_secs),
            stage: StageKind::Light,
            seconds,
            session_id,
        }
    }

    #[test]
    fn test_main_session_filter() {
        let events = vec![event(0, 3600, 1), event(3600, 7200, 1), event(20_000, 1800, 2)];
        let main = StageStreamDeduplicator.filter_main_session(events);
        assert_eq!(main.len(), 2);
        assert!(main.iter().all(|e| e.session_id == 1));
    }

    #[test]
    fn test_main_session_tie_goes_to_first_seen() {
        let events = vec![event(0, 600, 9), event(100, 600, 4)];
        let main = StageStreamDeduplicator.filter_main_session(events);
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].session_id, 9);
    }

    #[test]
    fn test_empty_input() {
        assert!(StageStreamDeduplicator.filter_main_session(Vec::new()).is_empty());
        assert!(StageStreamDeduplicator.clean(Vec::new()).is_empty());
    }

    #[test]
    fn test_deduplicate_drops_desynchronised_fragments() {
        let events = vec![
            event(0, 600, 1),
            event(600, 600, 1),
            event(630, 300, 1), // shifted copy from a second import
            event(1200, 300, 1),
            event(1190, 60, 1),
        ];
        let kept = StageStreamDeduplicator.deduplicate(events);
        let offsets: Vec<i64> = kept.iter().map(|e| (e.time - base()).num_seconds()).collect();
        assert_eq!(offsets, vec![0, 600, 1200]);
    }

    #[test]
    fn test_deduplicate_zero_length_event_claims_its_start() {
        let events = vec![event(0, 0, 1), event(0, 600, 1), event(600, 300, 1)];
        let kept = StageStreamDeduplicator.deduplicate(events);
        assert_eq!(kept.len(), 2);
        assert!(kept[1].time > kept[0].time);
        assert_eq!((kept[1].time - base()).num_seconds(), 600);
    }

    #[test]
    fn test_query_window_prefers_recorded_sleep() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let boundary = DayBoundary::new(9, 6, 14).unwrap();

        let mut summary = DaySummary::empty(date, "fitbit");
        assert_eq!(query_window(date, Some(&summary), &boundary), boundary.sleep_window(date));
        assert_eq!(query_window(date, None, &boundary), boundary.sleep_window(date));

        summary.sleep_start = Some(base());
        summary.sleep_end = Some(base() + Duration::hours(7));
        assert_eq!(
            query_window(date, Some(&summary), &boundary),
            (base(), base() + Duration::hours(7))
        );
    }

    fn arb_events() -> impl Strategy<Value = Vec<StageEvent>> {
        prop::collection::vec((0i64..20_000, 0u32..3_600, 1i64..4), 0..40)
            .prop_map(|raw| raw.into_iter().map(|(o, s, id)| event(o, s, id)).collect())
    }

    proptest! {
        #[test]
        fn prop_output_never_overlaps(events in arb_events()) {
            let kept = StageStreamDeduplicator.clean(events);
            for pair in kept.windows(2) {
                prop_assert!(pair[1].time >= pair[0].end());
                prop_assert!(pair[1].time > pair[0].time);
            }
        }

        #[test]
        fn prop_clean_is_idempotent(events in arb_events()) {
            let once = StageStreamDeduplicator.clean(events);
            let twice = StageStreamDeduplicator.clean(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_single_session_survives_filter(events in arb_events()) {
            let main = StageStreamDeduplicator.filter_main_session(events);
            if let Some(first) = main.first() {
                prop_assert!(main.iter().all(|e| e.session_id == first.session_id));
            }
        }
    }
}
