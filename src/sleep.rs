//! Sleep session selection and stage aggregation
//!
//! Sources report overlapping and fragmentary sessions for the same night. One session
//! per source is kept (the longest overlapping the night's window), the source ranking
//! picks between sources, and the chosen session's stages are summed into minutes.

use chrono::{DateTime, Utc};

use crate::merge::PriorityMerger;
use crate::models::{
    DaySummary, RawSleepSession, SleepSessionCandidate, SleepType, SourceValues, StageEvent,
    StageKind, StageMinutes,
};
use crate::plausibility::predicates;

/// Map a raw export stage code to a stage bucket
///
/// Codes: 1 awake, 2 generic sleeping (counted as light), 4 light, 5 deep, 6 REM.
/// Anything else (out-of-bed, unknown) has no bucket.
pub fn map_stage_code(code: i32) -> Option<StageKind> {
    match code {
        1 => Some(StageKind::Wake),
        2 | 4 => Some(StageKind::Light),
        5 => Some(StageKind::Deep),
        6 => Some(StageKind::Rem),
        _ => None,
    }
}

/// The night's chosen session with everything derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedSleep {
    pub candidate: SleepSessionCandidate,

    /// Mapped stages of the chosen session, time ordered
    pub stage_events: Vec<StageEvent>,

    /// Minutes from session start to the first non-wake stage
    pub onset_latency_min: Option<u32>,

    pub sleep_type: SleepType,
}

impl ReconstructedSleep {
    /// Copy the session into the day's sleep fields
    pub fn apply_to(&self, summary: &mut DaySummary) {
        let minutes = &self.candidate.stage_minutes;
        summary.sleep_start = Some(self.candidate.start);
        summary.sleep_end = Some(self.candidate.end);
        summary.sleep_duration_min = Some(self.candidate.duration_min);
        summary.sleep_minutes_asleep = Some(minutes.asleep());
        summary.sleep_minutes_awake = Some(minutes.awake());
        summary.sleep_onset_latency_min = self.onset_latency_min;
        summary.sleep_type = Some(self.sleep_type);
        summary.sleep_deep_min = Some(minutes.deep);
        summary.sleep_light_min = Some(minutes.light);
        summary.sleep_rem_min = Some(minutes.rem);
        summary.sleep_wake_min = Some(minutes.wake);
        summary.sleep_is_main = true;
    }
}

pub struct SleepSessionReconstructor<'a> {
    merger: &'a PriorityMerger,
}

impl<'a> SleepSessionReconstructor<'a> {
    pub fn new(merger: &'a PriorityMerger) -> Self {
        Self { merger }
    }

    /// Longest session per source overlapping `[from, to)`; the first seen wins a tie
    pub fn longest_per_source<'s>(
        &self,
        sessions: &'s [RawSleepSession],
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> SourceValues<&'s RawSleepSession> {
        let (from, to) = window;
        let mut best: SourceValues<&'s RawSleepSession> = SourceValues::new();

        for session in sessions.iter().filter(|s| s.start < to && s.end > from) {
            let replace = best
                .get(&session.source)
                .map_or(true, |current| session.duration_seconds() > current.duration_seconds());
            if replace {
                best.insert(session.source.clone(), session);
            }
        }

        best
    }

    /// Choose the night's session. Session choice is by duration and source rank only.
    pub fn reconstruct(
        &self,
        sessions: &[RawSleepSession],
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Option<ReconstructedSleep> {
        let per_source = self.longest_per_source(sessions, window);
        let chosen = self.merger.merge(&per_source, predicates::any)?;
        Some(Self::aggregate(chosen))
    }

    fn aggregate(session: &RawSleepSession) -> ReconstructedSleep {
        let mut seconds = [0i64; 4];
        let mut stage_events = Vec::with_capacity(session.stages.len());

        for raw in &session.stages {
            let Some(stage) = map_stage_code(raw.code) else {
                continue;
            };
            let length = (raw.end - raw.start).num_seconds().max(0);
            seconds[bucket(stage)] += length;
            stage_events.push(StageEvent {
                time: raw.start,
                stage,
                seconds: u32::try_from(length).unwrap_or(u32::MAX),
                session_id: session.session_id,
            });
        }
        stage_events.sort_by_key(|e| e.time);

        let to_minutes = |s: i64| u32::try_from(s / 60).unwrap_or(u32::MAX);
        let stage_minutes = StageMinutes {
            deep: to_minutes(seconds[bucket(StageKind::Deep)]),
            light: to_minutes(seconds[bucket(StageKind::Light)]),
            rem: to_minutes(seconds[bucket(StageKind::Rem)]),
            wake: to_minutes(seconds[bucket(StageKind::Wake)]),
        };

        let onset_latency_min = stage_events
            .iter()
            .find(|e| e.stage.is_asleep())
            .map(|e| to_minutes((e.time - session.start).num_seconds().max(0)));

        let sleep_type = if stage_events
            .iter()
            .any(|e| matches!(e.stage, StageKind::Deep | StageKind::Rem))
        {
            SleepType::Stages
        } else {
            SleepType::Classic
        };

        ReconstructedSleep {
            candidate: SleepSessionCandidate {
                source: session.source.clone(),
                session_id: session.session_id,
                start: session.start,
                end: session.end,
                duration_min: to_minutes(session.duration_seconds().max(0)),
                stage_minutes,
            },
            stage_events,
            onset_latency_min,
            sleep_type,
        }
    }
}

fn bucket(stage: StageKind) -> usize {
    match stage {
        StageKind::Deep => 0,
        StageKind::Light => 1,
        StageKind::Rem => 2,
        StageKind::Wake => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawStage, SourceId};
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // hours from 1 March 00:00 UTC
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h as i64) + Duration::minutes(m as i64)
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (at(12, 0), at(38, 0))
    }

    fn session(id: i64, source: &str, start: DateTime<Utc>, minutes: i64, stages: Vec<(i64, i64, i32)>) -> RawSleepSession {
        RawSleepSession {
            session_id: id,
            source: SourceId::new(source),
            start,
            end: start + Duration::minutes(minutes),
            stages: stages
                .into_iter()
                .map(|(offset, len, code)| RawStage {
                    start: start + Duration::minutes(offset),
                    end: start + Duration::minutes(offset + len),
                    code,
                })
                .collect(),
        }
    }

    fn merger() -> PriorityMerger {
        PriorityMerger::new(["fitbit", "nothing_x"].into_iter().collect())
    }

    #[test]
    fn test_stage_code_mapping() {
        assert_eq!(map_stage_code(1), Some(StageKind::Wake));
        assert_eq!(map_stage_code(2), Some(StageKind::Light));
        assert_eq!(map_stage_code(4), Some(StageKind::Light));
        assert_eq!(map_stage_code(5), Some(StageKind::Deep));
        assert_eq!(map_stage_code(6), Some(StageKind::Rem));
        assert_eq!(map_stage_code(3), None);
        assert_eq!(map_stage_code(7), None);
    }

    #[test]
    fn test_longest_session_per_source() {
        let sessions = vec![
            session(1, "nothing_x", at(23, 0), 300, vec![]),
            session(2, "nothing_x", at(29, 0), 420, vec![]),
            session(3, "nothing_x", at(36, 0), 420, vec![]),
        ];
        let m = merger();
        let best = SleepSessionReconstructor::new(&m).longest_per_source(&sessions, window());
        // tie between 2 and 3 goes to the first seen
        assert_eq!(best[&SourceId::new("nothing_x")].session_id, 2);
    }

    #[test]
    fn test_primary_source_wins_even_if_shorter() {
        let sessions = vec![
            session(10, "nothing_x", at(22, 0), 540, vec![]),
            session(20, "fitbit", at(23, 0), 400, vec![(0, 400, 4)]),
        ];
        let m = merger();
        let sleep = SleepSessionReconstructor::new(&m).reconstruct(&sessions, window()).unwrap();
        assert_eq!(sleep.candidate.session_id, 20);
        assert_eq!(sleep.candidate.duration_min, 400);
    }

    #[test]
    fn test_stage_aggregation() {
        let stages = vec![
            (0, 15, 1),   // wake
            (15, 60, 4),  // light
            (75, 90, 5),  // deep
            (165, 30, 2), // sleeping -> light
            (195, 45, 6), // rem
            (240, 10, 3), // out of bed, dropped
            (250, 20, 1), // wake
        ];
        let sessions = vec![session(7, "fitbit", at(23, 0), 270, stages)];
        let m = merger();
        let sleep = SleepSessionReconstructor::new(&m).reconstruct(&sessions, window()).unwrap();

        let minutes = sleep.candidate.stage_minutes;
        assert_eq!(minutes, StageMinutes { deep: 90, light: 90, rem: 45, wake: 35 });
        assert_eq!(minutes.asleep(), 225);
        assert_eq!(sleep.onset_latency_min, Some(15));
        assert_eq!(sleep.sleep_type, SleepType::Stages);
        assert_eq!(sleep.stage_events.len(), 6);
        assert!(sleep.stage_events.iter().all(|e| e.session_id == 7));
    }

    #[test]
    fn test_classic_when_no_deep_or_rem() {
        let sessions = vec![session(1, "nothing_x", at(23, 0), 60, vec![(0, 60, 2)])];
        let m = merger();
        let sleep = SleepSessionReconstructor::new(&m).reconstruct(&sessions, window()).unwrap();
        assert_eq!(sleep.sleep_type, SleepType::Classic);
        assert_eq!(sleep.onset_latency_min, Some(0));
    }

    #[test]
    fn test_no_sessions_in_window() {
        let sessions = vec![session(1, "fitbit", at(40, 0), 60, vec![])];
        let m = merger();
        assert!(SleepSessionReconstructor::new(&m).reconstruct(&sessions, window()).is_none());
    }

    #[test]
    fn test_apply_to_summary() {
        let sessions = vec![session(7, "fitbit", at(23, 0), 90, vec![(0, 30, 4), (30, 60, 5)])];
        let m = merger();
        let sleep = SleepSessionReconstructor::new(&m).reconstruct(&sessions, window()).unwrap();

        let mut day = DaySummary::empty(chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), "fitbit");
        sleep.apply_to(&mut day);
        assert_eq!(day.sleep_duration_min, Some(90));
        assert_eq!(day.sleep_minutes_asleep, Some(90));
        assert_eq!(day.sleep_minutes_awake, Some(0));
        assert!(day.sleep_is_main);
        assert!(day.has_sleep_window());
    }
}
