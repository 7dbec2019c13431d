//! Source-priority conflict resolution
//!
//! Every per-day metric reported by more than one source goes through
//! [`PriorityMerger`]: the highest-ranked source with a plausible value wins, and when
//! no source is plausible the highest-ranked source with any value is kept rather
//! than dropping the metric.

use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;

use crate::models::{IntradaySample, SourceId, SourceValues};

/// Ordered source ranking, highest priority first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    order: Vec<SourceId>,
}

impl SourcePriority {
    pub fn new(order: Vec<SourceId>) -> Self {
        Self { order }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceId> {
        self.order.iter()
    }

    /// Position in the ranking, `None` for unranked sources
    pub fn rank(&self, source: &SourceId) -> Option<usize> {
        self.order.iter().position(|s| s == source)
    }
}

impl<S: Into<String>> FromIterator<S> for SourcePriority {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|s| SourceId::new(s)).collect())
    }
}

/// Winning candidate of a merge
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a, T> {
    pub source: &'a SourceId,
    pub value: &'a T,

    /// False when every candidate failed the predicate and this is the fallback
    pub plausible: bool,
}

#[derive(Debug, Clone)]
pub struct PriorityMerger {
    priority: SourcePriority,
}

impl PriorityMerger {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    /// Pick the winning candidate. Candidates from unranked sources are ignored.
    pub fn resolve<'a, T, P>(&'a self, candidates: &'a SourceValues<T>, is_plausible: P) -> Option<Resolution<'a, T>>
    where
        P: Fn(&T) -> bool,
    {
        let mut fallback = None;

        for source in self.priority.iter() {
            let Some(value) = candidates.get(source) else {
                continue;
            };
            if is_plausible(value) {
                return Some(Resolution { source, value, plausible: true });
            }
            if fallback.is_none() {
                fallback = Some(Resolution { source, value, plausible: false });
            }
        }

        fallback
    }

    pub fn merge<T, P>(&self, candidates: &SourceValues<T>, is_plausible: P) -> Option<T>
    where
        T: Clone,
        P: Fn(&T) -> bool,
    {
        self.resolve(candidates, is_plausible).map(|r| r.value.clone())
    }

    /// Merge one field of a composite reading. Readings where `extract` yields
    /// nothing do not count as candidates for that field.
    pub fn merge_by<R, T, E, P>(&self, readings: &SourceValues<R>, extract: E, is_plausible: P) -> Option<T>
    where
        T: Clone,
        E: Fn(&R) -> Option<T>,
        P: Fn(&T) -> bool,
    {
        let candidates: SourceValues<T> = readings
            .iter()
            .filter_map(|(source, reading)| extract(reading).map(|v| (source.clone(), v)))
            .collect();
        self.merge(&candidates, is_plausible)
    }

    /// One sample per minute across all sources
    ///
    /// Timestamps are truncated to the minute. Within a source the first sample of a
    /// minute is kept; across sources the higher-ranked source wins the minute.
    pub fn merge_intraday(&self, series: &SourceValues<Vec<IntradaySample>>) -> Vec<IntradaySample> {
        let mut by_minute: BTreeMap<DateTime<Utc>, (usize, IntradaySample)> = BTreeMap::new();

        for (source, samples) in series {
            let Some(rank) = self.priority.rank(source) else {
                continue;
            };

            for sample in samples {
                let minute = truncate_to_minute(sample.time);
                let candidate = IntradaySample { time: minute, ..sample.clone() };

                let taken = by_minute
                    .get(&minute)
                    .is_some_and(|(existing_rank, _)| *existing_rank <= rank);
                if !taken {
                    by_minute.insert(minute, (rank, candidate));
                }
            }
        }

        by_minute.into_values().map(|(_, sample)| sample).collect()
    }
}

fn truncate_to_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}
