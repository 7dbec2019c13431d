use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use biorecon::merge::{PriorityMerger, SourcePriority};
use biorecon::models::{DaySummary, IntradaySample, SourceId, SourceValues, StageEvent, StageKind};
use biorecon::quality::ConfidenceScorer;
use biorecon::timeline::StageStreamDeduplicator;

// Throughput of the per-day hot paths with growing input sizes

fn night_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
}

/// Three interleaved sessions with a shifted duplicate of every third event
fn stage_stream(events: usize) -> Vec<StageEvent> {
    (0..events)
        .map(|i| {
            let offset = (i as i64) * 300 + if i % 3 == 0 { 120 } else { 0 };
            StageEvent {
                time: night_start() + Duration::seconds(offset),
                stage: match i % 4 {
                    0 => StageKind::Light,
                    1 => StageKind::Deep,
                    2 => StageKind::Rem,
                    _ => StageKind::Wake,
                },
                seconds: 300,
                session_id: (i % 3) as i64,
            }
        })
        .collect()
}

fn intraday_series(sources: &[&str], minutes: i64) -> SourceValues<Vec<IntradaySample>> {
    sources
        .iter()
        .enumerate()
        .map(|(n, source)| {
            let samples = (0..minutes)
                .map(|m| IntradaySample {
                    time: night_start() + Duration::seconds(m * 60 + n as i64 * 7),
                    bpm: 55 + (m % 40) as u16,
                    confidence: Some(2),
                })
                .collect();
            (SourceId::new(*source), samples)
        })
        .collect()
}

fn bench_stage_deduplication(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stage Deduplication");

    for &size in &[100, 1_000, 10_000] {
        let events = stage_stream(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("clean", size), &events, |b, events| {
            b.iter(|| StageStreamDeduplicator.clean(black_box(events.clone())));
        });
    }

    group.finish();
}

fn bench_intraday_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Intraday Merge");
    let merger = PriorityMerger::new(["fitbit", "nothing_x", "garmin"].into_iter().collect::<SourcePriority>());

    for &minutes in &[60, 1_440, 10_080] {
        let series = intraday_series(&["fitbit", "nothing_x", "garmin"], minutes);

        group.throughput(Throughput::Elements(minutes as u64 * 3));
        group.bench_with_input(BenchmarkId::new("merge_intraday", minutes), &series, |b, series| {
            b.iter(|| merger.merge_intraday(black_box(series)));
        });
    }

    group.finish();
}

fn bench_confidence_scoring(c: &mut Criterion) {
    let scorer = ConfidenceScorer::default();
    let mut summary = DaySummary::empty(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), "bench");
    summary.resting_hr = Some(58);
    summary.hrv_daily_rmssd = Some(42.0);
    summary.steps = Some(9_000);
    summary.sleep_duration_min = Some(430);

    c.bench_function("confidence_score", |b| {
        b.iter(|| scorer.score(black_box(&summary), black_box(720), black_box(30)));
    });
}

criterion_group!(
    benches,
    bench_stage_deduplication,
    bench_intraday_merge,
    bench_confidence_scoring
);
criterion_main!(benches);
