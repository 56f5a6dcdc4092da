//! End-to-end tests: ingest through the pipeline, query through the engine.

use pulsevault::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Harness {
    index: Arc<SeriesIndex>,
    store: Arc<SampleStore>,
    ingester: Ingester,
    engine: QueryEngine,
    base: i64,
}

fn harness() -> Harness {
    harness_with(StoreConfig::default())
}

fn harness_with(config: StoreConfig) -> Harness {
    let clock = Arc::new(BoundedClock::default());
    let base = clock.now_micros();
    let index = Arc::new(SeriesIndex::new());
    let store = Arc::new(SampleStore::new(config, clock).unwrap());
    let ingester = Ingester::new(Arc::clone(&index), Arc::clone(&store));
    let engine = QueryEngine::new(Arc::clone(&index), Arc::clone(&store));
    Harness {
        index,
        store,
        ingester,
        engine,
        base,
    }
}

fn cpu(host: &str) -> MetricIdentity {
    MetricIdentity::new("cpu", vec![Label::new("host", host)]).unwrap()
}

#[test]
fn sum_over_two_buckets_matches_expected_points() {
    let h = harness();

    h.ingester
        .ingest(&cpu("a"), Sample::new(h.base + 100, 1.0))
        .unwrap();
    h.ingester
        .ingest(&cpu("a"), Sample::new(h.base + 160, 3.0))
        .unwrap();

    let request = QueryRequest {
        name: "cpu".to_string(),
        matchers: vec![LabelMatcher::eq("host", "a")],
        range: TimeRange::new(h.base + 100, h.base + 220),
        aggregation: Aggregation::Sum,
        step: 60,
    };
    let points = h.engine.query(&request, &CancellationToken::new()).unwrap();

    let got: Vec<(i64, f64)> = points
        .iter()
        .map(|p| (p.timestamp - h.base, p.value))
        .collect();
    assert_eq!(got, vec![(100, 1.0), (160, 3.0)]);
}

#[test]
fn scan_returns_exactly_the_accepted_samples_in_order() {
    let mut config = StoreConfig::default();
    config.chunk_max_samples = 3; // force rotations mid-stream
    let h = harness_with(config);

    // Interleave two series, out of order within each, with one overwrite.
    let writes = [
        ("a", 50, 5.0),
        ("b", 10, 1.0),
        ("a", 10, 1.0),
        ("b", 50, 5.0),
        ("a", 30, 3.0),
        ("a", 30, 9.0), // overwrite wins
        ("b", 20, 2.0),
    ];
    for (host, offset, value) in writes {
        h.ingester
            .ingest(&cpu(host), Sample::new(h.base + offset, value))
            .unwrap();
    }

    let id_a = h.index.lookup("cpu", &[LabelMatcher::eq("host", "a")])[0];
    let got: Vec<(i64, f64)> = h
        .store
        .scan(id_a, TimeRange::new(h.base, h.base + 1000))
        .map(|s| (s.timestamp - h.base, s.value))
        .collect();
    assert_eq!(got, vec![(10, 1.0), (30, 9.0), (50, 5.0)]);

    let id_b = h.index.lookup("cpu", &[LabelMatcher::eq("host", "b")])[0];
    let got: Vec<i64> = h
        .store
        .scan(id_b, TimeRange::new(h.base, h.base + 1000))
        .map(|s| s.timestamp - h.base)
        .collect();
    assert_eq!(got, vec![10, 20, 50]);
}

#[test]
fn batch_partial_failure_reports_per_item() {
    let h = harness();
    let stale = h.base - 3_600_000_000; // 1 hour before the harness started

    let results = h.ingester.ingest_batch(vec![
        (cpu("a"), Sample::new(h.base, 1.0)),
        (cpu("a"), Sample::new(stale, 2.0)),
        (cpu("a"), Sample::new(h.base + 1, f64::NAN)),
        (cpu("a"), Sample::new(h.base + 2, 3.0)),
    ]);

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::TooLate { .. })));
    assert!(matches!(results[2], Err(Error::Validation(_))));
    assert!(results[3].is_ok());

    // Only the accepted samples are visible.
    let id = results[0].as_ref().copied().unwrap();
    let count = h.store.scan(id, TimeRange::new(0, i64::MAX)).count();
    assert_eq!(count, 2);
}

#[test]
fn query_with_no_matching_series_is_empty() {
    let h = harness();
    h.ingester
        .ingest(&cpu("a"), Sample::new(h.base, 1.0))
        .unwrap();

    let request = QueryRequest {
        name: "cpu".to_string(),
        matchers: vec![LabelMatcher::eq("host", "z")],
        range: TimeRange::new(h.base, h.base + 100),
        aggregation: Aggregation::Avg,
        step: 10,
    };
    let points = h.engine.query(&request, &CancellationToken::new()).unwrap();
    assert!(points.is_empty());
}

#[test]
fn rate_across_hosts_sums_per_series_rates() {
    let h = harness();
    let step = 1_000_000; // 1 second

    // Two counters increasing at 10/s and 20/s.
    for i in 0..3i64 {
        h.ingester
            .ingest(&cpu("a"), Sample::new(h.base + i * step, (i * 10) as f64))
            .unwrap();
        h.ingester
            .ingest(&cpu("b"), Sample::new(h.base + i * step, (i * 20) as f64))
            .unwrap();
    }

    let request = QueryRequest {
        name: "cpu".to_string(),
        matchers: vec![],
        range: TimeRange::new(h.base, h.base + 3 * step),
        aggregation: Aggregation::Rate,
        step,
    };
    let points = h.engine.query(&request, &CancellationToken::new()).unwrap();
    let got: Vec<(i64, f64)> = points
        .iter()
        .map(|p| ((p.timestamp - h.base) / step, p.value))
        .collect();
    assert_eq!(got, vec![(1, 30.0), (2, 30.0)]);
}

#[test]
fn label_presence_matcher_selects_labeled_series_only() {
    let h = harness();
    let labeled = cpu("a");
    let bare = MetricIdentity::bare("cpu").unwrap();

    h.ingester
        .ingest(&labeled, Sample::new(h.base, 1.0))
        .unwrap();
    h.ingester.ingest(&bare, Sample::new(h.base, 5.0)).unwrap();

    let request = QueryRequest {
        name: "cpu".to_string(),
        matchers: vec![LabelMatcher::present("host")],
        range: TimeRange::new(h.base, h.base + 60),
        aggregation: Aggregation::Sum,
        step: 60,
    };
    let points = h.engine.query(&request, &CancellationToken::new()).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, 1.0);
}

#[test]
fn visible_after_ack_across_chunk_rotation() {
    let mut config = StoreConfig::default();
    config.chunk_max_samples = 2;
    let h = harness_with(config);

    for i in 0..7i64 {
        h.ingester
            .ingest(&cpu("a"), Sample::new(h.base + i, i as f64))
            .unwrap();
        // Every acknowledged write is immediately visible.
        let id = h.index.lookup("cpu", &[])[0];
        let count = h.store.scan(id, TimeRange::new(0, i64::MAX)).count();
        assert_eq!(count, (i + 1) as usize);
    }
}
