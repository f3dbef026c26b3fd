//! Aggregation method behaviour over trailing windows

use rstest::*;
use std::time::Duration;
use telemetry_aggregator::{Aggregate, AggregationKind, AggregationMethod, SampleBuffer};
use tokio::time::Instant;

/// Buffer holding the rising ramp 0..=35, one sample every 10 seconds
#[fixture]
fn ramp() -> (SampleBuffer, Instant) {
    let buffer = SampleBuffer::new(1_000);
    let base = Instant::now();
    for i in 0..=35u64 {
        buffer.append(base + Duration::from_secs(i * 10), i as f64);
    }
    (buffer, base)
}

fn method(kind: AggregationKind, window_secs: u64) -> AggregationMethod {
    AggregationMethod::new(
        kind.as_str(),
        kind,
        Duration::from_secs(window_secs),
        format!("/out/{kind}"),
    )
    .unwrap()
}

fn value(aggregate: Aggregate) -> f64 {
    match aggregate {
        Aggregate::Value(v) => v,
        Aggregate::NoData => panic!("expected a value"),
    }
}

#[rstest]
#[case(AggregationKind::Avg, 34.0)]
#[case(AggregationKind::Wavg, 241.0 / 7.0)]
#[case(AggregationKind::Min, 33.0)]
#[case(AggregationKind::Max, 35.0)]
#[case(AggregationKind::Count, 3.0)]
fn test_tail_of_ramp(ramp: (SampleBuffer, Instant), #[case] kind: AggregationKind, #[case] expected: f64) {
    let (buffer, base) = ramp;
    // 20 seconds after the last sample a 40 second window holds 33, 34, 35
    let now = base + Duration::from_secs(370);
    let method = method(kind, 40);

    let result = value(method.compute(&buffer.window(now, method.window())).unwrap());

    assert!((result - expected).abs() < 1e-9, "{kind}: {result} != {expected}");
}

#[rstest]
fn test_wavg_tracks_recent_values(ramp: (SampleBuffer, Instant)) {
    let (buffer, base) = ramp;
    let now = base + Duration::from_secs(350);
    let window = buffer.window(now, Duration::from_secs(300));

    let avg = value(method(AggregationKind::Avg, 300).compute(&window).unwrap());
    let wavg = value(method(AggregationKind::Wavg, 300).compute(&window).unwrap());

    assert_eq!(avg, 20.0);
    assert!(wavg > avg);
    assert!(wavg < 35.0);
}

#[rstest]
#[case(AggregationKind::Avg)]
#[case(AggregationKind::Wavg)]
#[case(AggregationKind::Min)]
#[case(AggregationKind::Max)]
fn test_empty_window_is_no_data(ramp: (SampleBuffer, Instant), #[case] kind: AggregationKind) {
    let (buffer, base) = ramp;
    let now = base + Duration::from_secs(900);
    let method = method(kind, 60);

    let result = method.compute(&buffer.window(now, method.window())).unwrap();

    assert_eq!(result, Aggregate::NoData);
}

#[rstest]
fn test_count_of_empty_window_is_zero(ramp: (SampleBuffer, Instant)) {
    let (buffer, base) = ramp;
    let now = base + Duration::from_secs(900);
    let method = method(AggregationKind::Count, 120);

    let result = method.compute(&buffer.window(now, method.window())).unwrap();

    assert_eq!(result, Aggregate::Value(0.0));
}

#[rstest]
fn test_windows_are_inclusive(ramp: (SampleBuffer, Instant)) {
    let (buffer, base) = ramp;
    // [100, 200] includes both edges
    let now = base + Duration::from_secs(200);

    let window = buffer.window(now, Duration::from_secs(100));

    assert_eq!(window.len(), 11);
    assert_eq!(window.first().map(|s| s.value), Some(10.0));
    assert_eq!(window.last().map(|s| s.value), Some(20.0));
}

#[test]
fn test_zero_window_rejected() {
    let result = AggregationMethod::new("bad", AggregationKind::Avg, Duration::ZERO, "/out/bad");
    assert!(result.is_err());
}
