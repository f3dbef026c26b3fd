//! Sample buffer ordering, eviction and concurrent access

use rstest::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemetry_aggregator::SampleBuffer;
use tokio::time::Instant;

#[fixture]
fn base() -> Instant {
    Instant::now()
}

#[rstest]
fn test_out_of_order_timestamps_are_clamped(base: Instant) {
    let buffer = SampleBuffer::new(16);
    buffer.append(base + Duration::from_secs(10), 1.0);
    buffer.append(base, 2.0);

    let window = buffer.window(base + Duration::from_secs(10), Duration::from_secs(1));

    assert_eq!(window.len(), 2);
    assert!(window.windows(2).all(|pair| pair[0].ts <= pair[1].ts));
}

#[rstest]
fn test_size_cap_evicts_oldest(base: Instant) {
    let buffer = SampleBuffer::new(3);
    let evicted: usize = (0..5)
        .map(|i| buffer.append(base + Duration::from_secs(i), i as f64))
        .sum();

    assert_eq!(evicted, 2);
    assert_eq!(buffer.len(), 3);
    let window = buffer.window(base + Duration::from_secs(10), Duration::from_secs(60));
    let values: Vec<f64> = window.iter().map(|s| s.value).collect();
    assert_eq!(values, [2.0, 3.0, 4.0]);
}

#[rstest]
fn test_purge_keeps_boundary_sample(base: Instant) {
    let buffer = SampleBuffer::new(16);
    for i in 0..6u64 {
        buffer.append(base + Duration::from_secs(i * 10), i as f64);
    }

    // cutoff at exactly base + 20s: that sample survives
    let removed = buffer.purge(base + Duration::from_secs(50), Duration::from_secs(30));

    assert_eq!(removed, 2);
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.purge(base + Duration::from_secs(50), Duration::from_secs(30)), 0);
}

#[rstest]
fn test_window_does_not_mutate(base: Instant) {
    let buffer = SampleBuffer::new(16);
    buffer.append(base, 1.0);
    buffer.append(base + Duration::from_secs(5), 2.0);

    let _ = buffer.window(base + Duration::from_secs(5), Duration::from_secs(1));

    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.latest().map(|s| s.value), Some(2.0));
}

#[rstest]
fn test_readers_never_see_torn_state(base: Instant) {
    let buffer = Arc::new(SampleBuffer::new(10_000));

    let writer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for i in 0..5_000u64 {
                buffer.append(base + Duration::from_millis(i), i as f64);
                if i % 500 == 0 {
                    buffer.purge(base + Duration::from_millis(i), Duration::from_millis(200));
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for _ in 0..500 {
                    let window = buffer.window(base + Duration::from_secs(10), Duration::from_secs(10));
                    // values equal their millisecond offset, so order and
                    // contiguity reveal any partially applied update
                    assert!(window.windows(2).all(|pair| pair[1].value == pair[0].value + 1.0));
                    assert!(window.windows(2).all(|pair| pair[0].ts <= pair[1].ts));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
