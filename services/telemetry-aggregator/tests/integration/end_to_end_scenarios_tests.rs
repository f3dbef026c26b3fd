//! End-to-end aggregation runs on virtual time

use crate::support::{connected_bus, two_sensor_config, Collector};
use anyhow::Result;
use services_common::{EventBus, PubSubClient};
use std::time::Duration;
use telemetry_aggregator::{AggregationKind, AggregatorConfig, DataPointConfig, DataPointManager};

const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
/// Keeps sample arrivals off the tick instants
const SAMPLE_PHASE: Duration = Duration::from_secs(5);
const RUN_LENGTH_SECS: u64 = 755;

/// Publish 0..=35 to each topic every 10s, then idle until `total` has elapsed
async fn publish_ramp(bus: &EventBus, topics: &[&str], total: Duration) -> Result<()> {
    let started = tokio::time::Instant::now();
    tokio::time::sleep(SAMPLE_PHASE).await;
    for value in 0..=35u32 {
        for topic in topics {
            bus.publish(topic, value.to_string().into_bytes()).await?;
        }
        tokio::time::sleep(SAMPLE_INTERVAL).await;
    }
    tokio::time::sleep_until(started + total).await;
    Ok(())
}

fn assert_close(actual: Option<f64>, expected: f64, topic: &str) {
    let actual = actual.unwrap_or_else(|| panic!("{topic} never published"));
    assert!(
        (actual - expected).abs() < 1e-9,
        "{topic}: expected {expected}, got {actual}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_rising_then_idle_sensors() -> Result<()> {
    let bus = connected_bus().await;
    let config = two_sensor_config();
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config.clone(), bus.clone())?;

    manager.start().await?;
    publish_ramp(
        &bus,
        &["/test/0/raw", "/test/1/raw"],
        Duration::from_secs(RUN_LENGTH_SECS),
    )
    .await?;
    manager.stop().await;

    // ticks at 30, 60, ..., 750
    let expected_publishes = (RUN_LENGTH_SECS / config.update_cycle_secs) as usize;
    for topic in config.data_points.iter().flat_map(DataPointConfig::output_topics) {
        let count = collector.count(&topic);
        assert!(
            (expected_publishes - 1..=expected_publishes).contains(&count),
            "{topic}: {count} publishes"
        );
    }

    for sensor in ["/test/0/", "/test/1/"] {
        assert_close(collector.last(&format!("{sensor}avg_5min")), 34.0, sensor);
        assert_close(collector.last(&format!("{sensor}wavg_5min")), 241.0 / 7.0, sensor);
    }
    assert_close(collector.last("/test/0/count_2min"), 0.0, "count_2min");
    assert_close(collector.last("/test/0/min_3min"), 33.0, "min_3min");
    assert_close(collector.last("/test/0/max_3min"), 35.0, "max_3min");

    // once input stops the recency-weighted mean stays above the plain one
    let wavg = collector.values("/test/0/wavg_5min");
    let avg = collector.values("/test/0/avg_5min");
    assert!(wavg.iter().zip(&avg).all(|(w, a)| w > a));

    assert_eq!(manager.last_value("/test/0/avg_5min"), Some(34.0));
    assert_eq!(manager.last_value("/test/0/count_2min"), Some(0.0));

    let stats = manager.stats();
    assert_eq!(stats.samples_accepted, 72);
    assert_eq!(stats.jobs_failed, 0);
    assert_eq!(stats.publishes_dropped, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_count_rises_then_drains_to_zero() -> Result<()> {
    let bus = connected_bus().await;
    let config = two_sensor_config();
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config, bus.clone())?;

    manager.start().await?;
    publish_ramp(&bus, &["/test/0/raw"], Duration::from_secs(RUN_LENGTH_SECS)).await?;
    manager.stop().await;

    let counts = collector.values("/test/0/count_2min");
    let peak = counts.iter().copied().fold(0.0, f64::max);
    // a 120s window over 10s samples holds at most 13 of them
    assert!((12.0..=13.0).contains(&peak), "peak count {peak}");
    assert_eq!(counts.last().copied(), Some(0.0));
    assert!(counts.iter().rev().take(10).all(|&c| c == 0.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sensors_do_not_cross_talk() -> Result<()> {
    let bus = connected_bus().await;
    let config = AggregatorConfig::default()
        .with_data_point(
            DataPointConfig::new("/line/a/raw", "/line/a/")
                .with_method("avg_1min", AggregationKind::Avg, 60)
                .with_method("count_1min", AggregationKind::Count, 60),
        )
        .with_data_point(
            DataPointConfig::new("/line/b/raw", "/line/b/")
                .with_method("avg_1min", AggregationKind::Avg, 60)
                .with_method("count_1min", AggregationKind::Count, 60),
        );
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config, bus.clone())?;

    manager.start().await?;
    for value in [100.0, 200.0, 300.0] {
        bus.publish("/line/a/raw", format!("{value}").into_bytes()).await?;
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    tokio::time::sleep(Duration::from_secs(20)).await;
    manager.stop().await;

    assert_eq!(collector.last("/line/a/avg_1min"), Some(200.0));
    assert_eq!(collector.last("/line/a/count_1min"), Some(3.0));
    assert_eq!(collector.count("/line/b/avg_1min"), 0);
    assert_eq!(collector.last("/line/b/count_1min"), Some(0.0));
    assert_eq!(manager.data_points()[1].buffer().len(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_publishing() -> Result<()> {
    let bus = connected_bus().await;
    let config = two_sensor_config();
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config, bus.clone())?;

    manager.start().await?;
    bus.publish("/test/1/raw", b"7".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(65)).await;
    manager.stop().await;
    assert_eq!(collector.count("/test/1/avg_5min"), 2);

    // no ticks while stopped
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(collector.count("/test/1/avg_5min"), 2);

    manager.start().await?;
    tokio::time::sleep(Duration::from_secs(35)).await;
    manager.stop().await;

    assert_eq!(collector.count("/test/1/avg_5min"), 3);
    assert_eq!(collector.last("/test/1/avg_5min"), Some(7.0));
    Ok(())
}
