//! Failures stay inside the job, sample or publish that caused them

use crate::support::{connected_bus, Collector, FlakyBus};
use anyhow::Result;
use services_common::PubSubClient;
use std::sync::Arc;
use std::time::Duration;
use telemetry_aggregator::{AggregationKind, AggregatorConfig, DataPointConfig, DataPointManager};

fn sensor_config() -> AggregatorConfig {
    AggregatorConfig::default()
        .with_data_point(
            DataPointConfig::new("/hot/raw", "/hot/")
                .with_method("avg", AggregationKind::Avg, 60)
                .with_method("max", AggregationKind::Max, 60),
        )
        .with_data_point(
            DataPointConfig::new("/cold/raw", "/cold/").with_method("avg", AggregationKind::Avg, 60),
        )
}

#[tokio::test(start_paused = true)]
async fn test_overflowing_job_does_not_affect_siblings() -> Result<()> {
    let bus = connected_bus().await;
    let config = sensor_config();
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config, bus.clone())?;
    manager.start().await?;

    bus.publish("/hot/raw", b"10".to_vec()).await?;
    bus.publish("/cold/raw", b"-4".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(collector.last("/hot/avg"), Some(10.0));

    // the sum overflows, so the mean cannot be computed
    let huge = f64::MAX.to_string().into_bytes();
    bus.publish("/hot/raw", huge.clone()).await?;
    bus.publish("/hot/raw", huge).await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    manager.stop().await;

    let stats = manager.stats();
    assert_eq!(stats.jobs_failed, 1);
    // the failed cycle published nothing and kept the last valid value
    assert_eq!(collector.values("/hot/avg"), [10.0]);
    assert_eq!(manager.last_value("/hot/avg"), Some(10.0));
    assert_eq!(collector.last("/hot/max"), Some(f64::MAX));
    assert_eq!(collector.values("/cold/avg"), [-4.0, -4.0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_samples_are_dropped() -> Result<()> {
    let bus = connected_bus().await;
    let config = sensor_config();
    let collector = Collector::attach(&bus, &config).await;
    let manager = DataPointManager::new(config, bus.clone())?;
    manager.start().await?;

    for payload in ["12", "twelve", "", "NaN", "14", "inf"] {
        bus.publish("/cold/raw", payload.as_bytes().to_vec()).await?;
    }
    tokio::time::sleep(Duration::from_secs(31)).await;
    manager.stop().await;

    let stats = manager.stats();
    assert_eq!(stats.samples_accepted, 2);
    assert_eq!(stats.samples_rejected, 4);
    assert_eq!(manager.data_points()[1].buffer().len(), 2);
    assert_eq!(collector.last("/cold/avg"), Some(13.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_still_completes_job() -> Result<()> {
    let inner = connected_bus().await;
    let flaky = Arc::new(FlakyBus::new(Arc::clone(&inner)));
    let manager = DataPointManager::new(sensor_config(), flaky.clone())?;
    manager.start().await?;

    inner.publish("/hot/raw", b"1".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(manager.last_value("/hot/avg"), Some(1.0));

    flaky.set_fail_publish(true);
    inner.publish("/hot/raw", b"5".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    manager.stop().await;

    let stats = manager.stats();
    // /hot/avg and /hot/max each failed once; /cold/avg never had data
    assert_eq!(stats.publishes_failed, 2);
    assert_eq!(stats.jobs_failed, 0);
    assert_eq!(stats.jobs_completed, stats.jobs_submitted);
    assert_eq!(flaky.publish_attempts(), 4);
    // last-valid follows the computed value even though it never left
    assert_eq!(manager.last_value("/hot/avg"), Some(3.0));
    assert_eq!(manager.last_value("/hot/max"), Some(5.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_disconnected_transport() -> Result<()> {
    let bus = connected_bus().await;
    let manager = DataPointManager::new(sensor_config(), bus.clone())?;
    manager.start().await?;

    bus.publish("/hot/raw", b"3".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    bus.disconnect().await?;
    tokio::time::sleep(Duration::from_secs(30)).await;

    // unsubscribing fails on the dropped subscriptions, stop still completes
    manager.stop().await;

    assert!(!manager.is_running());
    assert_eq!(manager.active_workers(), 0);
    assert_eq!(manager.subscription_count(), 0);
    let stats = manager.stats();
    assert_eq!(stats.publishes_failed, 2);
    assert_eq!(stats.unsubscribes_failed, 2);
    Ok(())
}
