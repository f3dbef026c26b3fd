//! Telemetry Aggregator Service
//!
//! Runs the aggregation engine on an in-process event bus until Ctrl+C or
//! SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use services_common::{EventBus, EventBusConfig, PubSubClient, TopicHandler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry_aggregator::{AggregationKind, AggregatorConfig, DataPointConfig, DataPointManager};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "telemetry-aggregator";
const DEMO_SAMPLE_INTERVAL_SECS: u64 = 10;
const DEMO_RAMP_END: u32 = 35;

#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "Windowed telemetry aggregation engine")]
struct Args {
    /// JSON configuration file; the built-in demo layout is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feed a synthetic ramp into every input topic and log all aggregates
    #[arg(long)]
    demo: bool,

    /// Override the update cycle in seconds
    #[arg(long)]
    update_cycle: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    info!("Starting Telemetry Aggregator Service v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => AggregatorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => demo_config(),
    };
    if let Some(secs) = args.update_cycle {
        config.update_cycle_secs = secs;
    }

    let bus = Arc::new(EventBus::new(EventBusConfig {
        source: SERVICE_NAME.to_string(),
        ..EventBusConfig::default()
    }));
    bus.connect().await?;

    if args.demo {
        log_outputs(&bus, &config).await?;
    }

    let manager = DataPointManager::new(config, bus.clone())?;
    manager.start().await?;

    let feeder = args.demo.then(|| {
        let topics: Vec<String> = manager
            .data_points()
            .iter()
            .map(|dp| dp.input_topic().to_string())
            .collect();
        tokio::spawn(feed_ramp(bus.clone(), topics))
    });

    shutdown_signal().await;

    if let Some(feeder) = feeder {
        feeder.abort();
    }
    manager.stop().await;
    info!(stats = ?manager.stats(), "Final statistics");
    bus.disconnect().await?;

    Ok(())
}

/// Two sensors: the first with the full method set, the second with the means
fn demo_config() -> AggregatorConfig {
    AggregatorConfig::default()
        .with_data_point(
            DataPointConfig::new("/test/0/raw", "/test/0/")
                .with_method("wavg_5min", AggregationKind::Wavg, 300)
                .with_method("avg_5min", AggregationKind::Avg, 300)
                .with_method("count_2min", AggregationKind::Count, 120)
                .with_method("min_3min", AggregationKind::Min, 180)
                .with_method("max_3min", AggregationKind::Max, 180),
        )
        .with_data_point(
            DataPointConfig::new("/test/1/raw", "/test/1/")
                .with_method("wavg_5min", AggregationKind::Wavg, 300)
                .with_method("avg_5min", AggregationKind::Avg, 300),
        )
}

async fn log_outputs(bus: &EventBus, config: &AggregatorConfig) -> Result<()> {
    for topic in config.data_points.iter().flat_map(DataPointConfig::output_topics) {
        let label = topic.clone();
        let handler: TopicHandler = Arc::new(move |payload: &[u8]| {
            info!(topic = %label, value = %String::from_utf8_lossy(payload), "Aggregate");
        });
        bus.subscribe(&topic, handler).await?;
    }
    Ok(())
}

/// Publish 0..=35 to every topic, one value per interval, then go quiet
async fn feed_ramp(bus: Arc<EventBus>, topics: Vec<String>) {
    let mut interval = tokio::time::interval(Duration::from_secs(DEMO_SAMPLE_INTERVAL_SECS));
    for value in 0..=DEMO_RAMP_END {
        interval.tick().await;
        for topic in &topics {
            if let Err(e) = bus.publish(topic, value.to_string().into_bytes()).await {
                error!(topic = %topic, error = %e, "Failed to publish demo sample");
            }
        }
    }
    info!("Demo ramp finished");
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Initialize tracing
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", SERVICE_NAME.replace('-', "_")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    Ok(())
}
