use std::sync::Arc;

use anyhow::Context;
use ohlcv_aggregator::config::AggregatorConfig;
use ohlcv_aggregator::feed::{read_frames, supervise};
use ohlcv_aggregator::service::AggregatorService;
use ohlcv_aggregator::sink::LogSink;
use ohlcv_aggregator::SERVICE_VERSION;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AggregatorConfig::from_env().context("loading aggregator configuration")?;
    info!(version = SERVICE_VERSION, symbol = %config.symbol, "Starting OHLCV aggregator");

    let sink = Arc::new(LogSink::new(config.symbol.clone()));
    let service = AggregatorService::spawn(&config, sink);
    let reader = tokio::spawn(read_frames(
        BufReader::new(tokio::io::stdin()),
        service.feed(),
    ));

    let run_for = config.run_for;
    let stop = async move {
        let deadline = async {
            match run_for {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Ctrl-C handler unavailable, stopping"),
            },
            _ = deadline => info!("Run duration elapsed"),
        }
    };

    // a failed feed reader stops the service and is reported from main
    let outcome = supervise(stop, reader).await;

    let metrics = service.metrics();
    let bars = service.shutdown().await?;

    info!(bars = bars.len(), "Aggregator finished");
    for (name, value) in metrics.export() {
        info!(metric = %name, value, "Metric");
    }
    if let Some(p99) = metrics.tick_p99_ns() {
        info!(tick_p99_us = p99 / 1_000, "Tick latency");
    }
    outcome.context("feed input failed")?;
    Ok(())
}
