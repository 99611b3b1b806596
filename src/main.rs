//! Feed relay binary entrypoint.
//! Loads configuration, starts the delivery queue, the relay and the three schedulers, and
//! runs until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_relay::config::RelayConfig;
use feed_relay::cursor::CursorStore;
use feed_relay::ingest::scheduler::{self, IngestSchedulerCfg};
use feed_relay::ingest::source::HttpSnapshotSource;
use feed_relay::ingest::types::SnapshotSource;
use feed_relay::media::MediaFetcher;
use feed_relay::metrics::Metrics;
use feed_relay::notify::DeliveryQueue;
use feed_relay::pipeline::Relay;

/// Compact text logs by default; JSON lines when FEED_RELAY_LOG_FORMAT=json.
/// Filter comes from RUST_LOG, falling back to `feed_relay=info,warn`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_relay=info,warn"));

    let json = std::env::var("FEED_RELAY_LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load_default().context("loading relay config")?;
    tracing::info!(
        push_url = %cfg.push_url,
        destination = %cfg.destination_id,
        strategy = ?cfg.cursor.strategy,
        "feed relay starting"
    );

    if let Some(addr) = cfg.metrics_addr {
        let metrics = Metrics::init()?;
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr).await {
                tracing::error!(error = ?e, "metrics endpoint stopped");
            }
        });
    }

    let (queue, worker) = DeliveryQueue::start(&cfg.delivery)?;
    let fetcher = MediaFetcher::new(&cfg.media)?;
    let store = CursorStore::new(cfg.cursor.path.clone(), cfg.cursor.strategy);
    let relay = Relay::open(store, fetcher, queue.clone(), cfg.destination()).await;
    let source: Arc<dyn SnapshotSource> = Arc::new(HttpSnapshotSource::new(&cfg.source)?);

    let handles = scheduler::spawn(
        IngestSchedulerCfg::from(&cfg.schedule),
        source,
        relay,
        queue.clone(),
        cfg.heartbeat_job(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("shutting down; draining delivery queue");

    handles.shutdown().await;
    drop(queue);
    let _ = worker.await;
    Ok(())
}
