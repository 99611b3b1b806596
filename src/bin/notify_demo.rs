//! Pushes one heartbeat through the delivery queue to check the endpoint wiring.

use feed_relay::{DeliveryQueue, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = RelayConfig::load_default()?;
    let (queue, worker) = DeliveryQueue::start(&cfg.delivery)?;
    queue.enqueue(cfg.heartbeat_job())?;

    // Dropping the last handle lets the worker drain and exit.
    drop(queue);
    worker.await?;

    println!("notify-demo done");
    Ok(())
}
