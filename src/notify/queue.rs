// src/notify/queue.rs
//! Sequential, jittered delivery to the messaging endpoint.
//!
//! One worker task drains an unbounded FIFO. A single request is in flight at a time, and
//! while more jobs are waiting the worker sleeps a random delay between attempts so a
//! backlog does not hammer the endpoint. Every job gets exactly one attempt.

use metrics::counter;
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::Client;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use super::payload::DeliveryJob;
use crate::config::DeliveryConfig;
use crate::error::{RelayError, Result};

/// Producer handle. Cheap to clone; the worker exits once every handle is dropped and the
/// queue is drained.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl DeliveryQueue {
    /// Spawn the worker and return the producer handle plus the worker's join handle.
    pub fn start(cfg: &DeliveryConfig) -> Result<(Self, JoinHandle<()>)> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("building delivery http client: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(
            client,
            rx,
            Duration::from_millis(cfg.min_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        );
        info!(
            min_delay_ms = cfg.min_delay_ms,
            max_delay_ms = cfg.max_delay_ms,
            "delivery queue started"
        );
        Ok((Self { tx }, worker))
    }

    /// Append a job. Never blocks; fails only when the worker is gone.
    pub fn enqueue(&self, job: DeliveryJob) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|_| RelayError::Delivery("delivery worker has stopped".to_string()))
    }
}

/// Uniform delay in `[min, max]` at millisecond resolution.
pub fn jitter_delay<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let lo_ms = u64::try_from(lo.as_millis()).unwrap_or(u64::MAX);
    let hi_ms = u64::try_from(hi.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rng.random_range(lo_ms..=hi_ms))
}

fn spawn_worker(
    client: Client,
    mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    min_delay: Duration,
    max_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_os_rng();
        while let Some(job) = rx.recv().await {
            match dispatch(&client, &job).await {
                Ok(()) => {
                    counter!("relay_delivery_success_total").increment(1);
                }
                Err(e) => {
                    counter!("relay_delivery_failures_total").increment(1);
                    warn!(error = %e, url = %job.destination.push_url, "delivery failed; job discarded");
                }
            }
            if !rx.is_empty() {
                let delay = jitter_delay(&mut rng, min_delay, max_delay);
                debug!(delay_ms = delay.as_millis() as u64, "spacing next delivery");
                sleep(delay).await;
            }
        }
        info!("delivery worker exiting");
    })
}

async fn dispatch(client: &Client, job: &DeliveryJob) -> Result<()> {
    let payload = job.payload();
    let resp = client
        .post(&job.destination.push_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| RelayError::Delivery(format!("transport: {e}")))?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if status.is_success() {
        debug!(%status, body = %body, "delivered");
        Ok(())
    } else {
        Err(RelayError::Delivery(format!("HTTP {status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(1500);
        for _ in 0..1_000 {
            let d = jitter_delay(&mut rng, min, max);
            assert!(d >= min && d <= max, "{d:?} out of range");
        }
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = jitter_delay(&mut rng, Duration::from_millis(20), Duration::from_millis(10));
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn enqueue_fails_after_worker_stops() {
        let (queue, worker) = DeliveryQueue::start(&DeliveryConfig::default()).unwrap();
        worker.abort();
        let _ = worker.await;
        let dest = std::sync::Arc::new(crate::notify::Destination::new("http://127.0.0.1:9", "1", "group_id"));
        assert!(queue.enqueue(DeliveryJob::heartbeat(dest, "x")).is_err());
    }
}
