// src/ingest/scheduler.rs
//! Three independent timers: page reload, snapshot polling and heartbeat.
//!
//! Only polling is gated by page-load state. The reloader reports load progress to the
//! poller over a channel; the poller owns the `Relay` (and with it the cursor).

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::error::RelayError;
use crate::ingest::types::SnapshotSource;
use crate::notify::{DeliveryJob, DeliveryQueue};
use crate::pipeline::Relay;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestSchedulerCfg {
    pub poll_interval: Duration,
    pub reload_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_poll_attempts: Option<u32>,
}

impl From<&ScheduleConfig> for IngestSchedulerCfg {
    fn from(c: &ScheduleConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(c.poll_interval_secs),
            reload_interval: Duration::from_secs(c.reload_interval_secs),
            heartbeat_interval: Duration::from_secs(c.heartbeat_interval_secs),
            max_poll_attempts: c.max_poll_attempts,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    AwaitingLoad,
    /// `attempt` counts snapshot calls since the last successful load.
    Polling { attempt: u32 },
}

impl PollState {
    pub fn on_reload_requested(self) -> Self {
        PollState::AwaitingLoad
    }

    pub fn on_load_finished(self, ok: bool) -> Self {
        if ok {
            PollState::Polling { attempt: 0 }
        } else {
            PollState::Idle
        }
    }

    /// Count a tick about to call the source.
    pub fn on_tick(self) -> Self {
        match self {
            PollState::Polling { attempt } => PollState::Polling {
                attempt: attempt.saturating_add(1),
            },
            other => other,
        }
    }

    /// Stay polling unless the attempt budget is spent.
    pub fn on_not_ready(self, max_attempts: Option<u32>) -> Self {
        match (self, max_attempts) {
            (PollState::Polling { attempt }, Some(max)) if attempt >= max => PollState::Idle,
            (state, _) => state,
        }
    }

    pub fn on_batch_handled(self) -> Self {
        PollState::Idle
    }

    pub fn is_polling(self) -> bool {
        matches!(self, PollState::Polling { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadEvent {
    Requested,
    Finished(bool),
}

pub struct SchedulerHandles {
    pub reloader: JoinHandle<()>,
    pub poller: JoinHandle<()>,
    pub heartbeat: JoinHandle<()>,
}

impl SchedulerHandles {
    /// Abort all timers and wait for the tasks to wind down.
    pub async fn shutdown(self) {
        for handle in [self.reloader, self.poller, self.heartbeat] {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// Start the reload, poll and heartbeat tasks. The first page load happens immediately.
pub fn spawn(
    cfg: IngestSchedulerCfg,
    source: Arc<dyn SnapshotSource>,
    relay: Relay,
    queue: DeliveryQueue,
    heartbeat: DeliveryJob,
) -> SchedulerHandles {
    let (load_tx, load_rx) = mpsc::unbounded_channel();
    SchedulerHandles {
        reloader: spawn_reloader(cfg.reload_interval, Arc::clone(&source), load_tx),
        poller: spawn_poller(cfg, source, relay, load_rx),
        heartbeat: spawn_heartbeat(cfg.heartbeat_interval, queue, heartbeat),
    }
}

fn spawn_reloader(
    period: Duration,
    source: Arc<dyn SnapshotSource>,
    load_tx: mpsc::UnboundedSender<LoadEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::info!(source = source.name(), "reloading page");
            if load_tx.send(LoadEvent::Requested).is_err() {
                break;
            }
            let ok = match source.load().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = ?e, source = source.name(), "page load failed");
                    false
                }
            };
            if load_tx.send(LoadEvent::Finished(ok)).is_err() {
                break;
            }
        }
        tracing::debug!("reloader exiting");
    })
}

fn spawn_heartbeat(period: Duration, queue: DeliveryQueue, job: DeliveryJob) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::info!("keep-alive heartbeat");
            counter!("relay_heartbeats_total").increment(1);
            if let Err(e) = queue.enqueue(job.clone()) {
                tracing::warn!(error = %e, "heartbeat not enqueued");
            }
        }
    })
}

fn poll_ticker(period: Duration) -> Interval {
    let mut t = interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn spawn_poller(
    cfg: IngestSchedulerCfg,
    source: Arc<dyn SnapshotSource>,
    mut relay: Relay,
    mut load_rx: mpsc::UnboundedReceiver<LoadEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = PollState::Idle;
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                ev = load_rx.recv() => {
                    let Some(ev) = ev else { break };
                    state = match ev {
                        LoadEvent::Requested => state.on_reload_requested(),
                        LoadEvent::Finished(ok) => {
                            if ok {
                                tracing::info!("page loaded; polling for snapshot");
                            }
                            state.on_load_finished(ok)
                        }
                    };
                    // A reload replaces any polling binding from the previous page.
                    ticker = state.is_polling().then(|| poll_ticker(cfg.poll_interval));
                }
                _ = next_tick(&mut ticker) => {
                    state = state.on_tick();
                    state = poll_once(&*source, &mut relay, state, cfg.max_poll_attempts).await;
                    if !state.is_polling() {
                        ticker = None;
                    }
                }
            }
        }
        tracing::debug!("poller exiting");
    })
}

async fn poll_once(
    source: &dyn SnapshotSource,
    relay: &mut Relay,
    state: PollState,
    max_attempts: Option<u32>,
) -> PollState {
    let raw = match source.snapshot().await {
        Ok(Some(raw)) => raw,
        Ok(None) => return not_ready(state, max_attempts),
        Err(e) => {
            tracing::warn!(error = ?e, source = source.name(), "snapshot call failed; retrying");
            return state;
        }
    };

    match relay.handle_snapshot(&raw).await {
        Ok(Some(report)) => {
            tracing::debug!(?report, "snapshot handled");
            state.on_batch_handled()
        }
        Ok(None) => not_ready(state, max_attempts),
        Err(e @ RelayError::MalformedSnapshot(_)) => {
            counter!("relay_snapshot_malformed_total").increment(1);
            tracing::warn!(error = %e, "dropping malformed snapshot");
            state
        }
        Err(e) => {
            tracing::warn!(error = %e, "snapshot handling failed");
            state
        }
    }
}

fn not_ready(state: PollState, max_attempts: Option<u32>) -> PollState {
    counter!("relay_snapshot_not_ready_total").increment(1);
    let next = state.on_not_ready(max_attempts);
    if next.is_polling() {
        tracing::debug!(?state, "snapshot not ready; retrying");
    } else {
        tracing::warn!(?state, "snapshot still not ready; waiting for next reload");
    }
    next
}
