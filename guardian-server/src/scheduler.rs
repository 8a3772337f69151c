use std::time::Duration;

use jiff::Timestamp;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::coordinator::Coordinator;
use crate::store::Store;

/// Drive countdown expiry (and heartbeat expiry, when enabled) on a fixed
/// interval, independent of status reads. A second interval records the
/// phase into the status history.
#[instrument(
    name = "scheduler",
    skip_all,
    fields(
        tick_ms = tick_interval.as_millis() as u64,
        sample_ms = sample_interval.as_millis() as u64,
    )
)]
pub async fn run_scheduler<S: Store>(
    coordinator: Coordinator<S>,
    tick_interval: Duration,
    sample_interval: Duration,
    cancel: CancellationToken,
) {
    info!("Scheduler started");

    let mut ticker = tokio::time::interval(tick_interval);
    let mut sampler = tokio::time::interval(sample_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now = Timestamp::now();
                if let Some(command) = coordinator.tick(now).await {
                    debug!(command = command.as_str(), "countdown fired");
                }
                coordinator.expire_heartbeat(now).await;
            }
            _ = sampler.tick() => {
                let sample = coordinator.sample_status(Timestamp::now()).await;
                debug!(phase = sample.phase.as_str(), "status sampled");
            }
        }
    }
}
