// src/pipeline/schedule.rs

//! Periodic tick loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::ingest::Ingestor;

/// Run ticks every `interval` until `shutdown` resolves.
///
/// The first tick starts immediately. Each tick gets `interval` as its
/// deadline, and the next tick never starts before the current one ends.
/// `shutdown` is only observed between ticks.
pub async fn run_scheduler<F>(ingestor: &mut Ingestor, interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    log::info!("Scheduler ready: every={}s", interval.as_secs());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutdown requested, stopping scheduler");
                break;
            }
            _ = ticker.tick() => {
                let deadline = Instant::now() + interval;
                if let Err(e) = ingestor.run_tick(deadline).await {
                    log::error!("Tick aborted: {e}");
                }
            }
        }
    }
}
