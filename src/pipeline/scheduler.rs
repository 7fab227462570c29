//! Periodic trigger for the feed engine

use super::engine::FeedEngine;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Feed scheduler task - trigger the engine on a fixed interval
///
/// The first tick fires immediately. Each tick spawns its own trigger, so a
/// tick landing while a long catch-up is still running is dropped by the
/// engine's busy guard instead of queueing up behind it.
///
/// This function runs indefinitely until cancelled.
pub async fn feed_scheduler_task(engine: Arc<FeedEngine>, poll_interval: Duration) {
    log::info!("⏰ Starting feed scheduler (interval: {:?})", poll_interval);

    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;

        let engine = engine.clone();
        tokio::spawn(async move {
            let outcome = engine.trigger().await;
            log::debug!("Trigger finished: {:?}", outcome);
        });
    }
}
