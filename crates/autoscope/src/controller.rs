//! The auto-migration controller: a long-lived task that periodically
//! turns accumulated statistics into schema changes.

use crate::engine::Engine;
use autoscope_core::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

const CYCLE_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn spawn(
    engine: Engine,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(CYCLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    // A failed step aborts this cycle only; the next tick
                    // starts fresh.
                    if let Err(err) = cycle(&engine).await {
                        error!("migration cycle aborted: {err}");
                    }
                }
            }
        }
    })
}

/// One controller cycle: refresh the schema, derive and apply any
/// migration the statistics justify, then persist and reload statistics.
async fn cycle(engine: &Engine) -> Result<()> {
    engine.load_schema().await?;

    let steps = engine.migration_from_stats().await?;
    if !steps.is_empty() {
        for step in &steps {
            info!("migrating: {step}");
        }
        engine.perform_migration(&steps).await?;
        engine.load_schema().await?;
    }

    engine.flush_stats().await?;
    engine.reload_global_stats().await?;
    Ok(())
}
