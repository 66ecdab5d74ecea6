//! Periodic cleanup of expired secrets.

use crate::service::SecretService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Time between cleanup passes. Drift is acceptable; late sweeps are covered
/// by reactive expiry in the reveal path.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the sweeper task. It calls [`SecretService::expire_sweep`] once per
/// interval until the shutdown signal fires.
pub fn spawn(service: Arc<SecretService>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // An interval yields immediately; consume that so the first real
        // sweep lands one full period after activation.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("checking for expired secrets");
                    match service.expire_sweep().await {
                        Ok(0) => {}
                        Ok(reaped) => info!(reaped, "swept expired secrets"),
                        Err(e) => error!(error = %e, "expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("sweeper shutting down");
                    break;
                }
            }
        }
    })
}
