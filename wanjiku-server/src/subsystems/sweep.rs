//! Session expiry sweep
//!
//! Sessions slide their `expires_at` on every turn, but callers who hang up
//! leave them marked active. The sweep marks those expired so listings and
//! reports reflect reality. Runs on `session.sweep_interval_seconds`.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::broadcast;
use wanjiku_core::SessionStore;

/// Mark every active session past its expiry as expired.
pub async fn run_expiry_sweep(sessions: &dyn SessionStore) -> Result<u64> {
    let start = std::time::Instant::now();
    let expired = sessions.expire_stale(Utc::now()).await?;

    if expired > 0 {
        tracing::info!(
            "Expiry sweep complete: {} sessions expired in {}ms",
            expired,
            start.elapsed().as_millis()
        );
    } else {
        tracing::debug!("Expiry sweep complete: nothing to expire");
    }

    Ok(expired)
}

pub async fn run_sweep_loop(
    sessions: Arc<dyn SessionStore>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    if interval_seconds == 0 {
        tracing::info!("Expiry sweep disabled");
        return;
    }

    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Expiry sweep started (interval: {}s)", interval_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_expiry_sweep(sessions.as_ref()).await {
                    tracing::warn!("Expiry sweep error (non-fatal): {}", e);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Expiry sweep shutting down");
                break;
            }
        }
    }
}
