//! Expired-session sweeper.
//!
//! Lookups already drop lapsed sessions they touch; the sweeper bounds the
//! memory held by sessions nobody comes back for.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is cancelled, after finishing
//! the current sweep.

use crate::session::SessionBridge;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the sweeper loop until `cancel_token` fires.
pub async fn start_session_sweeper(
    sessions: Arc<SessionBridge>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "bridge.tasks",
        interval_secs = interval.as_secs(),
        "Session sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sessions.purge_expired().await {
                    Ok(0) => {}
                    Ok(count) => {
                        info!(target: "bridge.tasks", purged = count, "Purged expired sessions");
                    }
                    Err(e) => {
                        warn!(target: "bridge.tasks", error = %e, "Session sweep failed");
                    }
                }
            }
            () = cancel_token.cancelled() => {
                info!(target: "bridge.tasks", "Session sweeper received shutdown signal, exiting");
                break;
            }
        }
    }
}
