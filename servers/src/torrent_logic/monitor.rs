use crate::torrent_logic::state::AppState;
use lib_common::core::PollStatus;
use lib_common::utils::now_millis;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Whether a loop has gone `stale_after` without a successful poll. A loop
/// that never succeeded is measured from `started_ms`.
pub fn is_stale(status: &PollStatus, now_ms: u64, started_ms: u64, stale_after: Duration) -> bool {
    let since = status.last_success_ms.unwrap_or(started_ms);
    now_ms.saturating_sub(since) > stale_after.as_millis() as u64
}

/// Periodically checks both poll loops and warns about ones that haven't
/// succeeded for `stale_after`. Warns once per streak.
pub async fn run(app_state: AppState, check_every: Duration, stale_after: Duration, shutdown: CancellationToken) {
    let started_ms = now_millis();
    let mut check_interval = interval(check_every);
    let mut loops: Vec<(&'static str, Option<watch::Receiver<PollStatus>>, bool)> = vec![
        ("torrent-list", app_state.services.torrents.poll_status(), false),
        ("transfer-summary", app_state.services.transfer.poll_status(), false),
    ];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Monitor service received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                let now = now_millis();
                for (name, status, warned) in loops.iter_mut() {
                    let Some(status) = status else { continue };
                    let status = status.borrow().clone();
                    if is_stale(&status, now, started_ms, stale_after) {
                        if !*warned {
                            tracing::warn!(
                                service = *name,
                                errors = status.consecutive_errors,
                                last_error = status.last_error.as_deref().unwrap_or("-"),
                                "no successful poll for {} seconds",
                                stale_after.as_secs()
                            );
                            *warned = true;
                        }
                    } else {
                        *warned = false;
                    }
                }
            }
        }
    }
}
