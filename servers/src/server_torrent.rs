//! # Torrent Live-State Server
//!
//! Mirrors a torrent daemon into memory and pushes changes to browser
//! clients.
//!
//! - **Upstream**: two poll loops against the daemon's JSON bridge (torrent
//!   list, transfer summary), the taxonomy follower and the history ticker.
//! - **Downstream**: `GET /api/activity-stream` (event stream of full updates
//!   then diffs), `GET /api/history` and `GET /health`.
//! - **Monitor**: warns when a poll loop stops succeeding.
//!
//! Ctrl-C or SIGTERM cancels one shared token; every component stops on it.

use anyhow::Result;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod torrent_logic;
use torrent_logic::{config, downstream, logger, monitor, state, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;
    let _log_guard = logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    tracing::info!(port = settings.port, client_url = %settings.client_url, "starting server_torrent");

    let shutdown = CancellationToken::new();
    let app_state = state::AppState::new(&settings.engine)?;

    let pollers = upstream::start(&settings, &app_state, &shutdown)?;
    let upstream_handle = tokio::spawn(pollers.run(shutdown.clone()));

    let downstream_handle = {
        let (settings, app_state, shutdown) = (settings.clone(), app_state.clone(), shutdown.clone());
        tokio::spawn(async move {
            let result = downstream::run(settings, app_state, shutdown.clone()).await;
            if result.is_err() {
                // Without the HTTP side there's nothing to serve.
                shutdown.cancel();
            }
            result
        })
    };

    let stale_after = Duration::from_millis(settings.engine.poll_floor_delay_ms.saturating_mul(2));
    let monitor_handle = tokio::spawn(monitor::run(
        app_state.clone(),
        Duration::from_secs(10),
        stale_after,
        shutdown.clone(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            tracing::info!("SIGTERM received, initiating shutdown.");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();

    let (upstream_result, downstream_result, _) = tokio::join!(upstream_handle, downstream_handle, monitor_handle);
    upstream_result?;
    downstream_result??;

    tracing::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(error) => {
            tracing::warn!(%error, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
