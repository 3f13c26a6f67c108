use crate::torrent_logic::config::Settings;
use crate::torrent_logic::state::AppState;
use anyhow::Result;
use lib_common::ingestors::TorrentClient;
use lib_common::retrieve::HttpTorrentClient;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Running pollers of the torrent daemon.
pub struct Upstream {
    app_state: AppState,
    taxonomy: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

/// Starts both poll loops, the taxonomy follower and the history ticker. All
/// of them hang off `shutdown`, so cancelling it stops everything.
pub fn start(settings: &Settings, app_state: &AppState, shutdown: &CancellationToken) -> Result<Upstream> {
    let client: Arc<dyn TorrentClient> = Arc::new(HttpTorrentClient::new(
        &settings.client_url,
        settings.client_token.clone(),
        settings.client_timeout,
    )?);
    tracing::info!(url = %settings.client_url, "polling torrent client");

    let services = &app_state.services;
    let poll_config = settings.engine.poll_config();

    let taxonomy = services.taxonomy.start(&services.torrents, shutdown);
    services.torrents.start(Arc::clone(&client), poll_config, shutdown);
    services.transfer.start(client, poll_config, shutdown);
    let ticker = services.transfer.run_history_ticker(settings.engine.history_tick(), shutdown);

    Ok(Upstream {
        app_state: app_state.clone(),
        taxonomy,
        ticker,
    })
}

impl Upstream {
    /// Waits for `shutdown`, then for every upstream task to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        shutdown.cancelled().await;
        tracing::info!("upstream shutting down");

        self.app_state.services.torrents.stop();
        self.app_state.services.transfer.stop();
        let (taxonomy, ticker) = tokio::join!(self.taxonomy, self.ticker);
        report_exit("taxonomy follower", taxonomy);
        report_exit("history ticker", ticker);
    }
}

/// Logs a task that ended abnormally. Returns whether it exited cleanly.
fn report_exit(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) if error.is_panic() => {
            tracing::error!(task, %error, "upstream task panicked");
            false
        }
        Err(error) => {
            tracing::error!(task, %error, "upstream task was aborted");
            false
        }
    }
}
