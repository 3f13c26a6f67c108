//! # Transfer Summary Service
//!
//! Mirrors the client-wide transfer summary and owns the rate history.
//!
//! Each successful poll:
//! 1. diffs the new summary against the held one and broadcasts
//!    `TransferSummaryDiffChange` if a field moved;
//! 2. records the upload / download rate pair into the finest history era and
//!    broadcasts `HistorySnapshotUpdated` for every era that gained a bucket;
//! 3. broadcasts `TransferSummaryFetchSuccess`.
//!
//! A separate housekeeping ticker runs rollups and eviction while polls are
//! failing. Lock order is summary state, then history.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configs::EngineConfig;
use crate::core::{get_diff, snapshot_of, DiffEntry, Dispatcher, ListenerId, PollConfig, PollHandler, PollLoop, PollStatus, Snapshot};
use crate::error::{ConfigError, FetchError};
use crate::history::{HistoryEngine, HistoryResolution, HistorySnapshot};
use crate::ingestors::events::ServiceEvent;
use crate::ingestors::torrent_client::{TorrentClient, TransferSummary, TRANSFER_SUMMARY_FIELDS};
use crate::utils::{lock_or_recover, now_millis};

/// # Transfer Summary Snapshot
///
/// The summary as sent to a new subscriber.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferSummarySnapshot {
    /// Millis timestamp of the poll that produced it.
    pub id: u64,
    /// Summary fields.
    pub transfer_summary: Snapshot,
}

#[derive(Default)]
struct SummaryState {
    id: u64,
    summary: Snapshot,
}

/// # Transfer Service
pub struct TransferService {
    state: Mutex<SummaryState>,
    history: Mutex<HistoryEngine>,
    max_history_states: usize,
    dispatcher: Dispatcher<ServiceEvent>,
    poll: Mutex<Option<PollLoop>>,
}

impl TransferService {
    /// Creates the service with an empty summary and the configured era chain.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            state: Mutex::new(SummaryState::default()),
            history: Mutex::new(HistoryEngine::new(&config.history_eras, config.rollup_policy)?),
            max_history_states: config.max_history_states,
            dispatcher: Dispatcher::new(),
            poll: Mutex::new(None),
        })
    }

    /// Starts polling `client`. Replaces (and stops) any previous loop.
    pub fn start(self: &Arc<Self>, client: Arc<dyn TorrentClient>, config: PollConfig, token: &CancellationToken) {
        let fetch = move || {
            let client = Arc::clone(&client);
            async move { client.fetch_transfer_summary(TRANSFER_SUMMARY_FIELDS).await }
        };
        let poll = PollLoop::spawn("transfer-summary", config, fetch, Arc::clone(self), token);
        *lock_or_recover(&self.poll) = Some(poll);
    }

    /// Stops the poll loop, if any.
    pub fn stop(&self) {
        lock_or_recover(&self.poll).take();
    }

    /// Fetches right away instead of waiting for the next cycle.
    pub fn poll_now(&self) {
        if let Some(poll) = lock_or_recover(&self.poll).as_ref() {
            poll.poll_now();
        }
    }

    /// Status feed of the running poll loop.
    pub fn poll_status(&self) -> Option<watch::Receiver<PollStatus>> {
        lock_or_recover(&self.poll).as_ref().map(PollLoop::subscribe_status)
    }

    /// The service's event dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<ServiceEvent> {
        &self.dispatcher
    }

    /// # Apply Summary
    ///
    /// Replaces the held summary, records the rates at `now` and broadcasts
    /// the resulting events. Returns the summary diff.
    pub fn apply_summary(&self, summary: TransferSummary, now: u64) -> Vec<DiffEntry> {
        let next = match snapshot_of(&summary) {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(%error, "transfer summary could not be encoded");
                return Vec::new();
            }
        };

        let mut state = lock_or_recover(&self.state);
        let diff = get_diff(&state.summary, &next);
        state.id = now;
        state.summary = next;

        if !diff.is_empty() {
            self.dispatcher.broadcast(ServiceEvent::TransferSummaryDiffChange {
                id: now,
                diff: diff.clone(),
            });
        }

        let grown = lock_or_recover(&self.history).record(now, summary.up_rate as f64, summary.down_rate as f64);
        self.announce_history(&grown);
        self.dispatcher.broadcast(ServiceEvent::TransferSummaryFetchSuccess);
        drop(state);

        diff
    }

    /// Runs history housekeeping at `now`.
    pub fn tick_history(&self, now: u64) {
        let _state = lock_or_recover(&self.state);
        let grown = lock_or_recover(&self.history).tick(now);
        self.announce_history(&grown);
    }

    /// Spawns the housekeeping ticker.
    pub fn run_history_ticker(self: &Arc<Self>, period: Duration, token: &CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let token = token.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => service.tick_history(now_millis()),
                }
            }
            tracing::debug!("history ticker stopped");
        })
    }

    fn announce_history(&self, grown: &BTreeSet<String>) {
        for name in grown {
            if let Ok(resolution) = name.parse::<HistoryResolution>() {
                self.dispatcher.broadcast(ServiceEvent::HistorySnapshotUpdated(resolution));
            }
        }
    }

    /// The current summary.
    pub fn transfer_summary(&self) -> TransferSummarySnapshot {
        let state = lock_or_recover(&self.state);
        TransferSummarySnapshot {
            id: state.id,
            transfer_summary: state.summary.clone(),
        }
    }

    /// # Get History
    ///
    /// Graph data for the era named `snapshot`, at most `maxHistoryStates`
    /// buckets. `None` when no era has that name.
    pub fn get_history(&self, snapshot: &str, now: u64) -> Option<HistorySnapshot> {
        lock_or_recover(&self.history).get_history(snapshot, now, self.max_history_states)
    }

    /// Same as [`get_history`](Self::get_history), keyed by resolution.
    pub fn get_history_for(&self, resolution: HistoryResolution, now: u64) -> Option<HistorySnapshot> {
        self.get_history(resolution.as_str(), now)
    }

    /// Buckets held across the whole chain.
    pub fn history_size(&self) -> usize {
        lock_or_recover(&self.history).total_samples()
    }

    /// Reads the summary and the history for `resolution`, then attaches
    /// `sender`, all in one step.
    pub fn subscribe_with(
        &self,
        label: &str,
        sender: mpsc::UnboundedSender<Arc<ServiceEvent>>,
        resolution: HistoryResolution,
        now: u64,
    ) -> (TransferSummarySnapshot, HistorySnapshot, ListenerId) {
        let state = lock_or_recover(&self.state);
        let summary = TransferSummarySnapshot {
            id: state.id,
            transfer_summary: state.summary.clone(),
        };
        let history = lock_or_recover(&self.history)
            .get_resolution(resolution, now, self.max_history_states)
            .unwrap_or_default();
        let id = self.dispatcher.attach(label, sender);
        (summary, history, id)
    }
}

impl PollHandler<TransferSummary> for TransferService {
    fn on_success(&self, summary: TransferSummary) {
        self.apply_summary(summary, now_millis());
    }

    fn on_failure(&self, error: &FetchError, consecutive_errors: u32) {
        self.dispatcher.broadcast(ServiceEvent::TransferSummaryFetchError {
            error_count: consecutive_errors,
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiffAction;
    use serde_json::json;

    fn rates(up: u64, down: u64) -> TransferSummary {
        TransferSummary {
            up_rate: up,
            down_rate: down,
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Arc<ServiceEvent>>) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    #[test]
    fn test_summary_diff_only_reports_changed_fields() {
        let service = TransferService::new(&EngineConfig::default()).unwrap();
        service.apply_summary(rates(10, 20), 1_000);
        let diff = service.apply_summary(rates(10, 25), 3_000);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].key, "downRate");
        assert_eq!(diff[0].action, DiffAction::Changed(json!(25)));
    }

    #[test]
    fn test_unchanged_summary_emits_no_diff_but_success() {
        let service = TransferService::new(&EngineConfig::default()).unwrap();
        service.apply_summary(rates(1, 1), 1_000);
        let (_, mut rx) = service.dispatcher().add_listener("test");

        service.apply_summary(rates(1, 1), 2_000);

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, ServiceEvent::TransferSummaryDiffChange { .. })));
        assert_eq!(events.last(), Some(&ServiceEvent::TransferSummaryFetchSuccess));
    }

    #[test]
    fn test_new_bucket_announces_history_update() {
        let service = TransferService::new(&EngineConfig::default()).unwrap();
        let (_, mut rx) = service.dispatcher().add_listener("test");

        service.apply_summary(rates(1, 2), 10_000);
        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::HistorySnapshotUpdated(HistoryResolution::FiveMin)));

        // Within the same 5 s bucket: merged, no announcement.
        service.apply_summary(rates(3, 4), 12_000);
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, ServiceEvent::HistorySnapshotUpdated(_))));
    }

    #[test]
    fn test_history_query() {
        let service = TransferService::new(&EngineConfig::default()).unwrap();
        for i in 0..100u64 {
            service.apply_summary(rates(i, i * 2), 1_000_000 + i * 5_000);
        }

        let now = 1_000_000 + 99 * 5_000;
        let five_min = service.get_history("fiveMin", now).unwrap();
        assert_eq!(five_min.upload.len(), 30);
        assert_eq!(five_min.upload.last(), Some(&99.0));
        assert_eq!(five_min.download.last(), Some(&198.0));

        assert!(!service.get_history_for(HistoryResolution::ThirtyMin, now).unwrap().is_empty());
        assert!(service.get_history("decade", now).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_with_token() {
        let service = Arc::new(TransferService::new(&EngineConfig::default()).unwrap());
        let token = CancellationToken::new();
        let handle = service.run_history_ticker(Duration::from_millis(100), &token);
        tokio::time::sleep(Duration::from_millis(350)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
