//! # Torrent List Service
//!
//! Keeps the authoritative torrent list. Every successful poll is enriched
//! with derived fields, keyed by info-hash, diffed against the previous list
//! and announced as a `TorrentListDiffChange` when anything moved.
//!
//! The snapshot is replaced and the diff broadcast under one lock, and
//! [`TorrentService::subscribe_with`] takes the same lock to read the list and
//! attach. A subscriber therefore gets either the old list plus the diff, or
//! the new list without it, never a diff against a list it didn't see.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::core::{get_collection_diff, DiffEntry, Dispatcher, ListenerId, PollConfig, PollHandler, PollLoop, PollStatus, Snapshot};
use crate::error::FetchError;
use crate::ingestors::events::ServiceEvent;
use crate::ingestors::torrent_client::{TorrentClient, TorrentDetails, TORRENT_LIST_FIELDS};
use crate::ingestors::torrent_details::Torrent;
use crate::utils::{lock_or_recover, now_millis};

/// # Torrent List
///
/// A full list as sent to a new subscriber.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TorrentList {
    /// Id of the poll that produced the list.
    pub id: u64,
    /// Enriched torrents keyed by hash, in the order the daemon listed them.
    pub torrents: Snapshot,
}

#[derive(Default)]
struct TorrentListState {
    id: u64,
    torrents: Vec<Torrent>,
    snapshot: Snapshot,
}

/// # Torrent Service
pub struct TorrentService {
    state: Mutex<TorrentListState>,
    dispatcher: Dispatcher<ServiceEvent>,
    poll: Mutex<Option<PollLoop>>,
}

impl Default for TorrentService {
    fn default() -> Self {
        Self::new()
    }
}

impl TorrentService {
    /// Creates a service with an empty list and no poll loop.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TorrentListState::default()),
            dispatcher: Dispatcher::new(),
            poll: Mutex::new(None),
        }
    }

    /// Starts polling `client`. Replaces (and stops) any previous loop.
    pub fn start(self: &Arc<Self>, client: Arc<dyn TorrentClient>, config: PollConfig, token: &CancellationToken) {
        let fetch = move || {
            let client = Arc::clone(&client);
            async move { client.fetch_torrent_list(TORRENT_LIST_FIELDS).await }
        };
        let poll = PollLoop::spawn("torrent-list", config, fetch, Arc::clone(self), token);
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

    /// # Apply List
    ///
    /// Replaces the held list with `list` (stamped `id`) and broadcasts the
    /// diff, then `TorrentListFetchSuccess`. Returns the diff.
    pub fn apply_list(&self, id: u64, list: Vec<TorrentDetails>) -> Vec<DiffEntry> {
        let mut torrents = Vec::with_capacity(list.len());
        let mut snapshot = Snapshot::new();

        for details in list {
            if snapshot.contains_key(&details.hash) {
                tracing::warn!(hash = %details.hash, "duplicate torrent in list, keeping the first");
                continue;
            }
            let torrent = Torrent::from(details);
            match serde_json::to_value(&torrent) {
                Ok(value) => {
                    snapshot.insert(torrent.details.hash.clone(), value);
                    torrents.push(torrent);
                }
                Err(error) => {
                    tracing::warn!(hash = %torrent.details.hash, %error, "torrent could not be encoded, skipping");
                }
            }
        }

        let mut state = lock_or_recover(&self.state);
        let diff = get_collection_diff(&state.snapshot, &snapshot);
        state.id = id;
        state.torrents = torrents;
        state.snapshot = snapshot;

        if !diff.is_empty() {
            tracing::debug!(changes = diff.len(), "torrent list changed");
            self.dispatcher.broadcast(ServiceEvent::TorrentListDiffChange {
                id,
                diff: diff.clone(),
            });
        }
        self.dispatcher.broadcast(ServiceEvent::TorrentListFetchSuccess);

        diff
    }

    /// The current list.
    pub fn torrent_list(&self) -> TorrentList {
        let state = lock_or_recover(&self.state);
        TorrentList {
            id: state.id,
            torrents: state.snapshot.clone(),
        }
    }

    /// The current torrents as typed values.
    pub fn torrents(&self) -> Vec<Torrent> {
        lock_or_recover(&self.state).torrents.clone()
    }

    /// Reads the current list and attaches `sender` in one step.
    pub fn subscribe_with(
        &self,
        label: &str,
        sender: mpsc::UnboundedSender<Arc<ServiceEvent>>,
    ) -> (TorrentList, ListenerId) {
        let state = lock_or_recover(&self.state);
        let list = TorrentList {
            id: state.id,
            torrents: state.snapshot.clone(),
        };
        let id = self.dispatcher.attach(label, sender);
        (list, id)
    }
}

impl PollHandler<Vec<TorrentDetails>> for TorrentService {
    fn on_success(&self, list: Vec<TorrentDetails>) {
        self.apply_list(now_millis(), list);
    }

    fn on_failure(&self, error: &FetchError, consecutive_errors: u32) {
        self.dispatcher.broadcast(ServiceEvent::TorrentListFetchError {
            error_count: consecutive_errors,
            message: error.to_string(),
        });
    }
}
