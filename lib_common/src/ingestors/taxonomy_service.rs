//! # Taxonomy Service
//!
//! Counts torrents per status, per tag and per tracker host. Recomputed after
//! every successful torrent-list poll and diffed like any other snapshot: the
//! three count groups are the snapshot keys, so a change carries only the
//! counts that moved.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::{get_diff, snapshot_of, DiffEntry, Dispatcher, ListenerId, Snapshot};
use crate::ingestors::events::ServiceEvent;
use crate::ingestors::torrent_details::Torrent;
use crate::ingestors::torrent_service::TorrentService;
use crate::utils::{lock_or_recover, now_millis};

/// Tag bucket for torrents without tags.
pub const UNTAGGED: &str = "untagged";
/// Status bucket counting every torrent.
pub const ALL: &str = "all";

/// # Taxonomy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    /// Torrents per status tag, plus `all`.
    pub status_counts: BTreeMap<String, u64>,
    /// Torrents per tag, plus `untagged`.
    pub tag_counts: BTreeMap<String, u64>,
    /// Torrents per tracker host.
    pub tracker_counts: BTreeMap<String, u64>,
}

impl Taxonomy {
    /// Counts `torrents`.
    pub fn from_torrents(torrents: &[Torrent]) -> Self {
        let mut taxonomy = Taxonomy::default();
        taxonomy.status_counts.insert(ALL.to_string(), torrents.len() as u64);
        taxonomy.tag_counts.insert(UNTAGGED.to_string(), 0);

        for torrent in torrents {
            for status in &torrent.status {
                *taxonomy.status_counts.entry(status.as_str().to_string()).or_default() += 1;
            }

            if torrent.details.tags.is_empty() {
                *taxonomy.tag_counts.entry(UNTAGGED.to_string()).or_default() += 1;
            }
            let tags: BTreeSet<&str> = torrent.details.tags.iter().map(String::as_str).collect();
            for tag in tags {
                *taxonomy.tag_counts.entry(tag.to_string()).or_default() += 1;
            }

            let hosts: BTreeSet<String> = torrent.details.tracker_uris.iter().filter_map(|u| tracker_host(u)).collect();
            for host in hosts {
                *taxonomy.tracker_counts.entry(host).or_default() += 1;
            }
        }

        taxonomy
    }
}

/// Host part of a tracker announce URL (`udp://tracker.example:1337/announce`
/// → `tracker.example`). Scheme-less entries are read as `udp://` URLs.
pub fn tracker_host(uri: &str) -> Option<String> {
    let url = match Url::parse(uri) {
        Ok(url) if url.has_host() => url,
        _ if !uri.contains("://") => Url::parse(&format!("udp://{uri}")).ok()?,
        _ => return None,
    };
    url.host_str().filter(|host| !host.is_empty()).map(str::to_string)
}

/// Taxonomy as sent to a new subscriber.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonomySnapshot {
    /// Millis timestamp of the recomputation.
    pub id: u64,
    /// The three count groups.
    pub taxonomy: Snapshot,
}

#[derive(Default)]
struct TaxonomyState {
    id: u64,
    snapshot: Snapshot,
}

/// # Taxonomy Service
#[derive(Default)]
pub struct TaxonomyService {
    state: Mutex<TaxonomyState>,
    dispatcher: Dispatcher<ServiceEvent>,
}

impl TaxonomyService {
    /// Creates a service with an empty taxonomy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The service's event dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<ServiceEvent> {
        &self.dispatcher
    }

    /// Recomputes from `torrents`, stamps the result `id` and broadcasts the
    /// diff. Returns the diff.
    pub fn apply_torrents(&self, id: u64, torrents: &[Torrent]) -> Vec<DiffEntry> {
        let next = match snapshot_of(&Taxonomy::from_torrents(torrents)) {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(%error, "taxonomy could not be encoded");
                return Vec::new();
            }
        };

        let mut state = lock_or_recover(&self.state);
        let diff = get_diff(&state.snapshot, &next);
        state.id = id;
        state.snapshot = next;

        if !diff.is_empty() {
            self.dispatcher.broadcast(ServiceEvent::TaxonomyDiffChange {
                id,
                diff: diff.clone(),
            });
        }
        diff
    }

    /// # Start
    ///
    /// Follows `torrents`: computes the taxonomy now, then again after every
    /// `TorrentListFetchSuccess`.
    pub fn start(self: &Arc<Self>, torrents: &Arc<TorrentService>, token: &CancellationToken) -> JoinHandle<()> {
        let (listener, mut events) = torrents.dispatcher().add_listener("taxonomy");
        self.apply_torrents(now_millis(), &torrents.torrents());

        let service = Arc::clone(self);
        let source = Arc::clone(torrents);
        let token = token.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event.as_deref() {
                        Some(ServiceEvent::TorrentListFetchSuccess) => {
                            service.apply_torrents(now_millis(), &source.torrents());
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            source.dispatcher().remove_listener(listener);
            tracing::debug!("taxonomy follower stopped");
        })
    }

    /// The current taxonomy.
    pub fn taxonomy(&self) -> TaxonomySnapshot {
        let state = lock_or_recover(&self.state);
        TaxonomySnapshot {
            id: state.id,
            taxonomy: state.snapshot.clone(),
        }
    }

    /// Reads the taxonomy and attaches `sender` in one step.
    pub fn subscribe_with(
        &self,
        label: &str,
        sender: mpsc::UnboundedSender<Arc<ServiceEvent>>,
    ) -> (TaxonomySnapshot, ListenerId) {
        let state = lock_or_recover(&self.state);
        let snapshot = TaxonomySnapshot {
            id: state.id,
            taxonomy: state.snapshot.clone(),
        };
        let id = self.dispatcher.attach(label, sender);
        (snapshot, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiffAction;
    use crate::ingestors::torrent_client::TorrentDetails;
    use serde_json::json;
    use std::time::Duration;

    fn torrent(hash: &str, tags: &[&str], trackers: &[&str], down_rate: u64) -> Torrent {
        Torrent::from(TorrentDetails {
            hash: hash.to_string(),
            size_bytes: 10,
            down_rate,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tracker_uris: trackers.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_tracker_host_parsing() {
        assert_eq!(tracker_host("udp://tracker.example:1337/announce").as_deref(), Some("tracker.example"));
        assert_eq!(tracker_host("https://user:pw@t.example/ann?x=1").as_deref(), Some("t.example"));
        assert_eq!(tracker_host("http://[::1]:8080/announce").as_deref(), Some("[::1]"));
        assert_eq!(tracker_host("plain.example").as_deref(), Some("plain.example"));
        assert_eq!(tracker_host("plain.example:6969/announce").as_deref(), Some("plain.example"));
        assert_eq!(tracker_host("udp://"), None);
        assert_eq!(tracker_host("a b:c"), None);
    }

    #[test]
    fn test_counts() {
        let torrents = vec![
            torrent("A", &["linux", "iso"], &["udp://a.example:1/x", "http://a.example/y"], 0),
            torrent("B", &[], &["udp://b.example:2"], 5),
        ];
        let taxonomy = Taxonomy::from_torrents(&torrents);

        assert_eq!(taxonomy.status_counts["all"], 2);
        assert_eq!(taxonomy.status_counts["stopped"], 2);
        assert_eq!(taxonomy.status_counts["active"], 1);
        assert_eq!(taxonomy.status_counts["inactive"], 1);
        assert_eq!(taxonomy.tag_counts["untagged"], 1);
        assert_eq!(taxonomy.tag_counts["linux"], 1);
        assert_eq!(taxonomy.tracker_counts["a.example"], 1);
        assert_eq!(taxonomy.tracker_counts["b.example"], 1);
    }

    #[test]
    fn test_diff_carries_moved_counts_only() {
        let service = TaxonomyService::new();
        service.apply_torrents(1, &[torrent("A", &["x"], &[], 0)]);
        let diff = service.apply_torrents(2, &[torrent("A", &["y"], &[], 0)]);

        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].key, "tagCounts");
        assert_eq!(diff[0].action, DiffAction::Changed(json!({"y": 1, "x": null})));
    }

    #[tokio::test]
    async fn test_follows_torrent_list() {
        let torrents = Arc::new(TorrentService::new());
        let taxonomy = Arc::new(TaxonomyService::new());
        let token = CancellationToken::new();
        let handle = taxonomy.start(&torrents, &token);
        assert_eq!(taxonomy.taxonomy().taxonomy["statusCounts"]["all"], 0);

        let (_, mut rx) = taxonomy.dispatcher().add_listener("test");
        torrents.apply_list(
            5,
            vec![TorrentDetails {
                hash: "A".to_string(),
                ..Default::default()
            }],
        );

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(*event, ServiceEvent::TaxonomyDiffChange { .. }));
        assert_eq!(taxonomy.taxonomy().taxonomy["statusCounts"]["all"], 1);

        token.cancel();
        handle.await.unwrap();
        assert_eq!(torrents.dispatcher().listener_count(), 0);
    }
}
