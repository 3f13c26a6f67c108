//! # Torrent Client Collaborator
//!
//! The boundary to the torrent daemon. The live-state services only ever see
//! this trait; the HTTP bridge in `retrieve::torrent_bridge` and the scripted
//! client used by the integration tests both implement it.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Fields requested for every torrent on each list poll.
pub const TORRENT_LIST_FIELDS: &[&str] = &[
    "hash",
    "name",
    "bytesDone",
    "sizeBytes",
    "upRate",
    "downRate",
    "upTotal",
    "downTotal",
    "ratio",
    "isHashChecking",
    "isComplete",
    "isOpen",
    "isActive",
    "message",
    "tags",
    "trackerURIs",
    "dateAdded",
];

/// Fields requested on each transfer-summary poll.
pub const TRANSFER_SUMMARY_FIELDS: &[&str] =
    &["upRate", "downRate", "upTotal", "downTotal", "upThrottle", "downThrottle"];

/// # Torrent Details
///
/// The raw per-torrent fields as reported by the daemon. Missing fields take
/// their default so a bridge may omit what it doesn't know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TorrentDetails {
    /// Info-hash; the identity key of the torrent.
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Bytes downloaded and verified.
    pub bytes_done: u64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Current upload rate, bytes per second.
    pub up_rate: u64,
    /// Current download rate, bytes per second.
    pub down_rate: u64,
    /// Bytes uploaded since the torrent was added.
    pub up_total: u64,
    /// Bytes downloaded since the torrent was added.
    pub down_total: u64,
    /// Upload / download ratio.
    pub ratio: f64,
    /// Whether a hash check is running.
    pub is_hash_checking: bool,
    /// Whether every piece is present.
    pub is_complete: bool,
    /// Whether the torrent's files are open.
    pub is_open: bool,
    /// Whether the torrent is started (as opposed to paused).
    pub is_active: bool,
    /// Last tracker or storage error; empty when healthy.
    pub message: String,
    /// User-assigned tags.
    pub tags: Vec<String>,
    /// Announce URLs of every tracker.
    #[serde(rename = "trackerURIs")]
    pub tracker_uris: Vec<String>,
    /// Unix seconds when the torrent was added.
    pub date_added: u64,
}

/// # Transfer Summary
///
/// Client-wide throughput figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferSummary {
    /// Upload rate, bytes per second.
    pub up_rate: u64,
    /// Download rate, bytes per second.
    pub down_rate: u64,
    /// Bytes uploaded this session.
    pub up_total: u64,
    /// Bytes downloaded this session.
    pub down_total: u64,
    /// Upload throttle, bytes per second; `0` when unlimited.
    pub up_throttle: u64,
    /// Download throttle, bytes per second; `0` when unlimited.
    pub down_throttle: u64,
}

/// # Torrent Client
///
/// Async access to the daemon. Implementations must be cheap to call
/// repeatedly; the poll loops call them every cycle.
pub trait TorrentClient: Send + Sync + 'static {
    /// Fetches the given fields for every torrent.
    fn fetch_torrent_list<'a>(
        &'a self,
        fields: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<TorrentDetails>, FetchError>>;

    /// Fetches the given client-wide transfer fields.
    fn fetch_transfer_summary<'a>(&'a self, fields: &'a [&'a str]) -> BoxFuture<'a, Result<TransferSummary, FetchError>>;
}
