//! # Derived Torrent Fields
//!
//! Status, completion percentage and ETA are computed from the raw fields on
//! every poll and stored next to them, so they take part in the diff like any
//! other attribute.

use serde::ser::Serializer;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::ingestors::torrent_client::TorrentDetails;
use crate::utils::{seconds_to_duration, DurationParts};

/// # Torrent Status
///
/// One tag of a torrent's status set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TorrentStatus {
    /// A hash check is running.
    Checking,
    /// Downloading.
    Downloading,
    /// Complete and uploading to peers.
    Seeding,
    /// Open but not started.
    Paused,
    /// Closed.
    Stopped,
    /// Every piece is present.
    Complete,
    /// The daemon reports an error message.
    Error,
    /// Upload rate is non-zero.
    ActivelyUploading,
    /// Download rate is non-zero.
    ActivelyDownloading,
    /// Either rate is non-zero.
    Active,
    /// Both rates are zero.
    Inactive,
}

impl TorrentStatus {
    /// Name as it appears on the wire and in taxonomy counts.
    pub fn as_str(self) -> &'static str {
        match self {
            TorrentStatus::Checking => "checking",
            TorrentStatus::Downloading => "downloading",
            TorrentStatus::Seeding => "seeding",
            TorrentStatus::Paused => "paused",
            TorrentStatus::Stopped => "stopped",
            TorrentStatus::Complete => "complete",
            TorrentStatus::Error => "error",
            TorrentStatus::ActivelyUploading => "activelyUploading",
            TorrentStatus::ActivelyDownloading => "activelyDownloading",
            TorrentStatus::Active => "active",
            TorrentStatus::Inactive => "inactive",
        }
    }
}

/// Classifies a torrent. The base state is picked by priority (hash checking
/// first); error and activity tags are added independently.
pub fn derive_status(details: &TorrentDetails) -> BTreeSet<TorrentStatus> {
    use TorrentStatus::*;

    let mut status = BTreeSet::new();
    let base: &[TorrentStatus] = match (details.is_hash_checking, details.is_complete, details.is_open) {
        (true, _, _) => &[Checking],
        (false, true, true) if details.is_active => &[Complete, Seeding],
        (false, true, true) => &[Paused],
        (false, true, false) => &[Stopped, Complete],
        (false, false, true) if details.is_active => &[Downloading],
        (false, false, true) => &[Paused],
        (false, false, false) => &[Stopped],
    };
    status.extend(base.iter().copied());

    if !details.message.is_empty() {
        status.insert(Error);
    }
    if details.up_rate != 0 {
        status.insert(ActivelyUploading);
    }
    if details.down_rate != 0 {
        status.insert(ActivelyDownloading);
    }
    if details.up_rate != 0 || details.down_rate != 0 {
        status.insert(Active);
    } else {
        status.insert(Inactive);
    }

    status
}

/// Completion in percent. Two decimals below 10 %, one decimal between 10 %
/// and 100 %, exact at the boundaries. A zero-sized torrent counts as 0 %.
pub fn percent_complete(bytes_done: u64, size_bytes: u64) -> f64 {
    if size_bytes == 0 {
        return 0.0;
    }
    let percent = bytes_done as f64 * 100.0 / size_bytes as f64;

    if percent > 0.0 && percent < 10.0 {
        (percent * 100.0).round() / 100.0
    } else if percent > 10.0 && percent < 100.0 {
        (percent * 10.0).round() / 10.0
    } else {
        percent
    }
}

/// # ETA
///
/// Time left at the current download rate. Serializes as the string
/// `"Infinity"` when nothing is downloading, otherwise as duration parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    /// The download rate is zero.
    Infinite,
    /// Remaining time.
    Finite(DurationParts),
}

impl Eta {
    /// Computes the ETA from the raw fields.
    pub fn from_details(details: &TorrentDetails) -> Self {
        if details.down_rate == 0 {
            return Eta::Infinite;
        }
        let remaining = details.size_bytes.saturating_sub(details.bytes_done) as f64;
        Eta::Finite(seconds_to_duration(remaining / details.down_rate as f64))
    }

    /// Whether this is the unbounded sentinel.
    pub fn is_infinite(&self) -> bool {
        matches!(self, Eta::Infinite)
    }
}

impl Serialize for Eta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Eta::Infinite => serializer.serialize_str("Infinity"),
            Eta::Finite(parts) => parts.serialize(serializer),
        }
    }
}

/// # Torrent
///
/// Raw details plus the derived fields; the unit the torrent list diff works
/// on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Torrent {
    /// Fields as fetched.
    #[serde(flatten)]
    pub details: TorrentDetails,
    /// Status tags.
    pub status: BTreeSet<TorrentStatus>,
    /// Rounded completion percentage.
    pub percent_complete: f64,
    /// Time left.
    pub eta: Eta,
}

impl From<TorrentDetails> for Torrent {
    fn from(details: TorrentDetails) -> Self {
        Self {
            status: derive_status(&details),
            percent_complete: percent_complete(details.bytes_done, details.size_bytes),
            eta: Eta::from_details(&details),
            details,
        }
    }
}
