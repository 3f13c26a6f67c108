use crate::core::DiffEntry;
use crate::history::HistoryResolution;

/// # Service Event
///
/// Everything the live-state services announce on their dispatchers.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// The torrent list changed.
    TorrentListDiffChange {
        /// Id of the snapshot the diff leads to.
        id: u64,
        /// Per-torrent changes.
        diff: Vec<DiffEntry>,
    },
    /// A torrent list poll failed.
    TorrentListFetchError {
        /// Failures in a row, including this one.
        error_count: u32,
        /// Human-readable cause.
        message: String,
    },
    /// A torrent list poll succeeded (whether or not anything changed).
    TorrentListFetchSuccess,
    /// Status / tag / tracker counts changed.
    TaxonomyDiffChange {
        /// Id of the taxonomy snapshot the diff leads to.
        id: u64,
        /// Per-group changes.
        diff: Vec<DiffEntry>,
    },
    /// The transfer summary changed.
    TransferSummaryDiffChange {
        /// Id of the summary snapshot the diff leads to.
        id: u64,
        /// Per-field changes.
        diff: Vec<DiffEntry>,
    },
    /// A transfer summary poll failed.
    TransferSummaryFetchError {
        /// Failures in a row, including this one.
        error_count: u32,
        /// Human-readable cause.
        message: String,
    },
    /// A transfer summary poll succeeded.
    TransferSummaryFetchSuccess,
    /// The era behind this resolution gained a bucket.
    HistorySnapshotUpdated(HistoryResolution),
}
