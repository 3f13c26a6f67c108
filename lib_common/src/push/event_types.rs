use std::fmt;

/// # Server Event Type
///
/// The `event:` field of every message on the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventType {
    /// Whole torrent list, sent on subscribe.
    TorrentListFullUpdate,
    /// Torrent list diff.
    TorrentListDiffChange,
    /// A torrent list poll failed.
    TorrentListFetchError,
    /// Whole taxonomy, sent on subscribe.
    TaxonomyFullUpdate,
    /// Taxonomy diff.
    TaxonomyDiffChange,
    /// Whole transfer summary, sent on subscribe.
    TransferSummaryFullUpdate,
    /// Transfer summary diff.
    TransferSummaryDiffChange,
    /// A transfer summary poll failed.
    TransferSummaryFetchError,
    /// Graph data of the subscribed history resolution.
    TransferHistoryFullUpdate,
}

impl ServerEventType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerEventType::TorrentListFullUpdate => "TORRENT_LIST_FULL_UPDATE",
            ServerEventType::TorrentListDiffChange => "TORRENT_LIST_DIFF_CHANGE",
            ServerEventType::TorrentListFetchError => "TORRENT_LIST_FETCH_ERROR",
            ServerEventType::TaxonomyFullUpdate => "TAXONOMY_FULL_UPDATE",
            ServerEventType::TaxonomyDiffChange => "TAXONOMY_DIFF_CHANGE",
            ServerEventType::TransferSummaryFullUpdate => "TRANSFER_SUMMARY_FULL_UPDATE",
            ServerEventType::TransferSummaryDiffChange => "TRANSFER_SUMMARY_DIFF_CHANGE",
            ServerEventType::TransferSummaryFetchError => "TRANSFER_SUMMARY_FETCH_ERROR",
            ServerEventType::TransferHistoryFullUpdate => "TRANSFER_HISTORY_FULL_UPDATE",
        }
    }
}

impl fmt::Display for ServerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
