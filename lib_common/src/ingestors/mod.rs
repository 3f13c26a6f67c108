//! # Live-State Ingestors
//!
//! The services that mirror the torrent daemon into memory. Each one holds
//! the last snapshot of its source, is driven by a `PollLoop`, diffs every
//! new snapshot against the held one and announces the result on its own
//! `Dispatcher`.
//!
//! ## Contained Modules:
//! - **`torrent_client`**: The collaborator trait the services poll, and the
//!   raw record types it returns.
//! - **`torrent_details`**: Derived per-torrent fields (status set, percent
//!   complete, ETA).
//! - **`torrent_service`**: The keyed torrent list.
//! - **`transfer_service`**: The flat transfer summary and its rate history.
//! - **`taxonomy_service`**: Status / tag / tracker counts that follow the
//!   torrent list.
//! - **`events`**: The event type all three services broadcast.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Events broadcast by the services.
pub mod events;
/// Status / tag / tracker counts.
pub mod taxonomy_service;
/// The collaborator trait and raw records.
pub mod torrent_client;
/// Derived per-torrent fields.
pub mod torrent_details;
/// The torrent list service.
pub mod torrent_service;
/// The transfer summary and history service.
pub mod transfer_service;

// --- Public API Re-exports ---
pub use events::ServiceEvent;
pub use taxonomy_service::{Taxonomy, TaxonomyService, TaxonomySnapshot};
pub use torrent_client::{TorrentClient, TorrentDetails, TransferSummary, TORRENT_LIST_FIELDS, TRANSFER_SUMMARY_FIELDS};
pub use torrent_details::{derive_status, percent_complete, Eta, Torrent, TorrentStatus};
pub use torrent_service::{TorrentList, TorrentService};
pub use transfer_service::{TransferService, TransferSummarySnapshot};
