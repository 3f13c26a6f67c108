//! # lib_common
//!
//! Live mirror of a torrent daemon: poll loops keep in-memory snapshots of the
//! torrent list and the transfer summary, structural diffs of consecutive
//! snapshots are fanned out to subscribers, and upload / download rates are
//! kept in a chain of progressively coarser history eras.
//!
//! Modules pulling in optional third-party stacks are feature gated:
//! `retrieve` (HTTP torrent client) and `push` (subscriber streams).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Engine configuration.
pub mod configs;
/// Diff, dispatcher, poll loop and subscriber registry.
pub mod core;
/// Error types.
pub mod error;
/// Rate history era chain.
pub mod history;
/// Live-state services.
pub mod ingestors;
/// Subscriber streams.
#[cfg(feature = "push")]
pub mod push;
/// HTTP torrent client.
#[cfg(feature = "retrieve")]
pub mod retrieve;
/// Shared helpers.
pub mod utils;

pub use error::{ConfigError, FetchError, PushError, UnknownResolution};
