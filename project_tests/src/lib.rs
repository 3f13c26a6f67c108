//! # Project Test Support
//!
//! Shared fixtures for the end-to-end tests: a [`TorrentClient`] that replays
//! scripted responses, record builders and a parser for the activity-stream
//! wire format.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use futures_util::future::{self, BoxFuture, FutureExt};
use lib_common::error::FetchError;
use lib_common::ingestors::{TorrentClient, TorrentDetails, TransferSummary};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Queued responses, then a sticky fallback once the queue runs dry.
struct Script<T> {
    queue: VecDeque<Result<T, FetchError>>,
    fallback: Result<T, FetchError>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: Ok(fallback),
        }
    }

    fn next(&mut self) -> Result<T, FetchError> {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// # Scripted Torrent Client
///
/// Answers every fetch from a script. Responses queued with `push_*` are used
/// once, in order; after that the value given to `set_*` is repeated.
pub struct ScriptedTorrentClient {
    lists: Mutex<Script<Vec<TorrentDetails>>>,
    summaries: Mutex<Script<TransferSummary>>,
    list_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl Default for ScriptedTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTorrentClient {
    /// Empty list and zeroed summary until told otherwise.
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(Script::new(Vec::new())),
            summaries: Mutex::new(Script::new(TransferSummary::default())),
            list_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
        }
    }

    /// Queues one torrent-list response.
    pub fn push_list(&self, response: Result<Vec<TorrentDetails>, FetchError>) {
        self.lists.lock().unwrap().queue.push_back(response);
    }

    /// Sets the torrent-list response repeated after the queue.
    pub fn set_list(&self, response: Result<Vec<TorrentDetails>, FetchError>) {
        self.lists.lock().unwrap().fallback = response;
    }

    /// Queues one transfer-summary response.
    pub fn push_summary(&self, response: Result<TransferSummary, FetchError>) {
        self.summaries.lock().unwrap().queue.push_back(response);
    }

    /// Sets the transfer-summary response repeated after the queue.
    pub fn set_summary(&self, response: Result<TransferSummary, FetchError>) {
        self.summaries.lock().unwrap().fallback = response;
    }

    /// Torrent-list fetches so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Transfer-summary fetches so far.
    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }
}

impl TorrentClient for ScriptedTorrentClient {
    fn fetch_torrent_list<'a>(
        &'a self,
        _fields: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<TorrentDetails>, FetchError>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        future::ready(self.lists.lock().unwrap().next()).boxed()
    }

    fn fetch_transfer_summary<'a>(&'a self, _fields: &'a [&'a str]) -> BoxFuture<'a, Result<TransferSummary, FetchError>> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        future::ready(self.summaries.lock().unwrap().next()).boxed()
    }
}

/// A torrent of `size_bytes` with `bytes_done` downloaded.
pub fn torrent(hash: &str, bytes_done: u64, size_bytes: u64) -> TorrentDetails {
    TorrentDetails {
        hash: hash.to_string(),
        name: format!("{hash}.iso"),
        bytes_done,
        size_bytes,
        ..Default::default()
    }
}

/// A summary with only the rates set.
pub fn rates(up_rate: u64, down_rate: u64) -> TransferSummary {
    TransferSummary {
        up_rate,
        down_rate,
        ..Default::default()
    }
}

/// # Wire Event
///
/// One event read back from an activity stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    /// The `id:` field.
    pub id: u64,
    /// The `event:` field.
    pub event: String,
    /// The `data:` lines joined and parsed as JSON.
    pub data: Value,
}

/// Splits raw stream text into events. Comment lines (starting with `:`)
/// are skipped.
pub fn parse_wire(text: &str) -> Vec<WireEvent> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut id = None;
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if line.starts_with(':') {
                    continue;
                } else if let Some(v) = line.strip_prefix("id:") {
                    id = v.parse().ok();
                } else if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.to_string());
                } else if let Some(v) = line.strip_prefix("data: ") {
                    data.push_str(v);
                }
            }
            Some(WireEvent {
                id: id?,
                event: event?,
                data: serde_json::from_str(&data).ok()?,
            })
        })
        .collect()
}
