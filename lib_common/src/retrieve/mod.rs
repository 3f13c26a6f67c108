//! # Data Retrieval Module
//!
//! HTTP plumbing towards the torrent daemon.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, featuring automatic retries with exponential
//!   backoff.
//! - **`torrent_bridge`**: The `TorrentClient` implementation that talks to
//!   the daemon's JSON bridge through `ApiClient`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// `TorrentClient` over HTTP.
pub mod torrent_bridge;

pub use ky_http::{ApiClient, ApiResponse};
pub use torrent_bridge::HttpTorrentClient;
