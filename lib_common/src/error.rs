//! # Error Types
//!
//! Failure taxonomy shared by the poll loops, the history engine, the push
//! channel and the configuration loader. Nothing in here is fatal to the
//! process: fetch errors are converted into backoff state by the `PollLoop`,
//! push errors end a single subscriber session, and configuration errors are
//! reported once at start-up.

use thiserror::Error;

/// # Fetch Error
///
/// Raised by a [`TorrentClient`](crate::ingestors::TorrentClient) when the
/// external torrent daemon is unreachable or answers with something we can't
/// use. Always recovered locally by the poll loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (connect, TLS, timeout...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The daemon (or its bridge) answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The raw body returned alongside the status, if any.
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The client is not able to serve requests at all (e.g. not configured).
    #[error("torrent client unavailable")]
    Unavailable,
}

/// # Push Error
///
/// Raised while writing an event onto a subscriber's stream.
#[derive(Debug, Error)]
pub enum PushError {
    /// The subscriber hung up; the session should be torn down.
    #[error("subscriber stream closed")]
    Closed,

    /// The payload could not be encoded as JSON.
    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// # Configuration Error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The history era table violates the chain ordering rules.
    #[error("invalid history era chain: {0}")]
    InvalidEraChain(String),

    /// A timing setting that drives a periodic task is zero.
    #[error("{0} must be positive")]
    ZeroInterval(&'static str),
}

/// A history query named a resolution that isn't part of the era chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown history resolution '{0}'")]
pub struct UnknownResolution(pub String);
