//! # Core Engine Module
//!
//! The building blocks every live-state service is assembled from. Nothing in
//! here knows about torrents; the services in `ingestors` give these pieces
//! their meaning.
//!
//! ## Core Components:
//!
//! - **`diff`**: Structural diff between two flat snapshots, producing the
//!   ordered added / changed / removed entries that are pushed to subscribers.
//!
//! - **`poll_loop`**: The fetch / backoff / reschedule loop that drives each
//!   service against its poll-only source.
//!
//! - **`dispatcher`**: Fan-out of service events to any number of listeners
//!   over unbounded channels, with automatic cleanup of dead listeners.
//!
//! - **`registry`**: Per-session listener sets, replaced atomically when a
//!   client subscribes again under the same id.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Structural diff between two snapshots.
pub mod diff;
/// Fan-out of service events to listeners.
pub mod dispatcher;
/// Self-scheduling fetch loop with linear backoff.
pub mod poll_loop;
/// Session-keyed listener sets.
pub mod registry;

// --- Public API Re-exports ---
pub use diff::{get_collection_diff, get_diff, snapshot_of, DiffAction, DiffEntry, RemovalScan, Snapshot};
pub use dispatcher::{Dispatcher, ListenerId};
pub use poll_loop::{PollConfig, PollHandler, PollLoop, PollPhase, PollState, PollStatus};
pub use registry::{Detacher, Registry, Subscription};
