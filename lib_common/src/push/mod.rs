//! # Push Channel
//!
//! Delivers live state to subscribers over a long-lived text stream.
//!
//! ## Contained Modules:
//! - **`event_types`**: The `event:` names used on the wire.
//! - **`server_event`**: The id / type / data framing and the initial padding.
//! - **`activity_stream`**: Per-client sessions: full updates on open, then
//!   diffs, fetch errors and history refreshes as they happen.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Per-client push sessions.
pub mod activity_stream;
/// Wire event names.
pub mod event_types;
/// Event framing.
pub mod server_event;

// --- Public API Re-exports ---
pub use activity_stream::{open_activity_stream, ActivityStream, StreamServices, DEFAULT_CLIENT_ID};
pub use event_types::ServerEventType;
pub use server_event::{EventSink, ServerEvent, PADDING_LEN};
