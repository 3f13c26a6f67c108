//! # Utilities Module
//!
//! General-purpose helpers shared across `lib_common`: wall-clock access,
//! human-oriented duration breakdowns and lock helpers.
//!
//! ## Contained Modules:
//!
//! - **`duration`**: Splits a number of seconds into years/weeks/days/...
//!   components. Used for history timestamps and torrent ETAs.
//! - **`time`**: Millisecond wall-clock timestamps used as event ids and
//!   history sample times.
//! - **`sync`**: Poison-tolerant mutex locking.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Breaks a number of seconds into calendar-ish components.
pub mod duration;
/// Wall-clock helpers.
pub mod time;
/// Mutex helpers.
pub mod sync;

pub use duration::{seconds_to_duration, DurationParts};
pub use sync::lock_or_recover;
pub use time::{current_datetime_rfc9557, now_millis};
