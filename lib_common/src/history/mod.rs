//! # Transfer History
//!
//! Multi-resolution history of the upload / download rate pair. Raw samples
//! land in the finest era and are rolled up, era by era, into coarser buckets
//! with longer retention, so the chain covers minutes to years in bounded
//! memory.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The era chain.
pub mod engine;
/// A single era.
pub mod era;
/// Named resolutions clients can query.
pub mod resolution;

pub use engine::{validate_chain, HistoryEngine};
pub use era::{HistorySnapshot, HistoryTimestamp, RetentionEra, RollupPolicy, Sample, SampleOutcome};
pub use resolution::HistoryResolution;
