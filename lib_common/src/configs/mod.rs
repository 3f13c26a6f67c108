//! # Configuration Modules
//!
//! Engine tunables shared by every binary that hosts the live-state services.

/// Poll, history and era-table settings.
pub mod config_engine;

pub use config_engine::{default_history_eras, EngineConfig, EraSpec};
