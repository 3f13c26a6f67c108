//! # Engine Configuration
//!
//! Tunables for the poll loops and the history chain. Deserialized from the
//! `engine` section of the server's JSON config; every field has a default so
//! a partial section is fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::PollConfig;
use crate::error::ConfigError;
use crate::history::{validate_chain, HistoryResolution, RollupPolicy};

const SECOND: u64 = 1000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// # Era Spec
///
/// One row of the era table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraSpec {
    /// Name clients use to query the era (`fiveMin`, `hour`, ...).
    pub name: String,
    /// Bucket granularity.
    pub interval_ms: u64,
    /// Retention horizon; `0` keeps everything.
    pub max_time_ms: u64,
    /// How often the era rolls up into the next one. Absent on the last era.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollup_cadence_ms: Option<u64>,
}

impl EraSpec {
    fn new(name: &str, interval_ms: u64, max_time_ms: u64, rollup_cadence_ms: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            interval_ms,
            max_time_ms,
            rollup_cadence_ms,
        }
    }
}

/// The era table used when the config doesn't provide one.
pub fn default_history_eras() -> Vec<EraSpec> {
    vec![
        EraSpec::new("fiveMin", 5 * SECOND, 5 * MINUTE, Some(20 * SECOND)),
        EraSpec::new("thirtyMin", 20 * SECOND, 30 * MINUTE, Some(15 * MINUTE)),
        EraSpec::new("hour", 15 * MINUTE, 24 * HOUR, Some(HOUR)),
        EraSpec::new("day", HOUR, 30 * DAY, Some(4 * HOUR)),
        EraSpec::new("week", 4 * HOUR, 24 * 7 * DAY, Some(12 * HOUR)),
        EraSpec::new("month", 12 * HOUR, 365 * DAY, Some(7 * DAY)),
        EraSpec::new("year", 7 * DAY, 0, None),
    ]
}

/// # Engine Config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Delay between polls of a healthy torrent client.
    pub poll_interval_ms: u64,
    /// Minimum delay once polling is backing off.
    pub poll_floor_delay_ms: u64,
    /// Consecutive failures before backing off.
    pub poll_error_threshold: u32,
    /// Most buckets returned by one history query.
    pub max_history_states: usize,
    /// Period of the history housekeeping tick.
    pub history_tick_ms: u64,
    /// Era table, finest first.
    pub history_eras: Vec<EraSpec>,
    /// How samples are folded together.
    pub rollup_policy: RollupPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            poll_floor_delay_ms: 60_000,
            poll_error_threshold: 3,
            max_history_states: 30,
            history_tick_ms: 1000,
            history_eras: default_history_eras(),
            rollup_policy: RollupPolicy::Mean,
        }
    }
}

impl EngineConfig {
    /// Reads and validates a config from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the intervals are usable and the era table forms a valid chain
    /// of queryable resolutions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("pollIntervalMs"));
        }
        if self.history_tick_ms == 0 {
            return Err(ConfigError::ZeroInterval("historyTickMs"));
        }
        for era in &self.history_eras {
            if let Err(unknown) = era.name.parse::<HistoryResolution>() {
                return Err(ConfigError::InvalidEraChain(unknown.to_string()));
            }
        }
        validate_chain(&self.history_eras)
    }

    /// Timing for the poll loops.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            base_interval: Duration::from_millis(self.poll_interval_ms),
            floor_delay: Duration::from_millis(self.poll_floor_delay_ms),
            error_threshold: self.poll_error_threshold,
        }
    }

    /// Period of the history housekeeping tick.
    pub fn history_tick(&self) -> Duration {
        Duration::from_millis(self.history_tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_config().base_interval, Duration::from_secs(2));
        assert_eq!(config.history_eras.len(), 7);
        assert_eq!(config.history_eras[6].max_time_ms, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pollIntervalMs": 500, "rollupPolicy": "max"}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.rollup_policy, RollupPolicy::Max);
        assert_eq!(config.max_history_states, 30);
        assert_eq!(config.history_eras, default_history_eras());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "maxHistoryStates": 10,
                "historyEras": [
                    {{"name": "fiveMin", "intervalMs": 1000, "maxTimeMs": 60000, "rollupCadenceMs": 10000}},
                    {{"name": "year", "intervalMs": 10000, "maxTimeMs": 0}}
                ]
            }}"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_history_states, 10);
        assert_eq!(config.history_eras[1].rollup_cadence_ms, None);
    }

    #[test]
    fn test_load_rejects_broken_chain() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"historyEras": [{{"name": "year", "intervalMs": 1000, "maxTimeMs": 0, "rollupCadenceMs": 10}}]}}"#
        )
        .unwrap();

        let err = EngineConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEraChain(_)));
    }

    #[test]
    fn test_unknown_era_name_is_rejected() {
        let mut config = EngineConfig::default();
        config.history_eras[0].name = "decade".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEraChain(_))));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval("pollIntervalMs"))));

        let config = EngineConfig {
            history_tick_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "historyTickMs must be positive");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load_from_file("/nonexistent/engine.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
