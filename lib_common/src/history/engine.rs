//! # History Engine
//!
//! Owns the whole era chain as an ordered list, finest first. Raw samples go
//! into era `0`; each era's rollups go into the era at the next index. The
//! chain is validated once at construction:
//!
//! - bucket intervals strictly increase along the chain;
//! - horizons never decrease, and only the last era may be unbounded (`0`);
//! - every era except the last has a rollup cadence no longer than its
//!   horizon, the last has none.

use std::collections::BTreeSet;

use crate::configs::EraSpec;
use crate::error::ConfigError;
use crate::history::era::{HistorySnapshot, RetentionEra, RollupPolicy, Sample, SampleOutcome};
use crate::history::resolution::HistoryResolution;

/// # History Engine
#[derive(Debug, Clone)]
pub struct HistoryEngine {
    eras: Vec<RetentionEra>,
}

impl HistoryEngine {
    /// Builds the chain from an era table ordered finest to coarsest.
    pub fn new(specs: &[EraSpec], policy: RollupPolicy) -> Result<Self, ConfigError> {
        validate_chain(specs)?;
        let eras = specs
            .iter()
            .map(|spec| {
                RetentionEra::new(
                    &spec.name,
                    spec.interval_ms,
                    spec.max_time_ms,
                    spec.rollup_cadence_ms,
                    policy,
                )
            })
            .collect();
        Ok(Self { eras })
    }

    /// Eras, finest first.
    pub fn eras(&self) -> &[RetentionEra] {
        &self.eras
    }

    /// Looks an era up by name.
    pub fn era(&self, name: &str) -> Option<&RetentionEra> {
        self.eras.iter().find(|era| era.name() == name)
    }

    /// Buckets held across the whole chain.
    pub fn total_samples(&self) -> usize {
        self.eras.iter().map(RetentionEra::len).sum()
    }

    /// # Record
    ///
    /// Feeds one raw rate sample into the finest era, then runs the rollups
    /// that are due at `ts`. Returns the names of the eras that gained a new
    /// bucket.
    pub fn record(&mut self, ts: u64, upload: f64, download: f64) -> BTreeSet<String> {
        let mut grown = BTreeSet::new();
        let Some(finest) = self.eras.first_mut() else {
            return grown;
        };

        let outcome = finest.add_sample(Sample {
            ts,
            upload,
            download,
            count: 1,
        });
        if outcome == SampleOutcome::Appended {
            grown.insert(finest.name().to_string());
        }

        grown.extend(self.tick(ts));
        grown
    }

    /// # Tick
    ///
    /// Housekeeping: forwards due rollups down the chain and evicts expired
    /// buckets everywhere. Returns the names of the eras that gained a bucket.
    pub fn tick(&mut self, now: u64) -> BTreeSet<String> {
        let mut grown = BTreeSet::new();

        for index in 0..self.eras.len() {
            let (head, tail) = self.eras.split_at_mut(index + 1);
            let era = &mut head[index];

            // Roll up before evicting so a long pause can't lose the window.
            if let Some(next) = tail.first_mut() {
                for rollup in era.take_rollups(now) {
                    if next.add_sample(rollup) == SampleOutcome::Appended {
                        grown.insert(next.name().to_string());
                    }
                }
            }
            era.evict(now);
        }

        grown
    }

    /// Graph data for the era called `name`, or `None` if there is no such
    /// era.
    pub fn get_history(&self, name: &str, now: u64, max_states: usize) -> Option<HistorySnapshot> {
        self.era(name).map(|era| era.get_data(now, max_states))
    }

    /// Same as [`get_history`](Self::get_history), keyed by resolution.
    pub fn get_resolution(
        &self,
        resolution: HistoryResolution,
        now: u64,
        max_states: usize,
    ) -> Option<HistorySnapshot> {
        self.get_history(resolution.as_str(), now, max_states)
    }
}

/// Checks the ordering rules listed in the module docs.
pub fn validate_chain(specs: &[EraSpec]) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::InvalidEraChain(msg));

    let Some(last) = specs.last() else {
        return invalid("at least one era is required".to_string());
    };

    let mut names = BTreeSet::new();
    for spec in specs {
        if spec.interval_ms == 0 {
            return invalid(format!("era '{}' has a zero interval", spec.name));
        }
        if !names.insert(spec.name.as_str()) {
            return invalid(format!("era name '{}' is used twice", spec.name));
        }
    }

    for pair in specs.windows(2) {
        let (finer, coarser) = (&pair[0], &pair[1]);
        if coarser.interval_ms <= finer.interval_ms {
            return invalid(format!(
                "era '{}' interval must be larger than '{}'",
                coarser.name, finer.name
            ));
        }
        if finer.max_time_ms == 0 {
            return invalid(format!("only the last era may be unbounded, '{}' is not last", finer.name));
        }
        if coarser.max_time_ms != 0 && coarser.max_time_ms < finer.max_time_ms {
            return invalid(format!(
                "era '{}' horizon must not be shorter than '{}'",
                coarser.name, finer.name
            ));
        }
        match finer.rollup_cadence_ms {
            None | Some(0) => {
                return invalid(format!("era '{}' needs a rollup cadence", finer.name));
            }
            Some(cadence) if cadence > finer.max_time_ms => {
                return invalid(format!("era '{}' rolls up less often than it retains data", finer.name));
            }
            Some(_) => {}
        }
    }

    if last.rollup_cadence_ms.is_some() {
        return invalid(format!("terminal era '{}' must not have a rollup cadence", last.name));
    }

    Ok(())
}
