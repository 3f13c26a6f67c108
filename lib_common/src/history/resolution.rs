use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnknownResolution;

/// # History Resolution
///
/// The named eras of the default history chain, finest first. The string
/// form (`fiveMin`, `thirtyMin`, ...) is what clients send in queries and what
/// the era table uses as names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryResolution {
    /// 5 s buckets over the last 5 minutes.
    #[default]
    FiveMin,
    /// 20 s buckets over the last 30 minutes.
    ThirtyMin,
    /// 15 min buckets over the last 24 hours.
    Hour,
    /// 1 h buckets over the last 30 days.
    Day,
    /// 4 h buckets over the last 24 weeks.
    Week,
    /// 12 h buckets over the last 365 days.
    Month,
    /// 7 day buckets, kept forever.
    Year,
}

impl HistoryResolution {
    /// All resolutions, finest first.
    pub const ALL: [HistoryResolution; 7] = [
        HistoryResolution::FiveMin,
        HistoryResolution::ThirtyMin,
        HistoryResolution::Hour,
        HistoryResolution::Day,
        HistoryResolution::Week,
        HistoryResolution::Month,
        HistoryResolution::Year,
    ];

    /// The query / era-table name.
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryResolution::FiveMin => "fiveMin",
            HistoryResolution::ThirtyMin => "thirtyMin",
            HistoryResolution::Hour => "hour",
            HistoryResolution::Day => "day",
            HistoryResolution::Week => "week",
            HistoryResolution::Month => "month",
            HistoryResolution::Year => "year",
        }
    }
}

impl fmt::Display for HistoryResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryResolution {
    type Err = UnknownResolution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownResolution(s.to_string()))
    }
}
