// Metrics a device reports per minute, and where each one lives in a minute document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[serde(rename = "temp")]
    Temperature,
    Current,
    Level,
    Cycles,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Current,
        Metric::Level,
        Metric::Cycles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "temp",
            Metric::Current => "current",
            Metric::Level => "level",
            Metric::Cycles => "cycles",
        }
    }

    /// Top-level average keys, in lookup order. Older uploaders wrote `avgA`/`avgL`,
    /// newer ones the long `avg_*` names.
    pub fn flat_keys(self) -> &'static [&'static str] {
        match self {
            Metric::Temperature => &["avg"],
            Metric::Current => &["avgA", "avg_current"],
            Metric::Level => &["avgL", "avg_level"],
            Metric::Cycles => &["avg_cycles"],
        }
    }

    /// Key of the nested `{avg, min, max, last}` object written by the minute uploader.
    pub fn nested_key(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric: {0:?}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temp" | "temperature" | "temp_c" => Ok(Metric::Temperature),
            "current" | "current_a" | "amps" => Ok(Metric::Current),
            "level" | "oil_level" => Ok(Metric::Level),
            "cycles" | "cycle_count" => Ok(Metric::Cycles),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}
