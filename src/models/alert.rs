// Read-only passthrough models: alert feed rows and the latest-value snapshot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Open,
    Closed,
}

impl AlertState {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertState::Open => "open",
            AlertState::Closed => "closed",
        }
    }

    /// Anything other than "closed" is still open.
    pub fn from_db(s: &str) -> Self {
        if s.eq_ignore_ascii_case("closed") {
            AlertState::Closed
        } else {
            AlertState::Open
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Epoch millis when the alert was raised.
    pub ts: i64,
    /// Free-form; alert rules may name metrics the charts do not.
    pub metric: String,
    pub value: f64,
    pub threshold: Option<f64>,
    pub severity: String,
    pub state: AlertState,
}

/// Single current-value document per device, written out-of-band by the uploader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestSnapshot {
    pub device_id: String,
    pub ts_ms: Option<i64>,
    pub temp: Option<f64>,
    pub current: Option<f64>,
    pub level: Option<f64>,
    pub cycles: Option<f64>,
}
