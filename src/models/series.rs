// Chart-side models: normalized points and the downsampled series handed to display layers.

use serde::{Deserialize, Serialize};

/// Normalized `{t, v}` pair. Produced fresh per fetch; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPoint {
    /// Epoch millis (UTC).
    pub t: i64,
    pub v: f64,
}

/// Ordered values, oldest first, plus the time span of the points they were built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub values: Vec<f64>,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl ChartSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
