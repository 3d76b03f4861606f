// Downsampling for charts: bucketed averaging down to a point cap, and the
// lookback-window -> point-cap tiers.

use serde::Deserialize;

/// Reduce `values` to at most `max_points` by contiguous bucket means, order preserved.
///
/// Inputs already within the cap are returned unchanged. Otherwise the input is split into
/// exactly `max_points` buckets with boundaries at `floor(i * len / max_points)`, so every
/// value lands in exactly one bucket and no trailing remainder is dropped. When `len` is a
/// multiple of the cap this is the plain fixed bucket size `len / max_points`.
pub fn downsample(values: &[f64], max_points: usize) -> Vec<f64> {
    if values.len() <= max_points {
        return values.to_vec();
    }
    if max_points == 0 {
        return Vec::new();
    }
    let len = values.len();
    (0..max_points)
        .map(|i| {
            let start = i * len / max_points;
            let end = (i + 1) * len / max_points;
            mean_f64(&values[start..end])
        })
        .collect()
}

fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

/// One lookback tier: windows up to `max_hours` render at most `points` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Tier {
    pub max_hours: u32,
    pub points: usize,
}

/// Shorter windows keep more points; longer windows compress harder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    tiers: Vec<Tier>,
    fallback_points: usize,
}

impl TierPolicy {
    pub fn new(mut tiers: Vec<Tier>, fallback_points: usize) -> Self {
        tiers.sort_by_key(|t| t.max_hours);
        Self {
            tiers,
            fallback_points,
        }
    }

    pub fn points_for(&self, hours_back: u32) -> usize {
        self.tiers
            .iter()
            .find(|t| hours_back <= t.max_hours)
            .map_or(self.fallback_points, |t| t.points)
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new(default_tiers(), DEFAULT_FALLBACK_POINTS)
    }
}

pub const DEFAULT_FALLBACK_POINTS: usize = 800;

pub fn default_tiers() -> Vec<Tier> {
    vec![
        Tier {
            max_hours: 6,
            points: 300,
        },
        Tier {
            max_hours: 48,
            points: 500,
        },
    ]
}
